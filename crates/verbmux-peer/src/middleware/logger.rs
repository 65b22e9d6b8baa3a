use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::Level;
use verbmux_frame::Request;

use super::wrap_writer::WrapWriter;
use crate::error::Result;
use crate::handler::{Handler, Middleware};
use crate::mux::OriginalVerb;
use crate::writer::SocketWriter;

/// Logs one event per request: verb, endpoint, peer, status, bytes and
/// elapsed time. 5xx logs at `ERROR`, 4xx at `WARN`, everything else at `INFO`.
pub struct Logger {
    next: Arc<dyn Handler>,
}

impl Logger {
    pub fn new(next: Arc<dyn Handler>) -> Self {
        Self { next }
    }
}

/// Request logging middleware.
pub fn logger() -> Middleware {
    Arc::new(|next: Arc<dyn Handler>| -> Arc<dyn Handler> { Arc::new(Logger::new(next)) })
}

#[async_trait]
impl Handler for Logger {
    async fn serve_rpc(&self, w: Arc<dyn SocketWriter>, req: Request) -> Result<()> {
        let verb = req
            .extensions
            .get::<OriginalVerb>()
            .map(|v| v.0.clone())
            .unwrap_or_else(|| req.verb.clone());
        let wrapped = Arc::new(WrapWriter::new(Arc::clone(&w)));

        let started = Instant::now();
        let result = self
            .next
            .serve_rpc(Arc::clone(&wrapped) as Arc<dyn SocketWriter>, req)
            .await;
        let elapsed = started.elapsed();

        let status = match &result {
            Err(err) => err.status(),
            Ok(()) => wrapped.status(),
        };
        let scheme = if w.tls().is_some() { "wss" } else { "ws" };
        log_request(&RequestLine {
            verb: &verb,
            url: format!("{scheme}://{}", w.endpoint_addr()),
            remote_addr: w.remote_addr(),
            socket_id: w.id(),
            status,
            bytes: wrapped.bytes_written(),
            elapsed,
        });

        result
    }
}

struct RequestLine<'a> {
    verb: &'a str,
    url: String,
    remote_addr: &'a str,
    socket_id: &'a str,
    status: u16,
    bytes: u64,
    elapsed: Duration,
}

fn level_for(status: u16) -> Level {
    match status {
        500.. => Level::ERROR,
        400..=499 => Level::WARN,
        _ => Level::INFO,
    }
}

fn log_request(line: &RequestLine<'_>) {
    macro_rules! emit {
        ($level:expr) => {
            tracing::event!(
                $level,
                verb = %line.verb,
                url = %line.url,
                remote_addr = %line.remote_addr,
                socket_id = %line.socket_id,
                status = line.status,
                bytes = line.bytes,
                elapsed_ms = line.elapsed.as_secs_f64() * 1000.0,
                "rpc request"
            )
        };
    }

    let level = level_for(line.status);
    if level == Level::ERROR {
        emit!(Level::ERROR);
    } else if level == Level::WARN {
        emit!(Level::WARN);
    } else {
        emit!(Level::INFO);
    }
}
