use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use verbmux_frame::{decode_request_with_config, encode_response_with_config, Request, Response};
use verbmux_transport::{ConnectionInfo, MessageStream, TlsInfo};

use crate::config::SocketConfig;
use crate::conn::{CloseReason, Conn, ConnState};
use crate::control::ERROR_VERB;
use crate::error::{PeerError, Result};
use crate::id::generate_id;
use crate::metadata::Metadata;
use crate::writer::SocketWriter;

/// Local error callback.
pub type ErrorHook = Arc<dyn Fn(&PeerError) + Send + Sync>;

/// Server side of one accepted connection.
///
/// Owns the connection exclusively: one receive loop reads and dispatches
/// requests, writes go through a per-connection lock.
pub struct Socket {
    id: String,
    info: ConnectionInfo,
    metadata: Metadata,
    conn: Conn,
    on_error: Option<ErrorHook>,
}

impl Socket {
    /// Wrap an upgraded stream. `stop` ends the receive loop when cancelled.
    pub fn new(
        stream: MessageStream,
        info: ConnectionInfo,
        config: SocketConfig,
        stop: CancellationToken,
        on_error: Option<ErrorHook>,
    ) -> Result<Arc<Self>> {
        let id = generate_id(config.id_length, &config.id_alphabet)?;
        Ok(Arc::new(Self {
            id,
            info,
            metadata: Metadata::new(),
            conn: Conn::new(stream, config, stop),
            on_error,
        }))
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub fn state(&self) -> ConnState {
        self.conn.state()
    }

    /// Begin graceful shutdown. Idempotent and non-blocking.
    pub fn close(&self) {
        self.conn.close();
    }

    /// Wait until the connection is fully closed.
    pub async fn closed(&self) {
        self.conn.closed().await;
    }

    /// Run the receive loop, handing each decoded request to `serve`.
    ///
    /// A frame that fails to decode is reported through the error hook and
    /// answered with a 400 `error` frame; the loop keeps going.
    pub async fn run<F, Fut>(self: Arc<Self>, serve: F) -> CloseReason
    where
        F: Fn(Arc<Socket>, Request) -> Fut,
        Fut: Future<Output = ()>,
    {
        let serve = &serve;
        let this = &self;
        let reason = self
            .conn
            .run(move |data| async move {
                match decode_request_with_config(data, &this.conn.config().frame) {
                    Ok(req) => serve(Arc::clone(this), req).await,
                    Err(err) => {
                        let err = PeerError::from(err);
                        warn!(socket_id = %this.id, error = %err, "dropping malformed frame");
                        let status = err.status();
                        if let Err(write_err) = this.write_error(err, status).await {
                            debug!(socket_id = %this.id, error = %write_err, "failed to report decode error");
                        }
                    }
                }
            })
            .await;
        debug!(socket_id = %self.id, ?reason, "receive loop ended");
        reason
    }

    fn report(&self, err: &PeerError) {
        if let Some(hook) = &self.on_error {
            hook(err);
        }
    }
}

#[async_trait]
impl SocketWriter for Socket {
    fn id(&self) -> &str {
        &self.id
    }

    fn remote_addr(&self) -> &str {
        &self.info.remote_addr
    }

    fn endpoint_addr(&self) -> &str {
        &self.info.endpoint_addr
    }

    fn user_agent(&self) -> &str {
        &self.info.user_agent
    }

    fn tls(&self) -> Option<&TlsInfo> {
        self.info.tls.as_ref()
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    async fn write(&self, verb: &str, status: u16, payload: Bytes) -> Result<()> {
        let mut buf = BytesMut::with_capacity(64 + verb.len() + payload.len());
        encode_response_with_config(
            &Response::new(verb, status, payload),
            &mut buf,
            &self.conn.config().frame,
        )
        .map_err(PeerError::Encode)?;
        self.conn.send(buf.freeze()).await
    }

    async fn write_error(&self, err: PeerError, status: u16) -> Result<()> {
        self.report(&err);
        self.write(ERROR_VERB, status, Bytes::from(err.to_string()))
            .await
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.id)
            .field("remote_addr", &self.info.remote_addr)
            .field("state", &self.conn.state())
            .finish_non_exhaustive()
    }
}
