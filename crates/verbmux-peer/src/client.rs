use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::sync::{Arc, PoisonError, RwLock};

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use verbmux_frame::{
    decode_response_with_config, encode_request_with_config, FrameWriter, Header, Request, RequestHead,
    Response,
};
use verbmux_transport::{ConnectionInfo, MessageStream};

use crate::config::SocketConfig;
use crate::conn::{Conn, ConnState};
use crate::control::normalize_verb;
use crate::error::{PeerError, Result};
use crate::id::generate_id;
use crate::metadata::Metadata;
use crate::socket::ErrorHook;

/// Callback for responses pushed by the server.
pub type ResponseCallback = Arc<dyn Fn(&Response) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    verbs: HashMap<String, ResponseCallback>,
    any: Option<ResponseCallback>,
    error: Option<ErrorHook>,
}

struct ClientInner {
    id: String,
    info: ConnectionInfo,
    metadata: Metadata,
    conn: Conn,
    callbacks: RwLock<Callbacks>,
}

/// Client side of a connection.
///
/// Sends requests and dispatches incoming responses to callbacks registered
/// per verb. Cloning is cheap and every clone drives the same connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Dial `url` with default configuration.
    pub async fn dial(url: &str, headers: &[(String, String)]) -> Result<Self> {
        Self::dial_with_config(url, headers, SocketConfig::default()).await
    }

    /// Dial `url`, sending `headers` with the upgrade request.
    pub async fn dial_with_config(
        url: &str,
        headers: &[(String, String)],
        config: SocketConfig,
    ) -> Result<Self> {
        let (stream, info) = verbmux_transport::dial(url, headers, &config.transport).await?;
        debug!(url, remote_addr = %info.remote_addr, "client connected");
        Self::from_stream(stream, info, config)
    }

    /// Drive an already-upgraded stream. Must be called inside a Tokio runtime.
    pub fn from_stream(
        stream: MessageStream,
        info: ConnectionInfo,
        config: SocketConfig,
    ) -> Result<Self> {
        let id = generate_id(config.id_length, &config.id_alphabet)?;
        let inner = Arc::new(ClientInner {
            id,
            info,
            metadata: Metadata::new(),
            conn: Conn::new(stream, config, CancellationToken::new()),
            callbacks: RwLock::new(Callbacks::default()),
        });

        let running = Arc::clone(&inner);
        tokio::spawn(async move {
            let handler = &running;
            let reason = running
                .conn
                .run(move |data| {
                    handler.handle_frame(data);
                    std::future::ready(())
                })
                .await;
            debug!(client_id = %running.id, ?reason, "client receive loop ended");
        });

        Ok(Self { inner })
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.inner.info
    }

    pub fn metadata(&self) -> &Metadata {
        &self.inner.metadata
    }

    pub fn state(&self) -> ConnState {
        self.inner.conn.state()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnState::Closed
    }

    /// Call `f` for every response whose verb matches (case-insensitive).
    pub fn on<F>(&self, verb: &str, f: F)
    where
        F: Fn(&Response) + Send + Sync + 'static,
    {
        self.inner
            .callbacks_write()
            .verbs
            .insert(normalize_verb(verb), Arc::new(f));
    }

    /// Call `f` for every non-error response, after any verb callback.
    pub fn on_any<F>(&self, f: F)
    where
        F: Fn(&Response) + Send + Sync + 'static,
    {
        self.inner.callbacks_write().any = Some(Arc::new(f));
    }

    /// Call `f` for `error` responses and undecodable frames.
    pub fn on_error<F>(&self, f: F)
    where
        F: Fn(&PeerError) + Send + Sync + 'static,
    {
        self.inner.callbacks_write().error = Some(Arc::new(f));
    }

    /// Send a request with `verb` and `body`.
    pub async fn send(&self, verb: &str, body: impl Into<Bytes>) -> Result<()> {
        self.execute(&Request::new(verb, body)).await
    }

    /// Send a request whose body is read from `body`. The body bypasses the
    /// JSON encoder.
    pub async fn send_from<R: Read>(&self, verb: &str, header: Header, body: &mut R) -> Result<u64> {
        if verb.is_empty() {
            return Err(PeerError::EmptyVerb);
        }
        let mut writer = FrameWriter::with_config(
            BytesMut::new().writer(),
            self.inner.conn.config().frame.clone(),
        );
        writer
            .write_head(&RequestHead {
                verb: verb.to_string(),
                header,
            })
            .map_err(PeerError::Encode)?;
        let copied = writer.write_body_from(body).map_err(PeerError::Encode)?;
        self.inner
            .conn
            .send(writer.into_inner().into_inner().freeze())
            .await?;
        Ok(copied)
    }

    /// Send `req`. A request without a verb is rejected before any I/O.
    pub async fn execute(&self, req: &Request) -> Result<()> {
        if req.verb.is_empty() {
            return Err(PeerError::EmptyVerb);
        }
        let mut buf = BytesMut::with_capacity(64 + req.body.len());
        encode_request_with_config(req, &mut buf, &self.inner.conn.config().frame)
            .map_err(PeerError::Encode)?;
        self.inner.conn.send(buf.freeze()).await
    }

    /// Begin graceful shutdown. Idempotent and non-blocking.
    pub fn close(&self) {
        self.inner.conn.close();
    }

    /// Wait until the connection is fully closed.
    pub async fn closed(&self) {
        self.inner.conn.closed().await;
    }
}

impl ClientInner {
    fn handle_frame(&self, data: Bytes) {
        let resp = match decode_response_with_config(data, &self.conn.config().frame) {
            Ok(resp) => resp,
            Err(err) => {
                let err = PeerError::from(err);
                warn!(client_id = %self.id, error = %err, "dropping malformed frame");
                self.report(&err);
                return;
            }
        };

        if resp.is_error() {
            let err = PeerError::Remote {
                status: resp.status,
                message: resp.text().into_owned(),
            };
            debug!(client_id = %self.id, status = resp.status, error = %err, "server reported error");
            self.report(&err);
            return;
        }

        let (by_verb, any) = {
            let callbacks = self.callbacks_read();
            (
                callbacks.verbs.get(&normalize_verb(&resp.verb)).cloned(),
                callbacks.any.clone(),
            )
        };
        if let Some(callback) = by_verb {
            callback(&resp);
        }
        if let Some(callback) = any {
            callback(&resp);
        }
    }

    fn report(&self, err: &PeerError) {
        let hook = self.callbacks_read().error.clone();
        if let Some(hook) = hook {
            hook(err);
        }
    }

    fn callbacks_read(&self) -> std::sync::RwLockReadGuard<'_, Callbacks> {
        self.callbacks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn callbacks_write(&self) -> std::sync::RwLockWriteGuard<'_, Callbacks> {
        self.callbacks.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.inner.id)
            .field("remote_addr", &self.inner.info.remote_addr)
            .field("state", &self.inner.conn.state())
            .finish_non_exhaustive()
    }
}
