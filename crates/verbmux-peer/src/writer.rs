use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use verbmux_transport::TlsInfo;

use crate::control::SOCKETS_KEY;
use crate::error::{PeerError, Result};
use crate::metadata::Metadata;

/// Point-in-time copy of the live-connection registry, keyed by connection id.
pub type Sockets = HashMap<String, Arc<dyn SocketWriter>>;

/// What a handler can do with the connection a request arrived on.
///
/// Implemented by server sockets and by wrappers such as
/// [`WrapWriter`](crate::middleware::WrapWriter). All writes on one
/// connection are serialized; concurrent callers never interleave frames.
#[async_trait]
pub trait SocketWriter: Send + Sync {
    /// Random id assigned when the connection was created.
    fn id(&self) -> &str;

    fn remote_addr(&self) -> &str;

    /// Local address the connection was accepted on.
    fn endpoint_addr(&self) -> &str;

    fn user_agent(&self) -> &str;

    /// TLS state, when TLS was terminated in front of this connection.
    fn tls(&self) -> Option<&TlsInfo>;

    fn metadata(&self) -> &Metadata;

    /// Send one response frame.
    async fn write(&self, verb: &str, status: u16, payload: Bytes) -> Result<()>;

    /// Report `err` locally and send it to the peer as an `error` frame.
    async fn write_error(&self, err: PeerError, status: u16) -> Result<()>;
}

/// Registry snapshot taken for the current dispatch. Empty when none was set.
pub fn sockets(writer: &dyn SocketWriter) -> Arc<Sockets> {
    writer
        .metadata()
        .get::<Sockets>(SOCKETS_KEY)
        .unwrap_or_default()
}
