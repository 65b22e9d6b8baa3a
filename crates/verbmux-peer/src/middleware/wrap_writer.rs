use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use verbmux_transport::TlsInfo;

use crate::error::{PeerError, Result};
use crate::metadata::Metadata;
use crate::writer::SocketWriter;

/// Writer decorator recording the last status and the payload bytes written.
pub struct WrapWriter {
    inner: Arc<dyn SocketWriter>,
    status: AtomicU16,
    bytes: AtomicU64,
}

impl WrapWriter {
    pub fn new(inner: Arc<dyn SocketWriter>) -> Self {
        Self {
            inner,
            status: AtomicU16::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    /// Status of the last write, 0 if nothing was written.
    pub fn status(&self) -> u16 {
        self.status.load(Ordering::Relaxed)
    }

    /// Total payload bytes handed to the connection.
    pub fn bytes_written(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    fn record(&self, status: u16, len: usize) {
        self.status.store(status, Ordering::Relaxed);
        self.bytes.fetch_add(len as u64, Ordering::Relaxed);
    }
}

#[async_trait]
impl SocketWriter for WrapWriter {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn remote_addr(&self) -> &str {
        self.inner.remote_addr()
    }

    fn endpoint_addr(&self) -> &str {
        self.inner.endpoint_addr()
    }

    fn user_agent(&self) -> &str {
        self.inner.user_agent()
    }

    fn tls(&self) -> Option<&TlsInfo> {
        self.inner.tls()
    }

    fn metadata(&self) -> &Metadata {
        self.inner.metadata()
    }

    async fn write(&self, verb: &str, status: u16, payload: Bytes) -> Result<()> {
        self.record(status, payload.len());
        self.inner.write(verb, status, payload).await
    }

    async fn write_error(&self, err: PeerError, status: u16) -> Result<()> {
        self.record(status, err.to_string().len());
        self.inner.write_error(err, status).await
    }
}
