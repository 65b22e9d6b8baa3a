use std::io::{Read, Write};

use serde::Serialize;

use crate::codec::{FrameConfig, TERMINATOR};
use crate::error::{FrameError, Result};
use crate::request::Request;
use crate::response::Response;

/// Writes frames to any `Write` stream.
///
/// The header is serialized straight into the stream; the body is copied
/// after the terminator without passing through the JSON encoder.
pub struct FrameWriter<T> {
    inner: T,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self { inner, config }
    }

    /// Write a header segment followed by the terminator.
    pub fn write_head<H: Serialize>(&mut self, head: &H) -> Result<()> {
        let json = serde_json::to_vec(head).map_err(FrameError::Encode)?;
        if json.len() > self.config.max_header_size {
            return Err(FrameError::HeaderTooLarge {
                max: self.config.max_header_size,
            });
        }
        self.inner.write_all(&json)?;
        self.inner.write_all(&[TERMINATOR])?;
        Ok(())
    }

    /// Write a complete request frame.
    pub fn write_request(&mut self, req: &Request) -> Result<()> {
        self.write_head(&req.head())?;
        self.inner.write_all(&req.body)?;
        self.flush()
    }

    /// Write a complete response frame.
    pub fn write_response(&mut self, resp: &Response) -> Result<()> {
        self.write_head(&resp.head())?;
        self.inner.write_all(&resp.payload)?;
        self.flush()
    }

    /// Stream a body after [`write_head`](Self::write_head). Returns bytes copied.
    pub fn write_body_from<R: Read + ?Sized>(&mut self, body: &mut R) -> Result<u64> {
        let copied = std::io::copy(body, &mut self.inner)?;
        self.flush()?;
        Ok(copied)
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
