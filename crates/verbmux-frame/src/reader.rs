use std::io::{BufRead, Read};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::codec::{FrameConfig, RequestHead, ResponseHead, TERMINATOR};
use crate::error::{FrameError, Result};
use crate::request::Request;
use crate::response::Response;

/// Reads one frame from any buffered stream.
///
/// The header segment is read up to the terminator and decoded; whatever
/// follows is left in the stream as the body, so callers can either buffer
/// it ([`read_request`](Self::read_request)) or stream it
/// ([`body`](Self::body)).
pub struct FrameReader<T> {
    inner: T,
    config: FrameConfig,
}

impl<T: BufRead> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self { inner, config }
    }

    /// Read and decode the header segment.
    ///
    /// Reaching EOF before the terminator is not an error: the bytes read so
    /// far are the header and the body is empty.
    pub fn read_head<H: DeserializeOwned>(&mut self) -> Result<H> {
        let limit = self.config.max_header_size as u64 + 1;
        let mut head = Vec::with_capacity(256);
        (&mut self.inner)
            .take(limit)
            .read_until(TERMINATOR, &mut head)?;

        if head.last() == Some(&TERMINATOR) {
            head.pop();
        } else if head.len() as u64 >= limit {
            return Err(FrameError::HeaderTooLarge {
                max: self.config.max_header_size,
            });
        } else {
            trace!(len = head.len(), "frame ended before terminator");
        }

        serde_json::from_slice(&head).map_err(FrameError::InvalidHeader)
    }

    /// Read a whole request, buffering the body.
    pub fn read_request(mut self) -> Result<Request> {
        let head: RequestHead = self.read_head()?;
        let body = self.read_body()?;
        Ok(Request::from_parts(head, body))
    }

    /// Read a whole response, buffering the payload.
    pub fn read_response(mut self) -> Result<Response> {
        let head: ResponseHead = self.read_head()?;
        let payload = self.read_body()?;
        Ok(Response::from_parts(head, payload))
    }

    /// The remaining stream. After [`read_head`](Self::read_head) this is the body.
    pub fn body(&mut self) -> &mut T {
        &mut self.inner
    }

    fn read_body(&mut self) -> Result<Bytes> {
        let mut body = Vec::new();
        self.inner.read_to_end(&mut body)?;
        Ok(Bytes::from(body))
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
