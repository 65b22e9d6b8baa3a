use std::borrow::Cow;

use bytes::Bytes;

use crate::codec::{Header, ResponseHead, ERROR_VERB};

/// A message written back to a peer: a reply, a push, or an error report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub verb: String,
    /// HTTP-like status; 0 means unset.
    pub status: u16,
    pub header: Header,
    pub payload: Bytes,
}

impl Response {
    pub fn new(verb: impl Into<String>, status: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            verb: verb.into(),
            status,
            header: Header::new(),
            payload: payload.into(),
        }
    }

    /// Build the reserved `error` response carrying `message` as payload.
    pub fn error(message: impl Into<String>, status: u16) -> Self {
        Self::new(ERROR_VERB, status, message.into())
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.insert(key.into(), value.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.verb.eq_ignore_ascii_case(ERROR_VERB)
    }

    /// Payload as text, replacing invalid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    pub(crate) fn from_parts(head: ResponseHead, payload: Bytes) -> Self {
        Self {
            verb: head.verb,
            status: head.status,
            header: head.header,
            payload,
        }
    }

    pub fn head(&self) -> ResponseHead {
        ResponseHead {
            verb: self.verb.clone(),
            status: self.status,
            header: self.header.clone(),
        }
    }
}
