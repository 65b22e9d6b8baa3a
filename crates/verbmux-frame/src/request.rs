use bytes::{Buf, Bytes};

use crate::codec::{Header, RequestHead};
use crate::extensions::Extensions;

/// An inbound or outbound RPC request.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Operation name. Routing lowercases it; the wire keeps it as sent.
    pub verb: String,
    pub header: Header,
    pub body: Bytes,
    /// Local-only values attached while the request is dispatched.
    pub extensions: Extensions,
}

impl Request {
    pub fn new(verb: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            verb: verb.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.insert(key.into(), value.into());
        self
    }

    pub(crate) fn from_parts(head: RequestHead, body: Bytes) -> Self {
        Self {
            verb: head.verb,
            header: head.header,
            body,
            extensions: Extensions::default(),
        }
    }

    /// The header segment as written on the wire.
    pub fn head(&self) -> RequestHead {
        RequestHead {
            verb: self.verb.clone(),
            header: self.header.clone(),
        }
    }

    /// Body as a `Read` stream.
    pub fn body_reader(&self) -> impl std::io::Read {
        self.body.clone().reader()
    }
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.verb == other.verb && self.header == other.header && self.body == other.body
    }
}

impl Eq for Request {}
