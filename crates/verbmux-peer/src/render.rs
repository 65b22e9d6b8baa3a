//! JSON response helpers.
//!
//! Handlers can override the verb and status used by [`respond`] before
//! calling it; the overrides live in the request extensions.

use bytes::Bytes;
use serde::Serialize;
use verbmux_frame::Request;

use crate::error::Result;
use crate::writer::SocketWriter;

/// Status override for [`respond`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseStatus(pub u16);

/// Verb override for [`respond`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseVerb(pub String);

/// Use `status` for the response written by [`respond`].
pub fn status(req: &mut Request, status: u16) {
    req.extensions.insert(ResponseStatus(status));
}

/// Use `verb` for the response written by [`respond`].
pub fn verb(req: &mut Request, verb: impl Into<String>) {
    req.extensions.insert(ResponseVerb(verb.into()));
}

/// Serialize `value` as newline-terminated JSON and write it.
///
/// Defaults to the request's verb and status 200.
pub async fn respond<T>(w: &dyn SocketWriter, req: &Request, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let verb = req
        .extensions
        .get::<ResponseVerb>()
        .map_or(req.verb.as_str(), |v| v.0.as_str());
    let status = req
        .extensions
        .get::<ResponseStatus>()
        .map_or(200, |s| s.0);

    let mut body = serde_json::to_vec(value)?;
    body.push(b'\n');
    w.write(verb, status, Bytes::from(body)).await
}
