use std::collections::HashMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;
use crate::reader::FrameReader;
use crate::request::Request;
use crate::response::Response;
use crate::writer::FrameWriter;

/// Byte separating the JSON header segment from the raw body.
pub const TERMINATOR: u8 = 0x00;

/// Reserved verb used to report failures to the peer.
pub const ERROR_VERB: &str = "error";

/// Default maximum header segment size: 64 KiB.
pub const DEFAULT_MAX_HEADER_SIZE: usize = 64 * 1024;

/// String key/value metadata carried alongside a verb.
pub type Header = HashMap<String, String>;

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest accepted header segment, terminator excluded. Default: 64 KiB.
    pub max_header_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
        }
    }
}

/// JSON header segment of a request frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHead {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub verb: String,
    #[serde(
        default,
        skip_serializing_if = "HashMap::is_empty",
        deserialize_with = "nullable_header"
    )]
    pub header: Header,
}

/// JSON header segment of a response frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHead {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub verb: String,
    #[serde(rename = "status_code", default, skip_serializing_if = "is_zero")]
    pub status: u16,
    #[serde(
        default,
        skip_serializing_if = "HashMap::is_empty",
        deserialize_with = "nullable_header"
    )]
    pub header: Header,
}

fn is_zero(status: &u16) -> bool {
    *status == 0
}

fn nullable_header<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<Header, D::Error> {
    Ok(Option::<Header>::deserialize(de)?.unwrap_or_default())
}

/// Encode a request into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────────────────────┬──────┬──────────────────┐
/// │ {"verb":..,"header":{..}}    │ 0x00 │ raw body bytes   │
/// └──────────────────────────────┴──────┴──────────────────┘
/// ```
pub fn encode_request(req: &Request, dst: &mut BytesMut) -> Result<()> {
    encode_request_with_config(req, dst, &FrameConfig::default())
}

pub fn encode_request_with_config(
    req: &Request,
    dst: &mut BytesMut,
    config: &FrameConfig,
) -> Result<()> {
    let mut writer = FrameWriter::with_config(dst.writer(), config.clone());
    writer.write_request(req)
}

/// Encode a response into the wire format (`status_code` in the header).
pub fn encode_response(resp: &Response, dst: &mut BytesMut) -> Result<()> {
    encode_response_with_config(resp, dst, &FrameConfig::default())
}

pub fn encode_response_with_config(
    resp: &Response,
    dst: &mut BytesMut,
    config: &FrameConfig,
) -> Result<()> {
    let mut writer = FrameWriter::with_config(dst.writer(), config.clone());
    writer.write_response(resp)
}

/// Decode one request frame. The body is a zero-copy slice of `src`.
pub fn decode_request(src: Bytes) -> Result<Request> {
    decode_request_with_config(src, &FrameConfig::default())
}

pub fn decode_request_with_config(src: Bytes, config: &FrameConfig) -> Result<Request> {
    let mut reader = FrameReader::with_config(src.reader(), config.clone());
    let head: RequestHead = reader.read_head()?;
    let body = reader.into_inner().into_inner();
    Ok(Request::from_parts(head, body))
}

/// Decode one response frame. The payload is a zero-copy slice of `src`.
pub fn decode_response(src: Bytes) -> Result<Response> {
    decode_response_with_config(src, &FrameConfig::default())
}

pub fn decode_response_with_config(src: Bytes, config: &FrameConfig) -> Result<Response> {
    let mut reader = FrameReader::with_config(src.reader(), config.clone());
    let head: ResponseHead = reader.read_head()?;
    let payload = reader.into_inner().into_inner();
    Ok(Response::from_parts(head, payload))
}
