//! Request/response framing for verbmux.
//!
//! Every transport message carries exactly one frame:
//! - a JSON header object (`verb`, `header`, and `status_code` for responses)
//! - one `0x00` terminator byte
//! - the raw body, unescaped, up to the end of the message
//!
//! The body never passes through the JSON encoder, so large payloads can be
//! streamed straight from and to the transport. A message that ends before
//! any terminator is a frame with an empty body.

pub mod codec;
pub mod error;
pub mod extensions;
pub mod reader;
pub mod request;
pub mod response;
pub mod writer;

pub use codec::{
    decode_request, decode_request_with_config, decode_response, decode_response_with_config,
    encode_request, encode_request_with_config, encode_response, encode_response_with_config,
    FrameConfig, Header, RequestHead, ResponseHead,
    DEFAULT_MAX_HEADER_SIZE, ERROR_VERB, TERMINATOR,
};
pub use error::{FrameError, Result};
pub use extensions::Extensions;
pub use reader::FrameReader;
pub use request::Request;
pub use response::Response;
pub use writer::FrameWriter;
