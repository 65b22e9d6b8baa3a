//! Message-oriented duplex transport for verbmux.
//!
//! Wraps an upgraded WebSocket connection and exposes it as a stream of
//! whole messages with explicit kinds. Message boundaries come from the
//! transport itself, so everything above this layer works on complete
//! messages and never deals with fragmentation.
//!
//! This is the lowest layer of verbmux. Everything else builds on top of
//! the [`MessageStream`] type provided here.

pub mod error;
pub mod info;
pub mod message;
pub mod stream;
pub mod ws;

pub use error::{Result, TransportError};
pub use info::{ConnectionInfo, TlsInfo};
pub use message::{Message, MessageKind, CLOSE_GOING_AWAY, CLOSE_NORMAL, CLOSE_NO_STATUS};
pub use stream::{BoxedIo, Io, MessageReader, MessageStream, MessageWriter};
pub use ws::{dial, pair, upgrade, TransportConfig, WsListener};
