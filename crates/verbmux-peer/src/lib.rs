//! Connection actors, verb router and client for verbmux.
//!
//! A [`Mux`] accepts WebSocket connections, wraps each in a [`Socket`] with
//! its own receive loop, and dispatches every decoded request to the handler
//! registered for its verb. Verbs of the form `prefix:rest` reach routers
//! mounted under `prefix`. Handlers answer through the [`SocketWriter`]
//! they are given and can reach every live connection through
//! [`sockets`].
//!
//! [`Client`] is the other end: it dials, sends requests and routes the
//! responses it receives to per-verb callbacks.

pub mod client;
pub mod config;
mod conn;
pub mod control;
pub mod error;
pub mod handler;
pub mod id;
pub mod metadata;
pub mod middleware;
pub mod mux;
pub mod render;
pub mod socket;
pub mod writer;

pub use client::{Client, ResponseCallback};
pub use config::{MuxConfig, SocketConfig, ALPHANUMERIC};
pub use conn::{CloseReason, ConnState};
pub use control::{normalize_verb, split_verb, ERROR_VERB, SOCKETS_KEY, VERB_DELIMITER};
pub use error::{PeerError, Result};
pub use handler::{chain, from_fn, handler_fn, Handler, HandlerFn, Middleware, Next};
pub use id::generate_id;
pub use metadata::Metadata;
pub use mux::{ConnectHook, Mux, OriginalVerb};
pub use socket::{ErrorHook, Socket};
pub use writer::{sockets, SocketWriter, Sockets};

pub use verbmux_frame::{Header, Request, Response};
pub use verbmux_transport::{ConnectionInfo, TlsInfo};
