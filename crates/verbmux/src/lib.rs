//! Verb-routed request/response messaging over WebSocket.
//!
//! verbmux frames every WebSocket message as a small JSON head followed by a
//! raw body, routes requests to handlers by verb and lets handlers answer or
//! broadcast through the connections they are handed.
//!
//! # Crate Structure
//!
//! - [`transport`]: WebSocket listener, dialer and message streams
//! - [`frame`]: the request/response codec
//! - [`peer`]: connection actors, the [`peer::Mux`] router and [`peer::Client`]

/// Re-export transport types.
pub mod transport {
    pub use verbmux_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use verbmux_frame::*;
}

/// Re-export peer types.
pub mod peer {
    pub use verbmux_peer::*;
}
