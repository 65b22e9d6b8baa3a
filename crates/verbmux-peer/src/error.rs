use std::time::Duration;

use verbmux_frame::FrameError;
use verbmux_transport::TransportError;

/// Errors that can occur in connection, routing and dispatch operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Dial, upgrade or transport failure.
    #[error("connection error: {0}")]
    Connection(#[from] TransportError),

    /// A frame could not be decoded. The connection stays usable.
    #[error("protocol decode error: {0}")]
    Decode(#[from] FrameError),

    /// An outbound frame could not be encoded or its body could not be read.
    #[error("protocol encode error: {0}")]
    Encode(FrameError),

    /// No handler is registered for the verb.
    #[error("The route \"{0}\" does not exist")]
    RouteNotFound(String),

    /// Raised by application code; reported to the peer with `status`.
    #[error("{message}")]
    Handler { status: u16, message: String },

    /// The peer sent an `error` message.
    #[error("{message}")]
    Remote { status: u16, message: String },

    /// A read or write deadline expired.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Write attempted after the connection left the open state.
    #[error("connection closed")]
    Closed,

    /// Outbound request without a verb.
    #[error("request verb must not be empty")]
    EmptyVerb,

    /// The connection id could not be generated.
    #[error("failed to generate connection id: {0}")]
    IdGeneration(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PeerError {
    /// Application error reported to the peer with the given status.
    pub fn handler(status: u16, message: impl Into<String>) -> Self {
        PeerError::Handler {
            status,
            message: message.into(),
        }
    }

    /// HTTP-like status used when this error is written to a peer.
    pub fn status(&self) -> u16 {
        match self {
            PeerError::RouteNotFound(_) => 404,
            PeerError::Decode(_) | PeerError::EmptyVerb => 400,
            PeerError::Handler { status, .. } | PeerError::Remote { status, .. }
                if *status != 0 =>
            {
                *status
            }
            PeerError::Timeout(_) => 504,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_not_found_message_and_status() {
        let err = PeerError::RouteNotFound("message".to_string());
        assert_eq!(err.to_string(), "The route \"message\" does not exist");
        assert_eq!(err.status(), 404);
    }

    #[test]
    fn handler_status_falls_back_to_500() {
        assert_eq!(PeerError::handler(422, "bad input").status(), 422);
        assert_eq!(PeerError::handler(0, "oops").status(), 500);
        assert_eq!(PeerError::handler(422, "bad input").to_string(), "bad input");
        assert_eq!(PeerError::Timeout(Duration::from_secs(1)).status(), 504);
        assert_eq!(PeerError::Closed.status(), 500);
    }

    #[test]
    fn encode_failure_is_not_a_decode_failure() {
        let err = PeerError::Encode(FrameError::HeaderTooLarge { max: 8 });
        assert_eq!(err.status(), 500);
        assert!(err.to_string().starts_with("protocol encode error"));
        assert_eq!(PeerError::from(FrameError::HeaderTooLarge { max: 8 }).status(), 400);
    }
}
