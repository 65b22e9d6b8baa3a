use tokio_tungstenite::tungstenite;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to open a TCP connection to the specified URL.
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// The dial URL could not be turned into an upgrade request.
    #[error("invalid websocket url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// An upgrade header supplied by the caller is malformed.
    #[error("invalid upgrade header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    /// The HTTP upgrade handshake failed.
    #[error("websocket handshake failed: {0}")]
    Handshake(Box<tungstenite::Error>),

    /// The handshake did not finish in time.
    #[error("websocket handshake timed out after {0:?}")]
    HandshakeTimeout(std::time::Duration),

    /// A protocol or I/O error on an established connection.
    #[error("websocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),

    /// An I/O error occurred on the underlying stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection has already been closed.
    #[error("transport closed")]
    Closed,
}

impl From<tungstenite::Error> for TransportError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                TransportError::Closed
            }
            tungstenite::Error::Io(io) => TransportError::Io(io),
            other => TransportError::WebSocket(Box::new(other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
