/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The header segment before the terminator is not a valid JSON header.
    #[error("invalid frame header: {0}")]
    InvalidHeader(#[source] serde_json::Error),

    /// No terminator was found within the configured header limit.
    #[error("frame header exceeds {max} bytes")]
    HeaderTooLarge { max: usize },

    /// The header could not be serialized.
    #[error("failed to encode frame header: {0}")]
    Encode(#[source] serde_json::Error),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
