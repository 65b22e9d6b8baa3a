//! Whole transport messages with explicit kinds.

use bytes::Bytes;
use tokio_tungstenite::tungstenite::{
    self,
    protocol::{frame::coding::CloseCode, CloseFrame},
};

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Endpoint is going away (server shutdown, page navigation).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Close frame carried no status code.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Message kind as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    Binary,
    Ping,
    Pong,
    Close,
}

/// A complete message received from or sent to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// UTF-8 text payload, kept as raw bytes.
    Text(Bytes),
    /// Binary payload.
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    /// Close frame. `code` is [`CLOSE_NO_STATUS`] when the peer sent none.
    Close { code: u16, reason: String },
}

impl Message {
    /// Build a close message.
    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        Message::Close {
            code,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Text(_) => MessageKind::Text,
            Message::Binary(_) => MessageKind::Binary,
            Message::Ping(_) => MessageKind::Ping,
            Message::Pong(_) => MessageKind::Pong,
            Message::Close { .. } => MessageKind::Close,
        }
    }

    /// Whether this message carries application data (text or binary).
    pub fn is_data(&self) -> bool {
        matches!(self, Message::Text(_) | Message::Binary(_))
    }

    /// Application payload of a data message.
    pub fn into_data(self) -> Option<Bytes> {
        match self {
            Message::Text(data) | Message::Binary(data) => Some(data),
            _ => None,
        }
    }

    /// Returns `None` for raw frames, which never surface from a reader.
    pub(crate) fn from_tungstenite(msg: tungstenite::Message) -> Option<Self> {
        let msg = match msg {
            tungstenite::Message::Text(text) => {
                Message::Text(Bytes::copy_from_slice(text.as_str().as_bytes()))
            }
            tungstenite::Message::Binary(data) => Message::Binary(data),
            tungstenite::Message::Ping(data) => Message::Ping(data),
            tungstenite::Message::Pong(data) => Message::Pong(data),
            tungstenite::Message::Close(Some(frame)) => Message::Close {
                code: u16::from(frame.code),
                reason: frame.reason.to_string(),
            },
            tungstenite::Message::Close(None) => Message::Close {
                code: CLOSE_NO_STATUS,
                reason: String::new(),
            },
            tungstenite::Message::Frame(_) => return None,
        };
        Some(msg)
    }

    pub(crate) fn into_tungstenite(self) -> tungstenite::Message {
        match self {
            Message::Text(data) => {
                tungstenite::Message::text(String::from_utf8_lossy(&data).into_owned())
            }
            Message::Binary(data) => tungstenite::Message::Binary(data),
            Message::Ping(data) => tungstenite::Message::Ping(data),
            Message::Pong(data) => tungstenite::Message::Pong(data),
            Message::Close { code, .. } if code == CLOSE_NO_STATUS => {
                tungstenite::Message::Close(None)
            }
            Message::Close { code, reason } => tungstenite::Message::Close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: reason.into(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_frames_surface_as_bytes() {
        let msg = Message::from_tungstenite(tungstenite::Message::text("hi")).unwrap();
        assert_eq!(msg, Message::Text(Bytes::from_static(b"hi")));
        assert!(msg.is_data());
        assert_eq!(msg.into_data().unwrap(), Bytes::from_static(b"hi"));
    }

    #[test]
    fn close_without_frame_reports_no_status() {
        let msg = Message::from_tungstenite(tungstenite::Message::Close(None)).unwrap();
        assert_eq!(msg.kind(), MessageKind::Close);
        assert_eq!(
            msg,
            Message::Close {
                code: CLOSE_NO_STATUS,
                reason: String::new()
            }
        );
    }

    #[test]
    fn close_code_survives_conversion() {
        let out = Message::close(CLOSE_GOING_AWAY, "bye").into_tungstenite();
        let back = Message::from_tungstenite(out).unwrap();
        assert_eq!(back, Message::close(CLOSE_GOING_AWAY, "bye"));
    }
}
