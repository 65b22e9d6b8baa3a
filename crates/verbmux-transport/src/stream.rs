//! Upgraded connection split into independent read and write halves.

use std::fmt;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::{tungstenite, WebSocketStream};

use crate::error::{Result, TransportError};
use crate::message::Message;

/// Byte stream a WebSocket connection can run over.
///
/// Blanket-implemented for every suitable type: TCP streams, TLS streams
/// terminated elsewhere, in-memory duplex pipes.
pub trait Io: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Type-erased [`Io`].
pub type BoxedIo = Box<dyn Io>;

type WsStream = WebSocketStream<BoxedIo>;

/// An upgraded, message-oriented connection.
pub struct MessageStream {
    inner: WsStream,
}

impl MessageStream {
    pub(crate) fn new(inner: WsStream) -> Self {
        Self { inner }
    }

    /// Split into a writer and a reader that can be driven from different tasks.
    pub fn split(self) -> (MessageWriter, MessageReader) {
        let (sink, stream) = self.inner.split();
        (MessageWriter { sink }, MessageReader { stream })
    }
}

impl fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageStream").finish_non_exhaustive()
    }
}

/// Read half of a [`MessageStream`].
pub struct MessageReader {
    stream: SplitStream<WsStream>,
}

impl MessageReader {
    /// Wait for the next whole message.
    ///
    /// Returns `None` once the connection is closed. Pings are answered by
    /// the underlying protocol implementation but still surface here.
    pub async fn next(&mut self) -> Option<Result<Message>> {
        loop {
            match self.stream.next().await? {
                Ok(msg) => {
                    if let Some(msg) = Message::from_tungstenite(msg) {
                        return Some(Ok(msg));
                    }
                }
                Err(
                    tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed,
                ) => return None,
                Err(err) => return Some(Err(TransportError::from(err))),
            }
        }
    }
}

impl fmt::Debug for MessageReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageReader").finish_non_exhaustive()
    }
}

/// Write half of a [`MessageStream`].
///
/// Not synchronized: callers that share a writer between tasks must put it
/// behind a lock so whole messages never interleave.
pub struct MessageWriter {
    sink: SplitSink<WsStream, tungstenite::Message>,
}

impl MessageWriter {
    pub async fn send(&mut self, msg: Message) -> Result<()> {
        self.sink.send(msg.into_tungstenite()).await?;
        Ok(())
    }

    /// Send one binary message.
    pub async fn send_binary(&mut self, data: Bytes) -> Result<()> {
        self.send(Message::Binary(data)).await
    }

    pub async fn send_ping(&mut self, data: Bytes) -> Result<()> {
        self.send(Message::Ping(data)).await
    }

    /// Send a close frame without tearing down the stream.
    pub async fn send_close(&mut self, code: u16, reason: &str) -> Result<()> {
        self.send(Message::close(code, reason)).await
    }

    /// Flush and close the sink.
    pub async fn close(&mut self) -> Result<()> {
        match self.sink.close().await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl fmt::Debug for MessageWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageWriter").finish_non_exhaustive()
    }
}
