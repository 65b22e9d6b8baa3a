//! Connection actor core shared by server sockets and clients.

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use verbmux_transport::{
    Message, MessageReader, MessageStream, MessageWriter, CLOSE_GOING_AWAY, CLOSE_NORMAL,
};

use crate::config::SocketConfig;
use crate::error::{PeerError, Result};

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// Lifecycle of a connection. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Open,
    Closing,
    Closed,
}

/// Why a receive loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Local stop signal.
    Stopped,
    /// The peer sent a close frame.
    PeerClosed { code: u16, reason: String },
    /// The stream ended without a close frame.
    Eof,
    /// Nothing arrived within the read deadline.
    IdleTimeout(Duration),
    /// The transport failed.
    Transport(String),
}

pub(crate) struct Conn {
    writer: tokio::sync::Mutex<MessageWriter>,
    reader: Mutex<Option<MessageReader>>,
    state: AtomicU8,
    stop: CancellationToken,
    done: CancellationToken,
    config: SocketConfig,
}

impl Conn {
    pub(crate) fn new(stream: MessageStream, config: SocketConfig, stop: CancellationToken) -> Self {
        let (writer, reader) = stream.split();
        Self {
            writer: tokio::sync::Mutex::new(writer),
            reader: Mutex::new(Some(reader)),
            state: AtomicU8::new(OPEN),
            stop,
            done: CancellationToken::new(),
            config,
        }
    }

    pub(crate) fn config(&self) -> &SocketConfig {
        &self.config
    }

    pub(crate) fn state(&self) -> ConnState {
        match self.state.load(Ordering::Acquire) {
            OPEN => ConnState::Open,
            CLOSING => ConnState::Closing,
            _ => ConnState::Closed,
        }
    }

    /// Ask the receive loop to shut down. Never blocks.
    pub(crate) fn close(&self) {
        self.stop.cancel();
    }

    /// Resolves once the connection reached [`ConnState::Closed`].
    pub(crate) async fn closed(&self) {
        self.done.cancelled().await;
    }

    /// Send one binary message. The lock wait counts against the write deadline.
    pub(crate) async fn send(&self, data: Bytes) -> Result<()> {
        if self.state() != ConnState::Open {
            return Err(PeerError::Closed);
        }
        let deadline = self.config.write_timeout;
        tokio::time::timeout(deadline, async {
            let mut writer = self.writer.lock().await;
            writer.send_binary(data).await
        })
        .await
        .map_err(|_| PeerError::Timeout(deadline))??;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let deadline = self.config.write_timeout;
        tokio::time::timeout(deadline, async {
            let mut writer = self.writer.lock().await;
            writer.send_ping(Bytes::new()).await
        })
        .await
        .map_err(|_| PeerError::Timeout(deadline))??;
        Ok(())
    }

    /// Run the receive loop until the connection ends.
    ///
    /// Every text or binary message is passed to `on_frame` and awaited
    /// before the next read, so a slow callback delays later frames on this
    /// connection. Any inbound message refreshes the idle deadline, and so
    /// does each callback returning.
    pub(crate) async fn run<F, Fut>(&self, mut on_frame: F) -> CloseReason
    where
        F: FnMut(Bytes) -> Fut,
        Fut: Future<Output = ()>,
    {
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut reader) = reader else {
            return CloseReason::Stopped;
        };

        let idle = self.config.read_timeout;
        let mut deadline = Instant::now() + idle;
        let mut ping = self.config.ping_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        let reason = loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break CloseReason::Stopped,
                _ = tokio::time::sleep_until(deadline) => break CloseReason::IdleTimeout(idle),
                _ = next_tick(&mut ping) => {
                    if let Err(err) = self.ping().await {
                        break CloseReason::Transport(err.to_string());
                    }
                    trace!("keep-alive ping sent");
                }
                msg = reader.next() => match msg {
                    None => break CloseReason::Eof,
                    Some(Err(err)) => break CloseReason::Transport(err.to_string()),
                    Some(Ok(msg)) => {
                        deadline = Instant::now() + idle;
                        match msg {
                            Message::Binary(data) | Message::Text(data) => {
                                on_frame(data).await;
                                // Time spent in the callback is not idle time.
                                deadline = Instant::now() + idle;
                            }
                            Message::Close { code, reason } => {
                                break CloseReason::PeerClosed { code, reason };
                            }
                            Message::Ping(_) | Message::Pong(_) => {}
                        }
                    }
                },
            }
        };

        self.shutdown(&reason).await;
        drop(reader);
        reason
    }

    /// Open -> Closing -> Closed, exactly once.
    async fn shutdown(&self, reason: &CloseReason) {
        if self
            .state
            .compare_exchange(OPEN, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let close_frame = match reason {
            CloseReason::Stopped => Some((CLOSE_NORMAL, "")),
            CloseReason::IdleTimeout(_) => Some((CLOSE_GOING_AWAY, "idle timeout")),
            // The peer's close is answered by the protocol layer; a broken
            // transport cannot carry one.
            CloseReason::PeerClosed { .. } | CloseReason::Eof | CloseReason::Transport(_) => None,
        };

        let write_timeout = self.config.write_timeout;
        let close_timeout = self.config.close_timeout;
        let result = tokio::time::timeout(close_timeout, async {
            let mut writer = self.writer.lock().await;
            if let Some((code, text)) = close_frame {
                match tokio::time::timeout(write_timeout, writer.send_close(code, text)).await {
                    Ok(Err(err)) => debug!(error = %err, "failed to send close frame"),
                    Err(_) => debug!("timed out sending close frame"),
                    Ok(Ok(())) => {}
                }
            }
            writer.close().await
        })
        .await;

        match result {
            Ok(Err(err)) => debug!(error = %err, "error closing connection"),
            Err(_) => debug!(?close_timeout, "close handshake timed out"),
            Ok(Ok(())) => {}
        }

        self.state.store(CLOSED, Ordering::Release);
        self.done.cancel();
    }
}

async fn next_tick(ping: &mut Option<Interval>) {
    match ping {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use verbmux_transport::{pair, TransportConfig};

    use super::*;

    fn quick_config() -> SocketConfig {
        SocketConfig {
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(1),
            close_timeout: Duration::from_secs(1),
            ping_interval: None,
            ..SocketConfig::default()
        }
    }

    #[tokio::test]
    async fn stop_closes_and_rejects_writes() {
        let (local, remote) = pair(&TransportConfig::default()).await;
        let conn = Arc::new(Conn::new(local, quick_config(), CancellationToken::new()));
        let (_remote_tx, mut remote_rx) = remote.split();

        let runner = Arc::clone(&conn);
        let task = tokio::spawn(async move { runner.run(|_| async {}).await });

        conn.send(Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(
            remote_rx.next().await.unwrap().unwrap(),
            Message::Binary(Bytes::from_static(b"hello"))
        );

        conn.close();
        conn.close();
        assert_eq!(task.await.unwrap(), CloseReason::Stopped);
        conn.closed().await;
        assert_eq!(conn.state(), ConnState::Closed);

        match remote_rx.next().await {
            Some(Ok(Message::Close { code, .. })) => assert_eq!(code, CLOSE_NORMAL),
            other => panic!("expected close frame, got {other:?}"),
        }

        assert!(matches!(
            conn.send(Bytes::from_static(b"late")).await,
            Err(PeerError::Closed)
        ));
    }

    #[tokio::test]
    async fn idle_connection_times_out() {
        let (local, _remote) = pair(&TransportConfig::default()).await;
        let config = SocketConfig {
            read_timeout: Duration::from_millis(50),
            ..quick_config()
        };
        let conn = Conn::new(local, config, CancellationToken::new());
        let reason = conn.run(|_| async {}).await;
        assert_eq!(reason, CloseReason::IdleTimeout(Duration::from_millis(50)));
        assert_eq!(conn.state(), ConnState::Closed);
    }

    #[tokio::test]
    async fn frames_are_delivered_in_order_until_peer_closes() {
        let (local, remote) = pair(&TransportConfig::default()).await;
        let (mut remote_tx, _remote_rx) = remote.split();
        let conn = Conn::new(local, quick_config(), CancellationToken::new());

        remote_tx.send_binary(Bytes::from_static(b"one")).await.unwrap();
        remote_tx
            .send(Message::Text(Bytes::from_static(b"two")))
            .await
            .unwrap();
        remote_tx.send_close(CLOSE_NORMAL, "done").await.unwrap();

        let mut seen = Vec::new();
        let reason = conn
            .run(|data| {
                seen.push(data);
                async {}
            })
            .await;

        assert_eq!(
            seen,
            vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]
        );
        assert_eq!(
            reason,
            CloseReason::PeerClosed {
                code: CLOSE_NORMAL,
                reason: "done".to_string()
            }
        );
    }

    #[tokio::test]
    async fn slow_callback_does_not_count_as_idle() {
        let (local, remote) = pair(&TransportConfig::default()).await;
        let (mut remote_tx, _remote_rx) = remote.split();
        let config = SocketConfig {
            read_timeout: Duration::from_millis(200),
            ..quick_config()
        };
        let conn = Arc::new(Conn::new(local, config, CancellationToken::new()));

        remote_tx.send_binary(Bytes::from_static(b"one")).await.unwrap();
        remote_tx.send_binary(Bytes::from_static(b"two")).await.unwrap();

        let handled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&handled);
        let runner = Arc::clone(&conn);
        let task = tokio::spawn(async move {
            runner
                .run(move |_| {
                    let counter = Arc::clone(&counter);
                    async move {
                        tokio::time::sleep(Duration::from_millis(300)).await;
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                })
                .await
        });

        let deadline = Instant::now() + Duration::from_secs(3);
        while handled.load(Ordering::SeqCst) < 2 {
            assert!(!task.is_finished(), "receive loop ended early");
            assert!(Instant::now() < deadline, "frames were not delivered");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        conn.close();
        assert_eq!(task.await.unwrap(), CloseReason::Stopped);
        assert_eq!(handled.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn keepalive_holds_quiet_connection_open() {
        let (local, remote) = pair(&TransportConfig::default()).await;
        let (_remote_tx, mut remote_rx) = remote.split();
        let config = SocketConfig {
            read_timeout: Duration::from_millis(150),
            ping_interval: Some(Duration::from_millis(50)),
            ..quick_config()
        };
        let conn = Arc::new(Conn::new(local, config, CancellationToken::new()));

        // The remote answers pings with pongs only while it is being read.
        let remote = tokio::spawn(async move {
            let mut pings = 0;
            while let Some(Ok(msg)) = remote_rx.next().await {
                match msg {
                    Message::Ping(_) => pings += 1,
                    Message::Close { .. } => break,
                    _ => {}
                }
            }
            pings
        });

        let runner = Arc::clone(&conn);
        let task = tokio::spawn(async move { runner.run(|_| async {}).await });

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!task.is_finished(), "pinged connection timed out");
        assert_eq!(conn.state(), ConnState::Open);

        conn.close();
        assert_eq!(task.await.unwrap(), CloseReason::Stopped);
        assert!(remote.await.unwrap() >= 3);
    }
}
