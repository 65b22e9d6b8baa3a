use std::time::Duration;

use verbmux_frame::FrameConfig;
use verbmux_transport::TransportConfig;

/// Symbols used for generated connection ids.
pub const ALPHANUMERIC: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Per-connection behavior shared by server sockets and clients.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Idle deadline: the connection closes when nothing arrives for this long.
    pub read_timeout: Duration,
    /// Upper bound for a single outbound message, lock wait included.
    pub write_timeout: Duration,
    /// Upper bound for the close handshake during shutdown.
    pub close_timeout: Duration,
    /// Keep-alive ping period. `None` disables pings.
    pub ping_interval: Option<Duration>,
    /// Length of generated connection ids.
    pub id_length: usize,
    /// Symbols generated connection ids are drawn from.
    pub id_alphabet: String,
    pub frame: FrameConfig,
    pub transport: TransportConfig,
}

impl SocketConfig {
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);
    pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(30);
    /// 9/10 of the default read deadline.
    pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(54);
    pub const DEFAULT_ID_LENGTH: usize = 20;
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            read_timeout: Self::DEFAULT_READ_TIMEOUT,
            write_timeout: Self::DEFAULT_WRITE_TIMEOUT,
            close_timeout: Self::DEFAULT_CLOSE_TIMEOUT,
            ping_interval: Some(Self::DEFAULT_PING_INTERVAL),
            id_length: Self::DEFAULT_ID_LENGTH,
            id_alphabet: ALPHANUMERIC.to_string(),
            frame: FrameConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

/// Router configuration.
#[derive(Debug, Clone, Default)]
pub struct MuxConfig {
    /// Applied to every accepted socket.
    pub socket: SocketConfig,
}

impl MuxConfig {
    pub fn with_socket_config(mut self, socket: SocketConfig) -> Self {
        self.socket = socket;
        self
    }
}
