//! WebSocket listener, server-side upgrade and client-side dial.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request as UpgradeRequest, Response as UpgradeResponse,
};
use tokio_tungstenite::tungstenite::http::{header, HeaderMap, HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::{Role, WebSocketConfig};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::info::ConnectionInfo;
use crate::stream::{BoxedIo, Io, MessageStream};

/// Transport-level limits applied to every connection.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Largest whole message accepted from the peer, in bytes.
    pub max_message_size: usize,
    /// How long the HTTP upgrade handshake may take.
    pub handshake_timeout: Duration,
}

impl TransportConfig {
    /// Default maximum message size (16 MiB).
    pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
    pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

    fn ws_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_message_size);
        config.max_frame_size = Some(self.max_message_size);
        config
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_message_size: Self::DEFAULT_MAX_MESSAGE_SIZE,
            handshake_timeout: Self::DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

/// TCP listener producing connections ready for [`upgrade`].
pub struct WsListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl WsListener {
    /// Bind and listen on a TCP address.
    pub async fn bind(addr: impl ToSocketAddrs + std::fmt::Display) -> Result<Self> {
        let display = addr.to_string();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::Bind {
                addr: display.clone(),
                source: e,
            })?;
        let local_addr = listener.local_addr().map_err(|e| TransportError::Bind {
            addr: display,
            source: e,
        })?;

        info!(%local_addr, "listening for websocket connections");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept the next TCP connection. The upgrade has not happened yet.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await.map_err(TransportError::Accept)?;
        stream.set_nodelay(true)?;
        debug!(%peer, "accepted connection");
        Ok((stream, peer))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "websocket"
    }
}

/// Perform the server side of the HTTP upgrade on `io`.
///
/// `info` carries whatever the caller already knows (addresses, TLS state);
/// the user agent and negotiated subprotocol are filled in from the request.
/// The first subprotocol offered by the client is echoed back.
pub async fn upgrade<S: Io>(
    io: S,
    mut info: ConnectionInfo,
    config: &TransportConfig,
) -> Result<(MessageStream, ConnectionInfo)> {
    let mut user_agent = String::new();
    let mut subprotocol = None;

    let callback = |req: &UpgradeRequest,
                    mut resp: UpgradeResponse|
     -> std::result::Result<UpgradeResponse, ErrorResponse> {
        user_agent = header_str(req.headers(), header::USER_AGENT);
        if let Some(proto) = first_subprotocol(req.headers()) {
            if let Ok(value) = HeaderValue::from_str(&proto) {
                resp.headers_mut()
                    .insert(header::SEC_WEBSOCKET_PROTOCOL, value);
                subprotocol = Some(proto);
            }
        }
        Ok(resp)
    };

    let io: BoxedIo = Box::new(io);
    let handshake =
        tokio_tungstenite::accept_hdr_async_with_config(io, callback, Some(config.ws_config()));
    let ws = tokio::time::timeout(config.handshake_timeout, handshake)
        .await
        .map_err(|_| TransportError::HandshakeTimeout(config.handshake_timeout))?
        .map_err(|e| TransportError::Handshake(Box::new(e)))?;

    info.user_agent = user_agent;
    info.subprotocol = subprotocol;
    debug!(remote = %info.remote_addr, user_agent = %info.user_agent, "websocket upgrade complete");

    Ok((MessageStream::new(ws), info))
}

/// Dial a `ws://` URL and perform the client side of the upgrade.
///
/// `headers` are added to the upgrade request. `wss://` is rejected: TLS
/// must be terminated outside of verbmux.
pub async fn dial(
    url: &str,
    headers: &[(String, String)],
    config: &TransportConfig,
) -> Result<(MessageStream, ConnectionInfo)> {
    let invalid = |reason: String| TransportError::InvalidUrl {
        url: url.to_string(),
        reason,
    };

    let mut request = url.into_client_request().map_err(|e| invalid(e.to_string()))?;
    for (name, value) in headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| TransportError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        let header_value =
            HeaderValue::from_str(value).map_err(|e| TransportError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        request.headers_mut().insert(header_name, header_value);
    }

    let uri = request.uri().clone();
    match uri.scheme_str() {
        Some("ws") => {}
        Some("wss") => return Err(invalid("wss requires external TLS termination".to_string())),
        other => return Err(invalid(format!("unsupported scheme {other:?}"))),
    }
    let host = uri
        .host()
        .ok_or_else(|| invalid("missing host".to_string()))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    let port = uri.port_u16().unwrap_or(80);

    let tcp = tokio::time::timeout(config.handshake_timeout, TcpStream::connect((host.as_str(), port)))
        .await
        .map_err(|_| TransportError::HandshakeTimeout(config.handshake_timeout))?
        .map_err(|e| TransportError::Connect {
            url: url.to_string(),
            source: e,
        })?;
    tcp.set_nodelay(true)?;

    let mut info = ConnectionInfo {
        remote_addr: tcp.peer_addr().map(|a| a.to_string()).unwrap_or_default(),
        endpoint_addr: tcp.local_addr().map(|a| a.to_string()).unwrap_or_default(),
        user_agent: header_str(request.headers(), header::USER_AGENT),
        ..ConnectionInfo::default()
    };

    let io: BoxedIo = Box::new(tcp);
    let handshake =
        tokio_tungstenite::client_async_with_config(request, io, Some(config.ws_config()));
    let (ws, response) = tokio::time::timeout(config.handshake_timeout, handshake)
        .await
        .map_err(|_| TransportError::HandshakeTimeout(config.handshake_timeout))?
        .map_err(|e| TransportError::Handshake(Box::new(e)))?;

    info.subprotocol = response
        .headers()
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    debug!(url, remote = %info.remote_addr, "websocket dial complete");

    Ok((MessageStream::new(ws), info))
}

/// Two already-upgraded streams connected back to back in memory.
///
/// The first stream plays the server role, the second the client role.
pub async fn pair(config: &TransportConfig) -> (MessageStream, MessageStream) {
    let (server_io, client_io) = tokio::io::duplex(64 * 1024);
    let server_io: BoxedIo = Box::new(server_io);
    let client_io: BoxedIo = Box::new(client_io);
    let server =
        WebSocketStream::from_raw_socket(server_io, Role::Server, Some(config.ws_config())).await;
    let client =
        WebSocketStream::from_raw_socket(client_io, Role::Client, Some(config.ws_config())).await;
    (MessageStream::new(server), MessageStream::new(client))
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn first_subprotocol(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::SEC_WEBSOCKET_PROTOCOL)?
        .to_str()
        .ok()?
        .split(',')
        .map(str::trim)
        .find(|p| !p.is_empty())
        .map(str::to_string)
}
