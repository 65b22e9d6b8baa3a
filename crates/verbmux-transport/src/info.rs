//! Metadata captured when a connection is established.

/// TLS session details for a connection whose TLS was terminated upstream.
///
/// verbmux never performs TLS itself; whoever terminated TLS fills this in
/// and hands it over together with the plain duplex stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsInfo {
    /// Negotiated protocol version, e.g. `TLSv1.3`.
    pub version: String,
    /// Negotiated cipher suite name.
    pub cipher_suite: String,
    /// SNI server name sent by the client, if any.
    pub server_name: Option<String>,
    /// Negotiated ALPN protocol, if any.
    pub alpn: Option<String>,
}

/// Connection metadata handed to the connection actor alongside the stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Address of the remote end (`ip:port`), empty when unknown.
    pub remote_addr: String,
    /// Local address the connection was accepted on or dialed from.
    pub endpoint_addr: String,
    /// `User-Agent` header sent with the upgrade request.
    pub user_agent: String,
    /// Subprotocol selected during the upgrade.
    pub subprotocol: Option<String>,
    /// TLS state, when TLS was terminated in front of this connection.
    pub tls: Option<TlsInfo>,
}

impl ConnectionInfo {
    /// Attach TLS details.
    pub fn with_tls(mut self, tls: TlsInfo) -> Self {
        self.tls = Some(tls);
        self
    }

    /// URL scheme matching the TLS state.
    pub fn scheme(&self) -> &'static str {
        if self.tls.is_some() {
            "wss"
        } else {
            "ws"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_follows_tls_state() {
        let plain = ConnectionInfo::default();
        assert_eq!(plain.scheme(), "ws");

        let secure = plain.with_tls(TlsInfo {
            version: "TLSv1.3".to_string(),
            ..TlsInfo::default()
        });
        assert_eq!(secure.scheme(), "wss");
    }
}
