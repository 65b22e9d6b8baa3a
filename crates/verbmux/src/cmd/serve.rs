use std::sync::Arc;

use serde::Serialize;
use verbmux_peer::middleware::logger;
use verbmux_peer::{
    render, sockets, MuxConfig, Mux, PeerError, Request, SocketConfig, SocketWriter,
};
use verbmux_transport::WsListener;

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{io_error, peer_error, transport_error, CliResult, SUCCESS};

const ROOM_KEY: &str = "room";

#[derive(Debug, Serialize)]
struct RoomStatus<'a> {
    socket_id: &'a str,
    room: Option<&'a str>,
    members: usize,
}

pub async fn run(args: ServeArgs) -> CliResult<i32> {
    let mux = Arc::new(build_mux(socket_config(&args)?));
    let drain_timeout = parse_duration(&args.drain_timeout)?;

    let listener = WsListener::bind(args.addr.as_str())
        .await
        .map_err(|err| transport_error("bind failed", err))?;
    println!("ws://{}/", listener.local_addr());

    tokio::select! {
        served = mux.serve(listener) => {
            served.map_err(|err| peer_error("serve failed", err))?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|err| io_error("signal handler failed", err))?;
            tracing::info!(connections = mux.len(), "interrupt received, closing");
        }
    }

    mux.close();
    if !mux.drain(drain_timeout).await {
        tracing::warn!(
            remaining = mux.len(),
            timeout_ms = drain_timeout.as_millis() as u64,
            "connections still open after drain timeout"
        );
    }

    Ok(SUCCESS)
}

fn socket_config(args: &ServeArgs) -> CliResult<SocketConfig> {
    let read_timeout = parse_duration(&args.read_timeout)?;
    let ping_interval = if args.no_ping {
        None
    } else {
        match &args.ping_interval {
            Some(interval) => Some(parse_duration(interval)?),
            None => Some(read_timeout * 9 / 10),
        }
    };

    Ok(SocketConfig {
        read_timeout,
        write_timeout: parse_duration(&args.write_timeout)?,
        ping_interval,
        ..SocketConfig::default()
    })
}

/// The demo hub.
///
/// - `echo` answers with the request verb and body.
/// - `broadcast` forwards the body as `message` to every live connection.
/// - `message` forwards the body to the connection named by the `to` header.
/// - `room:join` / `room:leave` track a room name in connection metadata.
pub fn build_mux(socket: SocketConfig) -> Mux {
    let mut mux = Mux::with_config(MuxConfig::default().with_socket_config(socket));
    mux.use_middleware(logger());

    mux.on("echo", |w: Arc<dyn SocketWriter>, req: Request| async move {
        w.write(&req.verb, 200, req.body).await
    });

    mux.on("broadcast", |w: Arc<dyn SocketWriter>, req: Request| async move {
        let live = sockets(&*w);
        for (id, socket) in live.iter() {
            if let Err(err) = socket.write("message", 200, req.body.clone()).await {
                tracing::debug!(socket_id = %id, error = %err, "broadcast skipped connection");
            }
        }
        Ok(())
    });

    mux.on("message", |w: Arc<dyn SocketWriter>, req: Request| async move {
        let Some(to) = req.header.get("to") else {
            return Err(PeerError::handler(400, "missing \"to\" header"));
        };
        let live = sockets(&*w);
        let target = live
            .get(to)
            .ok_or_else(|| PeerError::handler(404, format!("no connection with id {to}")))?;
        target.write("message", 200, req.body).await
    });

    mux.route("room", |room| {
        room.on("join", |w: Arc<dyn SocketWriter>, req: Request| async move {
            let name = String::from_utf8_lossy(&req.body).trim().to_string();
            if name.is_empty() {
                return Err(PeerError::handler(400, "room name must not be empty"));
            }
            w.metadata().insert(ROOM_KEY, name.clone());
            respond_room(&*w, &req, Some(&name)).await
        });
        room.on("leave", |w: Arc<dyn SocketWriter>, req: Request| async move {
            w.metadata().remove(ROOM_KEY);
            respond_room(&*w, &req, None).await
        });
    });

    mux.on_connect(|w: Arc<dyn SocketWriter>| async move {
        tracing::info!(
            socket_id = %w.id(),
            remote_addr = %w.remote_addr(),
            user_agent = %w.user_agent(),
            connections = sockets(&*w).len(),
            "connection opened"
        );
    });
    mux.on_disconnect(|w: Arc<dyn SocketWriter>| async move {
        tracing::info!(
            socket_id = %w.id(),
            remote_addr = %w.remote_addr(),
            connections = sockets(&*w).len(),
            "connection closed"
        );
    });
    mux.on_error(|err: &PeerError| {
        tracing::warn!(error = %err, status = err.status(), "request failed");
    });

    mux
}

async fn respond_room(
    w: &dyn SocketWriter,
    req: &Request,
    room: Option<&str>,
) -> Result<(), PeerError> {
    let members = match room {
        Some(name) => sockets(w)
            .values()
            .filter(|s| {
                s.metadata()
                    .get::<String>(ROOM_KEY)
                    .is_some_and(|joined| joined.as_str() == name)
            })
            .count(),
        None => 0,
    };
    let status = RoomStatus {
        socket_id: w.id(),
        room,
        members,
    };
    render::respond(w, req, &status).await
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::sync::mpsc;
    use verbmux_peer::{Client, Response};
    use verbmux_transport::{pair, ConnectionInfo, TransportConfig};

    use super::*;

    async fn connect(mux: &Arc<Mux>) -> (Client, mpsc::UnboundedReceiver<Response>) {
        let (server, client) = pair(&TransportConfig::default()).await;
        mux.accept(server, ConnectionInfo::default())
            .await
            .expect("accept should succeed");
        let client = Client::from_stream(client, ConnectionInfo::default(), SocketConfig::default())
            .expect("client should start");
        let (tx, rx) = mpsc::unbounded_channel();
        client.on_any(move |resp| {
            let _ = tx.send(resp.clone());
        });
        (client, rx)
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<Response>) -> Response {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("response should arrive")
            .expect("channel open")
    }

    #[tokio::test]
    async fn echo_returns_body_under_request_verb() {
        let mux = Arc::new(build_mux(SocketConfig::default()));
        let (client, mut rx) = connect(&mux).await;

        client.send("Echo", "ping").await.expect("send");
        let resp = recv(&mut rx).await;
        assert_eq!(resp.verb, "Echo");
        assert_eq!(resp.status, 200);
        assert_eq!(&resp.payload[..], b"ping");
    }

    #[tokio::test]
    async fn broadcast_reaches_every_connection() {
        let mux = Arc::new(build_mux(SocketConfig::default()));
        let (a, mut rx_a) = connect(&mux).await;
        let (_b, mut rx_b) = connect(&mux).await;

        a.send("broadcast", "hi all").await.expect("send");
        for rx in [&mut rx_a, &mut rx_b] {
            let resp = recv(rx).await;
            assert_eq!(resp.verb, "message");
            assert_eq!(&resp.payload[..], b"hi all");
        }
    }

    #[tokio::test]
    async fn room_join_counts_members() {
        let mux = Arc::new(build_mux(SocketConfig::default()));
        let (a, mut rx_a) = connect(&mux).await;
        let (b, mut rx_b) = connect(&mux).await;

        a.send("room:join", "lobby").await.expect("send");
        let first: serde_json::Value =
            serde_json::from_slice(&recv(&mut rx_a).await.payload).expect("json");
        assert_eq!(first["members"], 1);

        b.send("room:join", "lobby").await.expect("send");
        let resp = recv(&mut rx_b).await;
        assert_eq!(resp.verb, "join");
        let second: serde_json::Value = serde_json::from_slice(&resp.payload).expect("json");
        assert_eq!(second["room"], "lobby");
        assert_eq!(second["members"], 2);
    }

    #[tokio::test]
    async fn message_without_target_is_rejected() {
        let mux = Arc::new(build_mux(SocketConfig::default()));
        let (client, _rx) = connect(&mux).await;
        let errors = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&errors);
        let (tx, mut done) = mpsc::unbounded_channel();
        client.on_error(move |err| {
            seen.lock().unwrap().push(err.status());
            let _ = tx.send(());
        });

        client.send("message", "lost").await.expect("send");
        tokio::time::timeout(Duration::from_secs(2), done.recv())
            .await
            .expect("error should arrive");
        assert_eq!(*errors.lock().unwrap(), vec![400]);
    }

    #[test]
    fn no_ping_disables_keepalive() {
        let args = ServeArgs {
            addr: "127.0.0.1:0".into(),
            read_timeout: "20s".into(),
            write_timeout: "1s".into(),
            ping_interval: None,
            no_ping: true,
            drain_timeout: "1s".into(),
        };
        let config = socket_config(&args).expect("config");
        assert_eq!(config.ping_interval, None);
        assert_eq!(config.read_timeout, Duration::from_secs(20));

        let args = ServeArgs {
            no_ping: false,
            ..args
        };
        let config = socket_config(&args).expect("config");
        assert_eq!(config.ping_interval, Some(Duration::from_secs(18)));
    }
}
