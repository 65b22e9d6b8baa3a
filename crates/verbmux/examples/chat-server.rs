//! Minimal chat hub: every `message` request is broadcast to all clients.
//!
//! Run with:
//!   cargo run --example chat-server
//!
//! In another terminal:
//!   cargo run --features cli -- send ws://127.0.0.1:9300/ \
//!     --verb message --data 'hello' --wait --wait-timeout 3

use std::sync::Arc;

use verbmux::peer::{sockets, Mux, Request, SocketWriter};
use verbmux::transport::WsListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut mux = Mux::new();

    mux.on("message", |w: Arc<dyn SocketWriter>, req: Request| async move {
        let live = sockets(&*w);
        eprintln!("{} says {:?} to {} clients", w.id(), req.body, live.len());
        for socket in live.values() {
            socket.write("message", 200, req.body.clone()).await?;
        }
        Ok(())
    });

    mux.on_connect(|w: Arc<dyn SocketWriter>| async move {
        eprintln!("client connected: {} from {}", w.id(), w.remote_addr());
    });
    mux.on_disconnect(|w: Arc<dyn SocketWriter>| async move {
        eprintln!(
            "client disconnected: {} ({} left)",
            w.id(),
            sockets(&*w).len()
        );
    });

    let mux = Arc::new(mux);
    let listener = WsListener::bind("127.0.0.1:9300").await?;
    eprintln!("Listening on ws://{}/", listener.local_addr());

    let serving = Arc::clone(&mux);
    let server = tokio::spawn(async move { serving.serve(listener).await });

    tokio::signal::ctrl_c().await?;
    mux.close();
    server.await??;
    Ok(())
}
