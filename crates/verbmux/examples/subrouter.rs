//! Hierarchical verbs: `user:create` and `user:get` are served by a router
//! mounted under `user`. The example dials itself and prints the replies.
//!
//! Run with:
//!   cargo run --example subrouter

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use verbmux::peer::middleware::logger;
use verbmux::peer::{render, Client, Mux, PeerError, Request, SocketWriter};
use verbmux::transport::WsListener;

type Users = Arc<Mutex<HashMap<String, String>>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let users: Users = Arc::default();

    let mut mux = Mux::new();
    mux.use_middleware(logger());
    mux.route("user", |user| {
        let store = Arc::clone(&users);
        user.on("create", move |w: Arc<dyn SocketWriter>, mut req: Request| {
            let store = Arc::clone(&store);
            async move {
                let name = String::from_utf8_lossy(&req.body).into_owned();
                let id = format!("u{}", store.lock().map(|u| u.len()).unwrap_or(0) + 1);
                if let Ok(mut users) = store.lock() {
                    users.insert(id.clone(), name.clone());
                }
                render::status(&mut req, 201);
                render::respond(&*w, &req, &serde_json::json!({ "id": id, "name": name })).await
            }
        });

        let store = Arc::clone(&users);
        user.on("get", move |w: Arc<dyn SocketWriter>, req: Request| {
            let store = Arc::clone(&store);
            async move {
                let id = String::from_utf8_lossy(&req.body).into_owned();
                let name = store
                    .lock()
                    .ok()
                    .and_then(|users| users.get(&id).cloned())
                    .ok_or_else(|| PeerError::handler(404, format!("no user {id}")))?;
                render::respond(&*w, &req, &serde_json::json!({ "id": id, "name": name })).await
            }
        });
    });

    let mux = Arc::new(mux);
    let listener = WsListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}/", listener.local_addr());
    let serving = Arc::clone(&mux);
    tokio::spawn(async move { serving.serve(listener).await });

    let client = Client::dial(&url, &[]).await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let errors = tx.clone();
    client.on_any(move |resp| {
        let _ = tx.send(format!("{} {} {}", resp.verb, resp.status, resp.text().trim_end()));
    });
    client.on_error(move |err| {
        let _ = errors.send(format!("error {} {}", err.status(), err));
    });

    client.send("user:create", "ada").await?;
    client.send("user:get", "u1").await?;
    client.send("user:get", "u9").await?;
    for _ in 0..3 {
        match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Some(line)) => println!("{line}"),
            _ => break,
        }
    }

    client.close();
    client.closed().await;
    mux.close();
    Ok(())
}
