//! End-to-end behavior over real loopback TCP connections.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use verbmux::peer::{from_fn, sockets, Client, Mux, Next, PeerError, Request, Response, SocketWriter};
use verbmux::transport::WsListener;

const WAIT: Duration = Duration::from_secs(3);

async fn serve(mux: Mux) -> (Arc<Mux>, String) {
    let mux = Arc::new(mux);
    let listener = WsListener::bind("127.0.0.1:0")
        .await
        .expect("bind should succeed");
    let url = format!("ws://{}/", listener.local_addr());
    let serving = Arc::clone(&mux);
    tokio::spawn(async move { serving.serve(listener).await });
    (mux, url)
}

async fn dial(url: &str) -> Client {
    Client::dial(url, &[]).await.expect("dial should succeed")
}

fn collect_any(client: &Client) -> mpsc::UnboundedReceiver<Response> {
    let (tx, rx) = mpsc::unbounded_channel();
    client.on_any(move |resp| {
        let _ = tx.send(resp.clone());
    });
    rx
}

fn collect_errors(client: &Client) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    client.on_error(move |err| {
        let _ = tx.send(err.to_string());
    });
    rx
}

async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("message should arrive in time")
        .expect("channel should stay open")
}

async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn handler_observes_request_as_sent() {
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let mut mux = Mux::new();
    mux.on("join", move |_w: Arc<dyn SocketWriter>, req: Request| {
        let seen_tx = seen_tx.clone();
        async move {
            let _ = seen_tx.send((req.verb.clone(), req.body.clone()));
            Ok(())
        }
    });
    let (mux, url) = serve(mux).await;

    let client = dial(&url).await;
    client.send("join", "jack").await.expect("send");

    let (verb, body) = next(&mut seen_rx).await;
    assert_eq!(verb, "join");
    assert_eq!(&body[..], b"jack");
    mux.close();
}

#[tokio::test]
async fn mounted_router_sees_rewritten_verb() {
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let mut mux = Mux::new();
    mux.route("message", |sub| {
        sub.on("insert", move |w: Arc<dyn SocketWriter>, req: Request| {
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send(req.verb.clone());
                w.write("inserted", 201, req.body).await
            }
        });
    });
    let (mux, url) = serve(mux).await;

    let client = dial(&url).await;
    let mut responses = collect_any(&client);
    client.send("Message:insert", "row").await.expect("send");

    assert_eq!(next(&mut seen_rx).await, "insert");
    let resp = next(&mut responses).await;
    assert_eq!(resp.verb, "inserted");
    assert_eq!(resp.status, 201);
    assert_eq!(&resp.payload[..], b"row");
    mux.close();
}

#[tokio::test]
async fn unknown_route_yields_one_error_and_one_hook_call() {
    let hook_calls = Arc::new(Mutex::new(Vec::new()));
    let mut mux = Mux::new();
    let calls = Arc::clone(&hook_calls);
    mux.on_error(move |err: &PeerError| {
        calls.lock().unwrap().push(err.to_string());
    });
    let (mux, url) = serve(mux).await;

    let client = dial(&url).await;
    let mut errors = collect_errors(&client);
    client.send("message", "Hi").await.expect("send");

    assert_eq!(next(&mut errors).await, "The route \"message\" does not exist");
    eventually(|| !hook_calls.lock().unwrap().is_empty()).await;

    // Nothing else is delivered for the same request.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(errors.try_recv().is_err());
    assert_eq!(
        *hook_calls.lock().unwrap(),
        vec!["The route \"message\" does not exist".to_string()]
    );
    mux.close();
}

#[tokio::test]
async fn broadcast_reaches_other_clients() {
    let mut mux = Mux::new();
    mux.on("message", |w: Arc<dyn SocketWriter>, req: Request| async move {
        for socket in sockets(&*w).values() {
            socket.write("message", 200, req.body.clone()).await?;
        }
        Ok(())
    });
    let (mux, url) = serve(mux).await;

    let a = dial(&url).await;
    let (a_tx, mut a_rx) = mpsc::unbounded_channel();
    a.on("message", move |resp| {
        let _ = a_tx.send(resp.text().into_owned());
    });
    let b = dial(&url).await;
    eventually(|| mux.len() == 2).await;

    b.send("message", "Hi from B").await.expect("send");
    assert_eq!(next(&mut a_rx).await, "Hi from B");
    mux.close();
}

#[tokio::test]
async fn disconnect_removes_exactly_one_connection() {
    let disconnects = Arc::new(AtomicUsize::new(0));
    let remaining = Arc::new(Mutex::new(None));
    let mut mux = Mux::new();
    let counter = Arc::clone(&disconnects);
    let snapshot = Arc::clone(&remaining);
    mux.on_disconnect(move |w: Arc<dyn SocketWriter>| {
        let counter = Arc::clone(&counter);
        let snapshot = Arc::clone(&snapshot);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            *snapshot.lock().unwrap() = Some(sockets(&*w).len());
        }
    });
    let (mux, url) = serve(mux).await;

    let stays = dial(&url).await;
    let leaves = dial(&url).await;
    eventually(|| mux.len() == 2).await;

    leaves.close();
    leaves.closed().await;
    eventually(|| disconnects.load(Ordering::SeqCst) == 1).await;
    assert_eq!(mux.len(), 1);
    assert_eq!(*remaining.lock().unwrap(), Some(1));
    assert!(!mux.sockets().is_empty());

    stays.close();
    stays.closed().await;
    eventually(|| disconnects.load(Ordering::SeqCst) == 2).await;
    assert!(mux.is_empty());
    assert_eq!(*remaining.lock().unwrap(), Some(0));
    mux.close();
}

#[tokio::test]
async fn empty_verb_is_rejected_locally() {
    let received = Arc::new(AtomicUsize::new(0));
    let mut mux = Mux::new();
    let count = Arc::clone(&received);
    mux.use_middleware(from_fn(move |w: Arc<dyn SocketWriter>, req: Request, next: Next| {
        let count = Arc::clone(&count);
        async move {
            count.fetch_add(1, Ordering::SeqCst);
            next.run(w, req).await
        }
    }));
    mux.on("ping", |w: Arc<dyn SocketWriter>, req: Request| async move {
        w.write("pong", 200, req.body).await
    });
    let (mux, url) = serve(mux).await;

    let client = dial(&url).await;
    let mut responses = collect_any(&client);
    let err = client
        .execute(&Request::new("", "ignored"))
        .await
        .expect_err("empty verb must fail");
    assert!(matches!(err, PeerError::EmptyVerb));

    // The connection is still usable and the server saw only the ping.
    client.send("ping", "x").await.expect("send");
    assert_eq!(next(&mut responses).await.verb, "pong");
    assert_eq!(received.load(Ordering::SeqCst), 1);
    mux.close();
}

#[tokio::test]
async fn close_drains_every_connection() {
    let (mux, url) = serve(Mux::new()).await;
    let a = dial(&url).await;
    let b = dial(&url).await;
    eventually(|| mux.len() == 2).await;

    mux.close();
    assert!(mux.drain(WAIT).await);
    for client in [a, b] {
        tokio::time::timeout(WAIT, client.closed())
            .await
            .expect("client should observe the close");
    }
}
