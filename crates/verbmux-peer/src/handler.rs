use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use verbmux_frame::Request;

use crate::error::Result;
use crate::writer::SocketWriter;

/// Something that serves requests arriving on a connection.
///
/// Returning `Err` makes the router send the error to the peer as an
/// `error` frame with [`PeerError::status`](crate::PeerError::status).
#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve_rpc(&self, w: Arc<dyn SocketWriter>, req: Request) -> Result<()>;
}

/// [`Handler`] backed by an async closure.
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Arc<dyn SocketWriter>, Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn serve_rpc(&self, w: Arc<dyn SocketWriter>, req: Request) -> Result<()> {
        (self.f)(w, req).await
    }
}

/// Turn an async closure into a shareable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Arc<dyn SocketWriter>, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(HandlerFn { f })
}

/// Decorates a handler.
pub type Middleware = Arc<dyn Fn(Arc<dyn Handler>) -> Arc<dyn Handler> + Send + Sync>;

/// Compose `middlewares` around `endpoint`.
///
/// The first middleware is the outermost: the result is
/// `mw[0](mw[1](...(endpoint)))`.
pub fn chain(middlewares: &[Middleware], endpoint: Arc<dyn Handler>) -> Arc<dyn Handler> {
    middlewares
        .iter()
        .rev()
        .fold(endpoint, |next, middleware| middleware(next))
}

/// The rest of the chain, as seen from a [`from_fn`] middleware.
#[derive(Clone)]
pub struct Next {
    inner: Arc<dyn Handler>,
}

impl Next {
    pub async fn run(&self, w: Arc<dyn SocketWriter>, req: Request) -> Result<()> {
        self.inner.serve_rpc(w, req).await
    }
}

struct FromFn<F> {
    f: Arc<F>,
    next: Next,
}

#[async_trait]
impl<F, Fut> Handler for FromFn<F>
where
    F: Fn(Arc<dyn SocketWriter>, Request, Next) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn serve_rpc(&self, w: Arc<dyn SocketWriter>, req: Request) -> Result<()> {
        (self.f)(w, req, self.next.clone()).await
    }
}

/// Build a middleware from an async closure that decides when to call [`Next::run`].
pub fn from_fn<F, Fut>(f: F) -> Middleware
where
    F: Fn(Arc<dyn SocketWriter>, Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |next: Arc<dyn Handler>| -> Arc<dyn Handler> {
        Arc::new(FromFn {
            f: Arc::clone(&f),
            next: Next { inner: next },
        })
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bytes::Bytes;
    use tokio_util::sync::CancellationToken;
    use verbmux_transport::{pair, ConnectionInfo, TransportConfig};

    use super::*;
    use crate::config::SocketConfig;
    use crate::socket::Socket;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(log: &Log, name: &'static str) -> Middleware {
        let log = Arc::clone(log);
        from_fn(move |w, req, next| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(format!("{name}-before"));
                let result = next.run(w, req).await;
                log.lock().unwrap().push(format!("{name}-after"));
                result
            }
        })
    }

    #[tokio::test]
    async fn first_registered_middleware_is_outermost() {
        let log: Log = Arc::default();
        let endpoint_log = Arc::clone(&log);
        let endpoint = handler_fn(move |_w, req: Request| {
            let log = Arc::clone(&endpoint_log);
            async move {
                assert_eq!(req.body, Bytes::from_static(b"jack"));
                log.lock().unwrap().push("handler".to_string());
                Ok(())
            }
        });

        let handler = chain(&[recorder(&log, "a"), recorder(&log, "b")], endpoint);

        let (server, _client) = pair(&TransportConfig::default()).await;
        let socket = Socket::new(
            server,
            ConnectionInfo::default(),
            SocketConfig::default(),
            CancellationToken::new(),
            None,
        )
        .unwrap();

        handler
            .serve_rpc(socket, Request::new("join", "jack"))
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a-before", "b-before", "handler", "b-after", "a-after"]
        );
    }

    #[tokio::test]
    async fn empty_chain_returns_endpoint() {
        let endpoint = handler_fn(|_w, _req| async { Err(crate::PeerError::handler(418, "teapot")) });
        let handler = chain(&[], Arc::clone(&endpoint));
        assert!(Arc::ptr_eq(&handler, &endpoint));
    }
}
