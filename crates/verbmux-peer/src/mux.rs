use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use verbmux_frame::Request;
use verbmux_transport::{ConnectionInfo, Io, MessageStream, WsListener};

use crate::config::MuxConfig;
use crate::conn::CloseReason;
use crate::control::{normalize_verb, split_verb, ERROR_VERB, SOCKETS_KEY};
use crate::error::{PeerError, Result};
use crate::handler::{chain, handler_fn, Handler, Middleware};
use crate::socket::{ErrorHook, Socket};
use crate::writer::{SocketWriter, Sockets};

/// Async connect/disconnect callback.
pub type ConnectHook = Arc<dyn Fn(Arc<dyn SocketWriter>) -> BoxFuture<'static, ()> + Send + Sync>;

/// The verb exactly as it arrived, before any sub-router rewrote it.
///
/// Stored in the request extensions by the root router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalVerb(pub String);

/// Error hook slot. Routers built by [`Mux::route`] fall back to their
/// parent's hook, so one set later on the parent still applies.
#[derive(Default)]
struct ErrorHooks {
    own: RwLock<Option<ErrorHook>>,
    parent: Option<Arc<ErrorHooks>>,
}

impl ErrorHooks {
    fn child_of(parent: &Arc<ErrorHooks>) -> Self {
        Self {
            own: RwLock::new(None),
            parent: Some(Arc::clone(parent)),
        }
    }

    fn set(&self, hook: ErrorHook) {
        *self.own.write().unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }

    fn get(&self) -> Option<ErrorHook> {
        let own = self.own.read().unwrap_or_else(PoisonError::into_inner).clone();
        own.or_else(|| self.parent.as_ref().and_then(|parent| parent.get()))
    }
}

enum Route {
    Handler(Arc<dyn Handler>),
    Mount(Arc<dyn Handler>),
}

impl Route {
    fn handler(&self) -> &Arc<dyn Handler> {
        match self {
            Route::Handler(h) | Route::Mount(h) => h,
        }
    }
}

/// Verb router and connection multiplexer.
///
/// Configure it with `&mut self` methods, wrap it in an `Arc`, then feed it
/// connections through [`serve`](Self::serve), [`upgrade`](Self::upgrade)
/// or [`accept`](Self::accept). A `Mux` is also a [`Handler`], which is how
/// sub-routers are mounted.
pub struct Mux {
    config: MuxConfig,
    routes: HashMap<String, Route>,
    middlewares: Vec<Middleware>,
    registry: RwLock<HashMap<String, Arc<Socket>>>,
    on_connect: Option<ConnectHook>,
    on_disconnect: Option<ConnectHook>,
    on_error: Arc<ErrorHooks>,
    stop: CancellationToken,
    drained: Notify,
}

impl Mux {
    pub fn new() -> Self {
        Self::with_config(MuxConfig::default())
    }

    pub fn with_config(config: MuxConfig) -> Self {
        Self {
            config,
            routes: HashMap::new(),
            middlewares: Vec::new(),
            registry: RwLock::new(HashMap::new()),
            on_connect: None,
            on_disconnect: None,
            on_error: Arc::new(ErrorHooks::default()),
            stop: CancellationToken::new(),
            drained: Notify::new(),
        }
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    /// Register an async closure for `verb`.
    pub fn on<F, Fut>(&mut self, verb: &str, f: F)
    where
        F: Fn(Arc<dyn SocketWriter>, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.handle(verb, handler_fn(f));
    }

    /// Register a handler for `verb`.
    pub fn handle(&mut self, verb: &str, handler: Arc<dyn Handler>) {
        self.routes
            .insert(normalize_verb(verb), Route::Handler(handler));
    }

    /// Mount `handler` under the `verb` prefix. `prefix:rest` reaches it
    /// with the verb rewritten to `rest`.
    pub fn mount(&mut self, verb: &str, handler: Arc<dyn Handler>) {
        self.routes.insert(normalize_verb(verb), Route::Mount(handler));
    }

    /// Build a fresh sub-router with `configure` and mount it under `verb`.
    ///
    /// Without an error hook of its own the sub-router reports to this one.
    pub fn route(&mut self, verb: &str, configure: impl FnOnce(&mut Mux)) {
        let mut sub = Mux::with_config(self.config.clone());
        sub.on_error = Arc::new(ErrorHooks::child_of(&self.on_error));
        configure(&mut sub);
        self.mount(verb, Arc::new(sub));
    }

    /// Append a middleware. Earlier middleware wraps later middleware.
    pub fn use_middleware(&mut self, middleware: Middleware) {
        self.middlewares.push(middleware);
    }

    /// Called after a connection was registered, before its receive loop
    /// starts. Frames that arrive meanwhile wait in the transport.
    pub fn on_connect<F, Fut>(&mut self, f: F)
    where
        F: Fn(Arc<dyn SocketWriter>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_connect = Some(Arc::new(move |w| f(w).boxed()));
    }

    /// Called once per connection after it left the registry.
    pub fn on_disconnect<F, Fut>(&mut self, f: F)
    where
        F: Fn(Arc<dyn SocketWriter>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_disconnect = Some(Arc::new(move |w| f(w).boxed()));
    }

    /// Called for peer-reported errors, dispatch failures, malformed frames
    /// and failed upgrades.
    pub fn on_error<F>(&mut self, f: F)
    where
        F: Fn(&PeerError) + Send + Sync + 'static,
    {
        self.on_error.set(Arc::new(f));
    }

    /// Accept connections from `listener` until [`close`](Self::close).
    pub async fn serve(self: &Arc<Self>, listener: WsListener) -> Result<()> {
        let endpoint = listener.local_addr().to_string();
        info!(%endpoint, "mux serving");

        loop {
            let accepted = tokio::select! {
                _ = self.stop.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            let (tcp, peer) = match accepted {
                Ok(conn) => conn,
                Err(err) => {
                    let err = PeerError::from(err);
                    warn!(error = %err, "accept failed");
                    self.report(&err);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            };

            let info = ConnectionInfo {
                remote_addr: peer.to_string(),
                endpoint_addr: endpoint.clone(),
                ..ConnectionInfo::default()
            };
            let mux = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(err) = mux.upgrade(tcp, info).await {
                    debug!(%peer, error = %err, "connection rejected");
                }
            });
        }

        info!(%endpoint, "mux stopped accepting connections");
        Ok(())
    }

    /// Upgrade a raw stream and accept it.
    ///
    /// `info` carries what the caller knows about the stream, such as TLS
    /// state when TLS was terminated in front of it.
    pub async fn upgrade<S: Io>(self: &Arc<Self>, io: S, info: ConnectionInfo) -> Result<Arc<Socket>> {
        let upgraded =
            verbmux_transport::upgrade(io, info, &self.config.socket.transport).await;
        let (stream, info) = match upgraded {
            Ok(upgraded) => upgraded,
            Err(err) => {
                let err = PeerError::from(err);
                warn!(error = %err, "websocket upgrade failed");
                self.report(&err);
                return Err(err);
            }
        };
        self.accept(stream, info).await
    }

    /// Register an upgraded stream, run the connect hook, then start its
    /// receive loop. The disconnect hook therefore never runs before the
    /// connect hook has returned.
    pub async fn accept(
        self: &Arc<Self>,
        stream: MessageStream,
        info: ConnectionInfo,
    ) -> Result<Arc<Socket>> {
        let socket = Socket::new(
            stream,
            info,
            self.config.socket.clone(),
            self.stop.child_token(),
            self.on_error.get(),
        )?;
        self.registry_write()
            .insert(socket.id().to_string(), Arc::clone(&socket));
        info!(
            socket_id = %socket.id(),
            remote_addr = %socket.remote_addr(),
            user_agent = %socket.user_agent(),
            "socket connected"
        );

        if let Some(hook) = &self.on_connect {
            self.with_sockets(&socket, hook(Arc::clone(&socket) as Arc<dyn SocketWriter>))
                .await;
        }

        let mux = Arc::clone(self);
        let running = Arc::clone(&socket);
        tokio::spawn(async move {
            let dispatcher = &mux;
            let reason = Arc::clone(&running)
                .run(move |socket, req| dispatcher.dispatch(socket, req))
                .await;
            mux.disconnect(running, reason).await;
        });
        Ok(socket)
    }

    async fn dispatch(&self, socket: Arc<Socket>, mut req: Request) {
        if req.extensions.get::<OriginalVerb>().is_none() {
            req.extensions.insert(OriginalVerb(req.verb.clone()));
        }

        let writer: Arc<dyn SocketWriter> = Arc::<Socket>::clone(&socket);
        let served = self
            .with_sockets(&socket, self.serve_rpc(Arc::clone(&writer), req))
            .await;
        if let Err(err) = served {
            let status = err.status();
            debug!(socket_id = %writer.id(), status, error = %err, "dispatch failed");
            if let Err(write_err) = writer.write_error(err, status).await {
                warn!(socket_id = %writer.id(), error = %write_err, "failed to write error response");
            }
        }
    }

    async fn disconnect(&self, socket: Arc<Socket>, reason: CloseReason) {
        self.registry_write().remove(socket.id());
        self.drained.notify_waiters();
        info!(socket_id = %socket.id(), ?reason, "socket disconnected");

        if let Some(hook) = &self.on_disconnect {
            self.with_sockets(&socket, hook(Arc::clone(&socket) as Arc<dyn SocketWriter>))
                .await;
        }
    }

    /// Run `fut` with a registry snapshot visible through [`sockets`](crate::sockets).
    ///
    /// The snapshot holds every live socket, so it must not outlive the call.
    async fn with_sockets<F: Future>(&self, socket: &Socket, fut: F) -> F::Output {
        socket.metadata().insert(SOCKETS_KEY, self.snapshot());
        let out = fut.await;
        socket.metadata().remove(SOCKETS_KEY);
        out
    }

    /// Find the handler for `verb` and the verb it should see.
    fn resolve(&self, verb: &str) -> Result<(Arc<dyn Handler>, Option<String>)> {
        match split_verb(verb) {
            Some((prefix, rest)) => match self.routes.get(&normalize_verb(prefix)) {
                Some(Route::Mount(handler)) => Ok((Arc::clone(handler), Some(rest.to_string()))),
                _ => Err(PeerError::RouteNotFound(verb.to_string())),
            },
            None => self
                .routes
                .get(&normalize_verb(verb))
                .map(|route| (Arc::clone(route.handler()), None))
                .ok_or_else(|| PeerError::RouteNotFound(verb.to_string())),
        }
    }

    /// Read-only copy of the live connections.
    pub fn sockets(&self) -> Sockets {
        self.snapshot()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.registry_read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry_read().is_empty()
    }

    /// Signal every connection to shut down and stop [`serve`](Self::serve).
    ///
    /// Idempotent. Connections accepted afterwards stop immediately.
    pub fn close(&self) {
        self.stop.cancel();
    }

    /// Wait until no connections remain, up to `timeout`. Returns whether
    /// the registry drained.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.drained.notified();
            if self.is_empty() {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.is_empty();
            }
        }
    }

    fn snapshot(&self) -> Sockets {
        self.registry_read()
            .iter()
            .map(|(id, socket)| (id.clone(), Arc::clone(socket) as Arc<dyn SocketWriter>))
            .collect()
    }

    fn report(&self, err: &PeerError) {
        if let Some(hook) = self.on_error.get() {
            hook(err);
        }
    }

    fn registry_read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<Socket>>> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<Socket>>> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Mux {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for Mux {
    /// Route one request. An `error` verb is a report from the peer and goes
    /// to the error hook only.
    async fn serve_rpc(&self, w: Arc<dyn SocketWriter>, mut req: Request) -> Result<()> {
        if req.verb.eq_ignore_ascii_case(ERROR_VERB) {
            let err = PeerError::Remote {
                status: 0,
                message: String::from_utf8_lossy(&req.body).into_owned(),
            };
            warn!(socket_id = %w.id(), error = %err, "peer reported error");
            self.report(&err);
            return Ok(());
        }

        let (handler, rewritten) = self.resolve(&req.verb)?;
        if let Some(verb) = rewritten {
            req.verb = verb;
        }
        chain(&self.middlewares, handler).serve_rpc(w, req).await
    }
}

impl fmt::Debug for Mux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut verbs: Vec<&String> = self.routes.keys().collect();
        verbs.sort();
        f.debug_struct("Mux")
            .field("routes", &verbs)
            .field("middlewares", &self.middlewares.len())
            .field("sockets", &self.len())
            .finish_non_exhaustive()
    }
}
