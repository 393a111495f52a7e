use crate::{
    errors::Error,
    http::{request::Request, response::Response, types::Method},
    limits::{ServerOptions, LISTEN_BACKLOG},
    server::{
        connection::Engine,
        context::{Context, Services},
        metrics::Metrics,
        pipeline::{Handler, Middleware, Pipeline},
        pools::Pool,
        router::Router,
    },
};
use socket2::{Domain, Protocol, Socket, Type};
use std::{
    io,
    net::{Ipv6Addr, SocketAddr},
    sync::{Arc, OnceLock},
};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// Builder for configuring and creating [`Server`] instances.
///
/// Middleware order is registration order: the first registered middleware
/// is the outermost layer around the router. Routes and services may be
/// registered in any order; everything is frozen by [`build`](Self::build).
#[derive(Default)]
pub struct ServerBuilder {
    options: ServerOptions,
    pipeline: Pipeline,
    router: Router,
    services: Services,
}

impl ServerBuilder {
    /// Replaces the default [`ServerOptions`].
    #[inline]
    pub fn options(mut self, options: ServerOptions) -> Self {
        self.options = options;
        self
    }

    /// Appends a middleware to the server-wide pipeline.
    #[inline]
    pub fn middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.pipeline.push(middleware);
        self
    }

    /// Registers a route handler. The last registration for a
    /// (method, path) pair wins.
    ///
    /// # Panics
    ///
    /// When `path` is empty.
    #[inline]
    #[track_caller]
    pub fn route<H: Handler>(mut self, method: Method, path: &str, handler: H) -> Self {
        self.router.register(method, path, handler);
        self
    }

    /// Registers a process-wide service, retrievable per request through
    /// [`Context::services`](crate::Context::services) by its type.
    #[inline]
    pub fn service<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.services.insert(value);
        self
    }

    /// Freezes the pipeline, route table, services and pools into a
    /// runnable [`Server`].
    pub fn build(self) -> Server {
        let retention = self.options.pool_retention;

        Server {
            engine: Arc::new(Engine {
                app: self.pipeline.build(Arc::new(self.router)),
                services: Arc::new(self.services),
                requests: Pool::new(retention, Request::new),
                responses: Pool::new(retention, Response::new),
                contexts: Pool::new(retention, Context::new),
                metrics: self.options.metrics_enabled.then(Metrics::new),
                max_header_count: self.options.max_header_count,
                max_request_body_size: self.options.max_request_body_size,
            }),
            options: self.options,
            shutdown: CancellationToken::new(),
            local_addr: OnceLock::new(),
        }
    }
}

/// The HTTP/1.1 server engine.
///
/// Owns the composed middleware pipeline, the route table and the value
/// pools. [`start`](Server::start) runs the accept loop;
/// [`serve_connection`](Server::serve_connection) feeds a single
/// caller-supplied duplex stream through the same machinery, which is how
/// secured transports enter the engine after external TLS negotiation.
pub struct Server {
    engine: Arc<Engine>,
    options: ServerOptions,
    shutdown: CancellationToken,
    local_addr: OnceLock<SocketAddr>,
}

impl Server {
    /// Creates a new builder for configuring the server instance.
    #[inline]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Binds the listener and accepts connections until `cancel` fires or
    /// [`stop`](Server::stop) is called. In-flight connections drain
    /// through cancellation; the call returns once the accept loop exits.
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), Error> {
        let listener = bind_listener(&self.options)?;
        let local = listener.local_addr()?;
        let _ = self.local_addr.set(local);
        log::info!("listening on {local}");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    self.shutdown.cancel();
                    break;
                }
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => self.spawn_connection(stream, remote),
                    Err(err) => log::error!("accept failed: {err}"),
                },
            }
        }

        log::info!("listener on {local} stopped");
        Ok(())
    }

    /// Stops the listener. In-flight connections observe the cancellation
    /// at their next suspension point and drain.
    #[inline]
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Address the listener is bound to, once [`start`](Server::start) has
    /// bound it. Useful when the configured port is `0`.
    #[inline]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Processes one established duplex stream through the engine.
    ///
    /// `secure` marks the transport as secured and is reflected in the
    /// parsed requests; TLS negotiation itself happens before this call.
    /// Returns when the connection closes.
    pub async fn serve_connection<S>(
        &self,
        stream: S,
        secure: bool,
        remote: SocketAddr,
        local: SocketAddr,
    ) -> Result<(), Error>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + 'static,
    {
        self.engine
            .serve_connection(stream, secure, remote, local, self.shutdown.child_token())
            .await
    }

    fn spawn_connection(&self, stream: TcpStream, remote: SocketAddr) {
        let local = match stream.local_addr() {
            Ok(local) => local,
            Err(err) => {
                log::error!("dropping connection from {remote}: {err}");
                return;
            }
        };

        let engine = self.engine.clone();
        let cancel = self.shutdown.child_token();

        tokio::spawn(async move {
            if let Some(metrics) = &engine.metrics {
                metrics.connection_opened();
            }
            log::trace!("connection opened: {remote}");

            match engine
                .serve_connection(stream, false, remote, local, cancel)
                .await
            {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => {}
                Err(err) => log::error!("connection to {remote} terminated: {err}"),
            }

            if let Some(metrics) = &engine.metrics {
                metrics.connection_closed();
            }
            log::trace!("connection closed: {remote}");
        });
    }
}

// Binds the accept socket with the configured backlog. The IPv4 wildcard
// requests dual-stack: bind the IPv6 wildcard with V6ONLY off so one socket
// serves both families, and fall back to IPv4-only where the platform
// refuses.
fn bind_listener(options: &ServerOptions) -> io::Result<TcpListener> {
    if options.wants_dual_stack() {
        match bind_dual_stack(options.port) {
            Ok(listener) => return Ok(listener),
            Err(err) => log::debug!("dual-stack bind failed, falling back to IPv4: {err}"),
        }
    }

    bind_socket(SocketAddr::new(options.bind_addr, options.port))
}

fn bind_dual_stack(port: u16) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::IPV6, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_only_v6(false)?;
    socket.bind(&SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)).into())?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(true)?;
    TcpListener::from_std(socket.into())
}

fn bind_socket(addr: SocketAddr) -> io::Result<TcpListener> {
    let domain = match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(true)?;
    TcpListener::from_std(socket.into())
}
