use crate::{errors::Error, server::context::Context};
use std::{future::Future, pin::Pin, sync::Arc};
use tokio_util::sync::CancellationToken;

/// Boxed future returned by handlers and middleware.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Terminal callable of the middleware chain, and the shape of every route
/// handler.
///
/// Implemented for any function of matching signature, so plain `fn` items
/// work directly:
///
/// ```
/// use bolt_web::{BoxFuture, CancellationToken, Context, Error};
///
/// fn hello<'a>(cx: &'a mut Context, _cancel: &'a CancellationToken) -> BoxFuture<'a, Result<(), Error>> {
///     Box::pin(async move {
///         cx.response().status(200).body("Hello world!");
///         Ok(())
///     })
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Handles one request through its context.
    fn call<'a>(
        &'a self,
        cx: &'a mut Context,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), Error>>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Context, &'a CancellationToken) -> BoxFuture<'a, Result<(), Error>>,
    F: Send + Sync + 'static,
{
    #[inline]
    fn call<'a>(
        &'a self,
        cx: &'a mut Context,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), Error>> {
        self(cx, cancel)
    }
}

/// One layer of the middleware chain.
///
/// Middlewares run outer-to-inner in registration order. Each receives the
/// shared [`Context`] and a [`Next`] continuation; not invoking `next`
/// short-circuits the chain and the terminal never runs.
pub trait Middleware: Send + Sync + 'static {
    /// Processes the request, optionally delegating to the rest of the
    /// chain through `next`.
    fn call<'a>(
        &'a self,
        cx: &'a mut Context,
        next: Next<'a>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), Error>>;
}

impl<F> Middleware for F
where
    F: for<'a> Fn(
        &'a mut Context,
        Next<'a>,
        &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), Error>>,
    F: Send + Sync + 'static,
{
    #[inline]
    fn call<'a>(
        &'a self,
        cx: &'a mut Context,
        next: Next<'a>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), Error>> {
        self(cx, next, cancel)
    }
}

/// Continuation handed to a middleware: the layers registered after it plus
/// the terminal.
pub struct Next<'n> {
    chain: &'n [Arc<dyn Middleware>],
    terminal: &'n dyn Handler,
}

impl<'n> Next<'n> {
    /// Passes control to the next inner layer. Consumes the continuation,
    /// so a middleware invokes the rest of the chain at most once.
    pub fn run<'a>(
        self,
        cx: &'a mut Context,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), Error>>
    where
        'n: 'a,
    {
        match self.chain.split_first() {
            Some((head, chain)) => head.call(
                cx,
                Next {
                    chain,
                    terminal: self.terminal,
                },
                cancel,
            ),
            None => self.terminal.call(cx, cancel),
        }
    }
}

/// Append-only builder for the server-wide middleware chain.
///
/// Building with a terminal produces the composed [`App`]: the first
/// registered middleware is the outermost layer, the terminal the
/// innermost. An empty pipeline reduces to the terminal alone.
#[derive(Default)]
pub struct Pipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    #[inline]
    pub fn new() -> Self {
        Pipeline::default()
    }

    /// Appends a middleware after all previously registered ones.
    #[inline]
    pub fn push<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Number of registered middlewares.
    #[inline]
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Whether no middleware has been registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    pub(crate) fn build(self, terminal: Arc<dyn Handler>) -> App {
        App {
            middlewares: self.middlewares.into(),
            terminal,
        }
    }
}

// The composed middleware chain: a single callable over (context, cancel).
#[derive(Clone)]
pub(crate) struct App {
    middlewares: Arc<[Arc<dyn Middleware>]>,
    terminal: Arc<dyn Handler>,
}

impl App {
    #[inline]
    pub(crate) fn call<'a>(
        &'a self,
        cx: &'a mut Context,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Next {
            chain: &self.middlewares,
            terminal: &*self.terminal,
        }
        .run(cx, cancel)
    }
}
