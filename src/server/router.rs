use crate::{
    errors::Error,
    http::types::Method,
    server::{
        context::Context,
        pipeline::{BoxFuture, Handler},
    },
};
use std::{collections::HashMap, sync::Arc};
use tokio_util::sync::CancellationToken;

/// Exact method + path route table, and the default terminal of the
/// middleware chain.
///
/// One independent map per supported method. Registration is mutative and
/// happens before the server starts; dispatch reads a snapshot taken when
/// the pipeline is built. A lookup miss is not an error: the router
/// completes normally with a `404 Not Found` response.
pub struct Router {
    routes: [HashMap<String, Arc<dyn Handler>>; Method::COUNT],
}

impl Router {
    #[inline]
    pub fn new() -> Self {
        Router {
            routes: std::array::from_fn(|_| HashMap::new()),
        }
    }

    /// Registers `handler` for `method` + `path`. The last registration for
    /// a pair wins.
    ///
    /// # Panics
    ///
    /// When `path` is empty; an empty path can never match a request line.
    #[track_caller]
    pub fn register<H: Handler>(&mut self, method: Method, path: &str, handler: H) {
        assert!(!path.is_empty(), "route path must not be empty");

        self.routes[method.index()].insert(path.to_owned(), Arc::new(handler));
    }

    /// Number of registered routes across all methods.
    #[inline]
    pub fn len(&self) -> usize {
        self.routes.iter().map(HashMap::len).sum()
    }

    /// Whether no route has been registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.routes.iter().all(HashMap::is_empty)
    }

    #[inline]
    fn lookup(&self, method: Method, path: &str) -> Option<&Arc<dyn Handler>> {
        self.routes[method.index()].get(path)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler for Router {
    fn call<'a>(
        &'a self,
        cx: &'a mut Context,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), Error>> {
        let request = cx.request();
        match self.lookup(request.method(), request.path()) {
            Some(handler) => handler.call(cx, cancel),
            None => {
                cx.response()
                    .status(404)
                    .reason("Not Found")
                    .body("Not Found");
                Box::pin(async { Ok(()) })
            }
        }
    }
}
