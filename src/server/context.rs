use crate::{
    http::{request::Request, response::Response},
    server::pools::Recycle,
};
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    sync::Arc,
};

/// Process-wide service registry.
///
/// Values are registered once through the server builder and shared across
/// every request via [`ServiceScope`]. Lookup is by concrete type.
pub struct Services {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Services {
    #[inline]
    pub(crate) fn new() -> Self {
        Services {
            entries: HashMap::new(),
        }
    }

    #[inline]
    pub(crate) fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.entries.insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Returns the registered value of type `T`, if any.
    #[inline]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|entry| entry.downcast::<T>().ok())
    }

    // One scope per request; dropping the scope releases it.
    #[inline]
    pub(crate) fn scope(self: &Arc<Self>) -> ServiceScope {
        ServiceScope {
            provider: Arc::clone(self),
        }
    }
}

impl Default for Services {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Per-request view of the process-wide [`Services`].
///
/// Lives exactly as long as one request: created before the middleware
/// chain runs and released when the context returns to its pool, on both
/// the success and the error path.
#[derive(Debug)]
pub struct ServiceScope {
    provider: Arc<Services>,
}

impl ServiceScope {
    /// Returns the registered value of type `T`, if any.
    #[inline]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.provider.get::<T>()
    }
}

/// Everything a middleware or handler sees for one request.
///
/// Carries the parsed [`Request`], the mutable [`Response`] and the
/// per-request [`ServiceScope`]. Contexts are pooled; outside a dispatch
/// all three slots are empty.
#[derive(Debug, Default)]
pub struct Context {
    pub(crate) request: Option<Request>,
    pub(crate) response: Option<Response>,
    pub(crate) services: Option<ServiceScope>,
}

impl Context {
    #[inline]
    pub(crate) fn new() -> Self {
        Context::default()
    }

    /// The request being handled.
    ///
    /// # Panics
    ///
    /// Outside a dispatch, when no request is attached.
    #[inline]
    pub fn request(&self) -> &Request {
        self.request
            .as_ref()
            .expect("context used outside request dispatch")
    }

    /// The response under construction.
    ///
    /// # Panics
    ///
    /// Outside a dispatch, when no response is attached.
    #[inline]
    pub fn response(&mut self) -> &mut Response {
        self.response
            .as_mut()
            .expect("context used outside request dispatch")
    }

    /// The per-request service scope.
    ///
    /// # Panics
    ///
    /// Outside a dispatch, when no scope is attached.
    #[inline]
    pub fn services(&self) -> &ServiceScope {
        self.services
            .as_ref()
            .expect("context used outside request dispatch")
    }
}

impl Recycle for Context {
    #[inline]
    fn recycle(&mut self) {
        self.request = None;
        self.response = None;
        self.services = None;
    }
}
