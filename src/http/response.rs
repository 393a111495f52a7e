use crate::server::pools::Recycle;
use std::fmt;
use tokio::io::AsyncRead;

/// HTTP response under construction by middleware and handlers.
///
/// Instances come from the response pool with a `404` status, an empty
/// reason (the writer substitutes the canonical phrase), no headers and no
/// body. Handlers mutate them in place:
///
/// ```
/// # let mut response = bolt_web::Response::default();
/// response
///     .status(200)
///     .header("content-type", "text/plain")
///     .body("Hello world!");
/// ```
///
/// `Content-Length` and `Connection` are owned by the response writer; user
/// headers with either name are dropped at serialisation time.
#[derive(Debug)]
pub struct Response {
    pub(crate) status: u16,
    pub(crate) reason: String,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
    pub(crate) body_stream: Option<BodyStream>,
}

impl Response {
    #[inline]
    pub(crate) fn new() -> Self {
        Response {
            status: 404,
            reason: String::new(),
            headers: Vec::new(),
            body: Vec::new(),
            body_stream: None,
        }
    }

    #[inline]
    pub(crate) fn reset(&mut self) {
        self.status = 404;
        self.reason.clear();
        self.headers.clear();
        self.body.clear();
        self.body_stream = None;
    }
}

// Public API
impl Response {
    /// Sets the status code.
    #[inline]
    pub fn status(&mut self, status: u16) -> &mut Self {
        self.status = status;
        self
    }

    /// Sets an explicit reason phrase. When left empty, the writer emits
    /// the canonical phrase for well-known codes and `Unknown` otherwise.
    #[inline]
    pub fn reason(&mut self, reason: impl Into<String>) -> &mut Self {
        self.reason = reason.into();
        self
    }

    /// Appends a header. Headers are written in insertion order.
    #[inline]
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the byte-array body, replacing any previous contents.
    ///
    /// Ignored on the wire if a [`body_stream`](Response::body_stream) is
    /// also set; the stream takes precedence.
    #[inline]
    pub fn body(&mut self, data: impl AsRef<[u8]>) -> &mut Self {
        self.body.clear();
        self.body.extend_from_slice(data.as_ref());
        self
    }

    /// Sets a streamed body. Takes precedence over the byte-array body.
    #[inline]
    pub fn body_stream(&mut self, stream: BodyStream) -> &mut Self {
        self.body_stream = Some(stream);
        self
    }

    /// Current status code.
    #[inline(always)]
    pub const fn status_code(&self) -> u16 {
        self.status
    }

    /// Current reason phrase; empty means "writer decides".
    #[inline(always)]
    pub fn reason_phrase(&self) -> &str {
        &self.reason
    }

    /// Headers accumulated so far, in insertion order.
    #[inline(always)]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The byte-array body accumulated so far.
    #[inline(always)]
    pub fn body_bytes(&self) -> &[u8] {
        &self.body
    }

    /// Whether a streamed body is set.
    #[inline(always)]
    pub const fn has_body_stream(&self) -> bool {
        self.body_stream.is_some()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Recycle for Response {
    #[inline(always)]
    fn recycle(&mut self) {
        self.reset();
    }
}

/// A lazy, finite source of response body bytes.
///
/// `remaining` carries the number of bytes the reader will yield when it is
/// known up front (a seekable source reports its length minus its current
/// position). With a known length the writer emits `Content-Length` and the
/// connection can stay alive; without one the writer omits `Content-Length`
/// and forces `Connection: close` so the client can detect the end of the
/// body.
pub struct BodyStream {
    pub(crate) reader: Box<dyn AsyncRead + Send + Unpin>,
    pub(crate) remaining: Option<u64>,
}

impl BodyStream {
    /// Wraps a reader whose remaining length is `remaining` bytes, or
    /// unknown when `None`.
    #[inline]
    pub fn new<R>(reader: R, remaining: Option<u64>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        BodyStream {
            reader: Box::new(reader),
            remaining,
        }
    }

    /// Remaining length in bytes, when known.
    #[inline(always)]
    pub const fn remaining(&self) -> Option<u64> {
        self.remaining
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyStream")
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_defaults() {
        let response = Response::new();

        assert_eq!(response.status_code(), 404);
        assert_eq!(response.reason_phrase(), "");
        assert!(response.headers().is_empty());
        assert!(response.body_bytes().is_empty());
        assert!(!response.has_body_stream());
    }

    #[test]
    fn reset_restores_defaults() {
        let mut response = Response::new();

        response
            .status(200)
            .reason("Fine")
            .header("x-test", "1")
            .body("payload")
            .body_stream(BodyStream::new(&b"abc"[..], Some(3)));

        response.reset();

        assert_eq!(response.status_code(), 404);
        assert_eq!(response.reason_phrase(), "");
        assert!(response.headers().is_empty());
        assert!(response.body_bytes().is_empty());
        assert!(!response.has_body_stream());
    }

    #[test]
    fn body_replaces_previous_contents() {
        let mut response = Response::new();

        response.body("first");
        response.body("second");

        assert_eq!(response.body_bytes(), b"second");
    }

    #[test]
    fn stream_length() {
        assert_eq!(BodyStream::new(&b"abc"[..], Some(3)).remaining(), Some(3));
        assert_eq!(BodyStream::new(&b"abc"[..], None).remaining(), None);
    }
}
