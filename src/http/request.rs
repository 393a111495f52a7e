use crate::{
    http::types::{Method, Version},
    server::pools::Recycle,
};
use std::net::IpAddr;

/// A parsed HTTP/1.1 request.
///
/// Instances are produced by the parser, handed to handlers through the
/// request context, and recycled through the request pool between
/// keep-alive requests. All owned buffers keep their capacity across
/// recycling; their contents are cleared so nothing leaks from one request
/// to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) local_port: u16,
    pub(crate) path: String,
    pub(crate) query: String,
    pub(crate) version: Version,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) content_length: usize,
    pub(crate) content_type: String,
    pub(crate) secure: bool,
    pub(crate) remote_addr: Option<IpAddr>,
    pub(crate) remote_port: u16,
    pub(crate) keep_alive: bool,
    pub(crate) body: Vec<u8>,
}

impl Request {
    #[inline]
    pub(crate) fn new() -> Self {
        Request {
            method: Method::Get,
            local_port: 0,
            path: String::from("/"),
            query: String::new(),
            version: Version::Http11,
            headers: Vec::new(),
            content_length: 0,
            content_type: String::new(),
            secure: false,
            remote_addr: None,
            remote_port: 0,
            keep_alive: true,
            body: Vec::new(),
        }
    }

    // Restores parser-default values. Header pairs and the body are cleared
    // so pooled values never carry data across requests.
    #[inline]
    pub(crate) fn reset(&mut self) {
        self.method = Method::Get;
        self.local_port = 0;
        self.path.clear();
        self.path.push('/');
        self.query.clear();
        self.version = Version::Http11;
        self.headers.clear();
        self.content_length = 0;
        self.content_type.clear();
        self.secure = false;
        self.remote_addr = None;
        self.remote_port = 0;
        self.keep_alive = true;
        self.body.clear();
    }
}

// Public API
impl Request {
    /// Request method.
    #[inline(always)]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Port of the accepting endpoint.
    #[inline(always)]
    pub const fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Request path, verbatim up to the first `?`.
    #[inline(always)]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query string following the first `?`, possibly empty.
    #[inline(always)]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Protocol version; always [`Version::Http11`].
    #[inline(always)]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// All header pairs in insertion order.
    #[inline(always)]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Returns the first header value with case-insensitive name matching
    /// (per [RFC 7230](https://tools.ietf.org/html/rfc7230#section-3.2)).
    /// Uses linear search.
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Declared `Content-Length`; zero when the header was absent.
    #[inline(always)]
    pub const fn content_length(&self) -> usize {
        self.content_length
    }

    /// Value of the `Content-Type` header; empty when absent.
    #[inline(always)]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Whether the transport carrying this request is secured.
    #[inline(always)]
    pub const fn secure(&self) -> bool {
        self.secure
    }

    /// Address of the remote peer, when known.
    #[inline(always)]
    pub const fn remote_addr(&self) -> Option<IpAddr> {
        self.remote_addr
    }

    /// Port of the remote peer; zero when unknown.
    #[inline(always)]
    pub const fn remote_port(&self) -> u16 {
        self.remote_port
    }

    /// Whether the client asked to keep the connection open. True unless a
    /// `Connection: close` header was present.
    #[inline(always)]
    pub const fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Request body; exactly `content_length` bytes.
    #[inline(always)]
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

impl Recycle for Request {
    #[inline(always)]
    fn recycle(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_restores_defaults() {
        let mut request = Request::new();

        request.method = Method::Post;
        request.local_port = 8080;
        request.path = String::from("/p");
        request.query = String::from("q=1");
        request.headers.push((String::from("Host"), String::from("x")));
        request.content_length = 3;
        request.content_type = String::from("text/plain");
        request.secure = true;
        request.remote_addr = Some("10.0.0.1".parse().unwrap());
        request.remote_port = 4242;
        request.keep_alive = false;
        request.body.extend_from_slice(b"abc");

        request.reset();
        assert_eq!(request, Request::new());
    }

    #[test]
    fn reset_keeps_capacity() {
        let mut request = Request::new();
        request.body.extend_from_slice(&[0; 512]);
        request.headers.push((String::from("a"), String::from("b")));

        request.reset();

        assert!(request.body.capacity() >= 512);
        assert!(request.headers.capacity() >= 1);
    }

    #[test]
    fn header_lookup() {
        let mut request = Request::new();
        request.headers.push((String::from("Host"), String::from("x")));
        request
            .headers
            .push((String::from("X-Multi"), String::from("first")));
        request
            .headers
            .push((String::from("x-multi"), String::from("second")));

        #[rustfmt::skip]
        let cases = [
            ("host",     Some("x")),
            ("HOST",     Some("x")),
            ("Host",     Some("x")),
            ("x-multi",  Some("first")),
            ("X-MULTI",  Some("first")),
            ("missing",  None),
        ];

        for (name, expected) in cases {
            assert_eq!(request.header(name), expected);
        }
    }
}
