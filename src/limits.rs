//! Server configuration and protocol limits
//!
//! # Security-First Defaults
//!
//! Default limits are intentionally conservative to prevent:
//! - Resource exhaustion attacks
//! - Memory overflows
//! - Header flooding
//!
//! Each accepted request costs at most `max_request_body_size` of body
//! memory plus the 8 KiB per-line ceiling for the request line and each
//! header line.

use std::net::{IpAddr, Ipv4Addr};

/// Configuration for a [`Server`](crate::Server) instance.
///
/// Construct with struct-update syntax over [`Default`]:
///
/// ```
/// use bolt_web::ServerOptions;
///
/// let options = ServerOptions {
///     port: 8080,
///     max_header_count: 64,
///     ..ServerOptions::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Address the listener binds to (default: `0.0.0.0`).
    ///
    /// The IPv4 wildcard is a sentinel: the listener then binds the IPv6
    /// wildcard in dual-stack mode so IPv6 clients connect through the same
    /// socket, falling back to IPv4-only on platforms without dual-mode
    /// support.
    pub bind_addr: IpAddr,

    /// TCP port to listen on (default: `80`).
    pub port: u16,

    /// Upper bound on values retained by each of the request, response and
    /// context pools (default: `1024`).
    ///
    /// Acquiring from an empty pool allocates; returning to a full pool
    /// drops the value. Retention therefore caps idle memory, not
    /// concurrency.
    pub pool_retention: usize,

    /// Whether the engine publishes measurements on its meter group
    /// (default: `true`).
    ///
    /// Export is external: without an installed metrics provider the
    /// instruments are no-ops.
    pub metrics_enabled: bool,

    /// Maximum number of header pairs accepted per request (default: `100`).
    ///
    /// One more header than this rejects the request and closes the
    /// connection.
    pub max_header_count: usize,

    /// Maximum declared `Content-Length` in bytes (default: 10 MiB).
    ///
    /// Larger declarations are rejected before any body byte is consumed.
    pub max_request_body_size: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 80,
            pool_retention: 1024,
            metrics_enabled: true,
            max_header_count: 100,
            max_request_body_size: 10 * 1024 * 1024,

            _priv: (),
        }
    }
}

impl ServerOptions {
    // The IPv4 wildcard doubles as the "serve both families" sentinel.
    #[inline(always)]
    pub(crate) fn wants_dual_stack(&self) -> bool {
        self.bind_addr == IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    }
}

/// Listen backlog used by the acceptor socket.
pub(crate) const LISTEN_BACKLOG: i32 = 1024;
