//! bolt_web - embeddable, high-throughput HTTP/1.1 server engine
//!
//! A performance-oriented server core that parses framed HTTP/1.1 requests
//! straight off the byte stream, runs each one through a composable
//! middleware chain into an exact method + path router, and writes the
//! response back on the same connection. Connections stay alive by default;
//! requests, responses and per-request contexts are pooled so the steady
//! keep-alive path allocates nothing.
//!
//! # Architecture
//!
//! Per connection, two cooperating tasks share a bounded byte pipe:
//!
//! ```text
//! bytes -> ingress pipe -> parser -> context -> middleware chain
//!       -> routed handler -> response writer -> egress -> bytes
//! ```
//!
//! The ingress filler keeps reading while the processor parses, dispatches
//! and writes. Within one connection requests are strictly sequential;
//! parallelism is across connections. A single cancellation token per
//! connection (a child of the server-wide token) governs teardown.
//!
//! # Quick Start
//!
//! ```no_run
//! use bolt_web::{BoxFuture, CancellationToken, Context, Error, Method, Server, ServerOptions};
//!
//! fn hello<'a>(cx: &'a mut Context, _cancel: &'a CancellationToken) -> BoxFuture<'a, Result<(), Error>> {
//!     Box::pin(async move {
//!         cx.response().status(200).body("Hello world!");
//!         Ok(())
//!     })
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     Server::builder()
//!         .options(ServerOptions { port: 8080, ..ServerOptions::default() })
//!         .route(Method::Get, "/", hello)
//!         .build()
//!         .start(CancellationToken::new())
//!         .await
//! }
//! ```
//!
//! # Scope
//!
//! The engine speaks HTTP/1.1 only: no HTTP/2 or HTTP/3, no chunked request
//! bodies, no trailers. TLS negotiation belongs to the embedding layer;
//! hand the negotiated stream to [`Server::serve_connection`] with
//! `secure = true` and the engine treats it like any other duplex byte
//! stream.

pub(crate) mod http {
    pub(crate) mod parser;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod context;
    pub(crate) mod metrics;
    pub(crate) mod pipe;
    pub(crate) mod pipeline;
    pub(crate) mod pools;
    pub(crate) mod router;
    pub(crate) mod server_impl;
    pub(crate) mod writer;
}
pub(crate) mod errors;
pub mod limits;

pub use crate::{
    errors::Error,
    http::{
        parser::ParseError,
        request::Request,
        response::{BodyStream, Response},
        types::{Method, Version},
    },
    limits::ServerOptions,
    server::{
        context::{Context, ServiceScope, Services},
        pipeline::{BoxFuture, Handler, Middleware, Next, Pipeline},
        router::Router,
        server_impl::{Server, ServerBuilder},
    },
};

/// Cancellation primitive used throughout the engine, re-exported from
/// `tokio-util` so handler signatures need no extra dependency.
pub use tokio_util::sync::CancellationToken;
