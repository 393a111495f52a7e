use std::io;
use thiserror::Error;

/// Failures surfaced by the connection loop and by handler code.
///
/// Protocol faults are not represented here: a malformed request is a parser
/// result code, and the connection closes without an error escaping to the
/// acceptor.
#[derive(Debug, Error)]
pub enum Error {
    /// A stream read or write failed. Treated as normal connection
    /// termination and logged at error level.
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),

    /// The connection token was cancelled while waiting on a suspension
    /// point. Expected during shutdown and never logged as an error.
    #[error("operation cancelled")]
    Cancelled,

    /// A middleware or terminal handler failed. Propagates to the dispatch
    /// site, which records an error measurement and closes the connection
    /// without writing a response.
    #[error("handler failure: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps an application error for propagation out of a handler.
    #[inline]
    pub fn handler<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Handler(err.into())
    }

    #[inline(always)]
    pub(crate) const fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
