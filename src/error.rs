//! Error types for the floodgate crate.

use std::time::Duration;

use thiserror::Error;

/// Main error type for limiter operations.
///
/// The local backend never produces these from its inherent API; every
/// variant except [`Error::InvalidLimit`] originates in the distributed
/// backend. The crate never retries or masks failures internally: callers
/// receive them verbatim and decide fail-open vs fail-closed.
#[derive(Error, Debug)]
pub enum Error {
    /// The shared store was unreachable or a command failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The store round trip exceeded the configured command timeout.
    #[error("redis command timed out after {0:?}")]
    Timeout(Duration),

    /// Redis no longer caches the token bucket script, typically because the
    /// server was restarted. Reconstructing the limiter reloads it.
    #[error("token bucket script not cached by redis; recreate the limiter to reload it")]
    ScriptNotLoaded,

    /// The store replied with something other than the expected
    /// `(allowed, remaining, retry_after, reset_time)` tuple.
    #[error("malformed script reply: {0}")]
    MalformedResponse(String),

    /// The limit failed validation.
    #[error("invalid limit: {0}")]
    InvalidLimit(String),

    /// Configuration-related errors.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O errors.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable category tag attached to the error counter metric.
    pub fn category(&self) -> &'static str {
        match self {
            Error::Redis(_) => "redis",
            Error::Timeout(_) => "timeout",
            Error::ScriptNotLoaded => "noscript",
            Error::MalformedResponse(_) => "invalid_format",
            Error::InvalidLimit(_) => "invalid_limit",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
        }
    }
}

/// Result type alias for limiter operations.
pub type Result<T> = std::result::Result<T, Error>;
