//! Error types for the memo engine.
//!
//! Only [`ConfigError`] and [`EngineError`] ever reach application code, and
//! only at startup. [`RemoteError`] is recovered inside the remote bridge and
//! [`ReloadFailure`] inside the reload scheduler; neither surfaces from a
//! cached call.

use std::time::Duration;
use thiserror::Error;

/// Failure talking to (or decoding from) the remote key-value store.
#[derive(Error, Debug, Clone)]
pub enum RemoteError {
    #[error("remote store connection error: {0}")]
    Connection(String),
    #[error("remote store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("remote store protocol error: {0}")]
    Protocol(String),
    #[error("cannot reconstruct '{shape}' from remote bytes: {reason}")]
    Serialization { shape: String, reason: String },
}

impl RemoteError {
    /// Connection-class errors flip the shared health state to unavailable.
    /// Serialization errors are a data problem and leave it alone.
    #[must_use]
    pub fn is_connection_class(&self) -> bool {
        !matches!(self, Self::Serialization { .. })
    }

    /// Short label used for the `error_type` metric dimension.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Timeout(_) => "timeout",
            Self::Protocol(_) => "protocol",
            Self::Serialization { .. } => "serialization",
        }
    }
}

impl From<redis::RedisError> for RemoteError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout(Duration::ZERO)
        } else if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
            RemoteError::Connection(err.to_string())
        } else {
            RemoteError::Protocol(err.to_string())
        }
    }
}

/// Invalid cache registration. Raised by the registry builder before any
/// traffic is served.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cache '{0}' is already registered")]
    DuplicateName(String),
    #[error("cache '{0}' enables auto-reload but its operation takes arguments")]
    AutoReloadRequiresZeroArgs(String),
    #[error("cache '{0}' must have a ttl greater than zero")]
    InvalidTtl(String),
    #[error("cache '{0}' must allow at least one entry")]
    InvalidCapacity(String),
}

/// A background reload whose origin call failed. Logged and discarded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("reload of '{cache}' failed: {reason}")]
pub struct ReloadFailure {
    pub cache: String,
    pub reason: String,
}

/// Startup failure of the engine itself.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("remote store setup failed: {0}")]
    Remote(#[from] RemoteError),
}
