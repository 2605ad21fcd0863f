//! # Proxy Error Types
//!
//! Unified error handling for the cache, repository, refresher, auth and
//! metrics components.
//!
//! ## Error Categories
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          ProxyError Kinds                                │
//! ├─────────────────┬──────────────┬──────────────┬───────────┬────────────┤
//! │ ConfigError      │ Unauthorized │ NotFound      │ Transient │ Corruption │
//! │ fatal at startup │ bad key/JWT  │ no such entry │ retryable │ bad bytes  │
//! └─────────────────┴──────────────┴──────────────┴───────────┴────────────┘
//!                 plus Fatal: unrecoverable invariant violation.
//! ```
//!
//! Propagation policy: `Transient` is recovered internally by the component
//! that produced it (never crosses the Refresher/Metric boundary);
//! `Unauthorized` and `NotFound` surface verbatim to the caller; `Corruption`
//! is logged and the offending cache entry is deleted; `Fatal` escalates and
//! the process exits non-zero.

use thiserror::Error;

/// Result type alias used throughout the proxy core.
pub type ProxyResult<T> = Result<T, ProxyError>;

/// The six error kinds the proxy distinguishes.
///
/// Every [`ProxyError`] variant maps to exactly one kind via [`ProxyError::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigError,
    Unauthorized,
    NotFound,
    Transient,
    Corruption,
    Fatal,
}

/// Unified error type for the proxy core.
#[derive(Debug, Error)]
pub enum ProxyError {
    // =========================================================================
    // ConfigError - fatal at startup
    // =========================================================================
    #[error("configuration error: {0}")]
    Config(String),

    #[error("configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    // =========================================================================
    // Unauthorized
    // =========================================================================
    #[error("unknown or unapproved api key")]
    UnknownApiKey,

    #[error("invalid or expired token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("no auth token exists in context")]
    MissingAuthContext,

    // =========================================================================
    // NotFound
    // =========================================================================
    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    // =========================================================================
    // Transient - retried internally, never escapes a component boundary
    // =========================================================================
    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream returned a server error: status {0}")]
    UpstreamServerError(u16),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("cache backend error: {0}")]
    CacheBackend(#[from] redis::RedisError),

    // =========================================================================
    // Corruption - decode failure of previously-cached bytes
    // =========================================================================
    #[error("failed to decode cached entity: {0}")]
    Decode(#[from] serde_json::Error),

    // =========================================================================
    // Fatal - unrecoverable invariant violation
    // =========================================================================
    #[error("fatal invariant violation: {0}")]
    Fatal(String),
}

impl ProxyError {
    /// Classifies this error into one of the six governing kinds.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProxyError::Config(_) | ProxyError::ConfigSource(_) => ErrorKind::ConfigError,
            ProxyError::UnknownApiKey
            | ProxyError::InvalidToken(_)
            | ProxyError::MissingAuthContext => ErrorKind::Unauthorized,
            ProxyError::NotFound(_) | ProxyError::UnknownEnvironment(_) => ErrorKind::NotFound,
            ProxyError::Timeout
            | ProxyError::UpstreamServerError(_)
            | ProxyError::Transport(_)
            | ProxyError::CacheBackend(_) => ErrorKind::Transient,
            ProxyError::Decode(_) => ErrorKind::Corruption,
            ProxyError::Fatal(_) => ErrorKind::Fatal,
        }
    }

    /// Whether a caller should retry this error with backoff.
    ///
    /// Only `Transient` errors are retryable; everything else is either a
    /// terminal outcome (`NotFound`, `Unauthorized`) or requires remediation
    /// before a retry could possibly succeed (`Corruption`, `Fatal`, `ConfigError`).
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
