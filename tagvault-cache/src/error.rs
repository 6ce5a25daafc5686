//! Error types for cache operations.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific errors.
///
/// Absence of an entry is not an error: `load`, `test` and `metadata` return
/// `Ok(None)` for unknown ids.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Redis-specific error
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] tagvault_redis::RedisError),

    /// A transaction commit was aborted because a watched key changed
    #[error("Transaction aborted: watched key changed before commit")]
    Conflict,

    /// Garbage collection gave up after exhausting its retry budget
    #[error("Garbage collection deferred after {attempts} conflicting attempts")]
    CollectionDeferred {
        /// Number of passes attempted before giving up
        attempts: u32,
    },

    /// Tag name cannot be stored unambiguously
    #[error("Invalid tag {0:?}: tags must be non-empty and must not contain ','")]
    InvalidTag(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Store-level failure (connectivity, protocol)
    #[error("Store error: {0}")]
    Store(String),
}

impl CacheError {
    /// Check if this error is a watch/commit conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}
