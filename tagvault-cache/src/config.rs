//! Cache backend configuration.

use serde::{Deserialize, Serialize};

/// Cache backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default lifetime in seconds for entries saved without an explicit
    /// lifetime. `None` means entries default to infinite lifetime.
    pub default_lifetime: Option<u64>,

    /// Maximum number of garbage-collection passes attempted when commits
    /// keep conflicting with concurrent writers.
    pub gc_max_attempts: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_lifetime: Some(3600),
            gc_max_attempts: 5,
        }
    }
}

impl CacheConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default entry lifetime in seconds.
    pub fn with_default_lifetime(mut self, seconds: u64) -> Self {
        self.default_lifetime = Some(seconds);
        self
    }

    /// Make entries infinite by default.
    pub fn with_infinite_default(mut self) -> Self {
        self.default_lifetime = None;
        self
    }

    /// Set the garbage-collection retry budget.
    pub fn with_gc_max_attempts(mut self, attempts: u32) -> Self {
        self.gc_max_attempts = attempts.max(1);
        self
    }
}
