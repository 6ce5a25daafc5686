//! Tag-indexed cache backend over Redis.
//!
//! Stores opaque byte payloads under string ids, attaches tags to entries,
//! and invalidates groups of entries by tag with AND/OR/NOT combinations.
//! Consistency across concurrent writers comes from the store's optimistic
//! transactions (watch-then-commit); a garbage collector reconciles the tag
//! index against entries the store already expired.
//!
//! # Features
//!
//! - `redis` - Redis store support (enabled by default)
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use tagvault_cache::prelude::*;
//! use tagvault_redis::{RedisConfig, RedisService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), CacheError> {
//!     let redis = RedisService::new(RedisConfig::new("redis://localhost:6379"))
//!         .await
//!         .map_err(CacheError::from)?;
//!     let store = Arc::new(RedisStore::new(Arc::new(redis)));
//!     let cache = CacheBackend::new(store, CacheConfig::default());
//!
//!     cache
//!         .save(
//!             br#"{"name":"Alice"}"#,
//!             "user:123",
//!             &["users".to_string(), "active".to_string()],
//!             Lifetime::Secs(3600),
//!         )
//!         .await?;
//!
//!     // Invalidate everything tagged "users"
//!     cache
//!         .clean(CleanMode::MatchingAnyTags(vec!["users".to_string()]))
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The in-memory store runs the same backend without a server:
//!
//! ```
//! use std::sync::Arc;
//! use tagvault_cache::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), CacheError> {
//! let cache = CacheBackend::new(Arc::new(MemoryStore::new()), CacheConfig::default());
//! cache.save(b"v1", "x1", &["t1".to_string()], Lifetime::Default).await?;
//! assert_eq!(cache.load("x1", false).await?, Some(b"v1".to_vec()));
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod entry;
pub mod error;
pub mod index;
pub mod memory;
pub mod store;

#[cfg(feature = "redis")]
pub mod redis_store;

pub use backend::{
    CacheBackend, Capabilities, CleanMode, EntryMetadata, Expiry, GcReport,
};
pub use config::CacheConfig;
pub use entry::{CacheEntry, Lifetime, MAX_LIFETIME};
pub use error::{CacheError, CacheResult};
pub use memory::MemoryStore;
pub use store::{StoreOp, StoreTransaction, TagStore};

#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::backend::{
        CacheBackend, Capabilities, CleanMode, EntryMetadata, Expiry, GcReport,
    };
    pub use crate::config::CacheConfig;
    pub use crate::entry::Lifetime;
    pub use crate::error::{CacheError, CacheResult};
    pub use crate::memory::MemoryStore;
    pub use crate::store::{StoreTransaction, TagStore};

    #[cfg(feature = "redis")]
    pub use crate::redis_store::RedisStore;
}
