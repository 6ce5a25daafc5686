//! # Tagvault Redis
//!
//! Redis client integration for the tagvault cache backend: configuration,
//! bb8 connection pooling, and the raw command surface the backend consumes.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tagvault_redis::{RedisService, RedisConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisConfig::builder()
//!         .url("redis://localhost:6379")
//!         .pool_size(10)
//!         .build();
//!
//!     let redis = RedisService::new(config).await?;
//!
//!     // Pooled reads
//!     let ids = redis.smembers("zc:ids").await?;
//!
//!     // Dedicated connection for WATCH/MULTI/EXEC
//!     let mut conn = redis.get_dedicated().await?;
//!     redis::cmd("WATCH").arg("zc:ti:users").query_async::<()>(&mut conn).await?;
//!
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod pool;
mod service;

pub use config::{RedisConfig, RedisConfigBuilder};
pub use error::{RedisError, Result};
pub use pool::{RedisConnection, RedisPool, build_pool};
pub use service::{PoolStats, RedisService};

// Re-export redis crate for convenience
pub use redis;
pub use redis::{AsyncCommands, RedisResult, Value};

/// Prelude for common imports.
///
/// ```
/// use tagvault_redis::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{RedisConfig, RedisConfigBuilder};
    pub use crate::error::{RedisError, Result};
    pub use crate::pool::{RedisConnection, RedisPool};
    pub use crate::service::RedisService;
    pub use redis::AsyncCommands;
}
