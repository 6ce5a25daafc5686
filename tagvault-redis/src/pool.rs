//! Redis connection pool.

use bb8::{Pool, PooledConnection};
use bb8_redis::RedisConnectionManager;
use redis::aio::MultiplexedConnection;
use std::ops::{Deref, DerefMut};
use tracing::info;

use crate::{RedisConfig, RedisError, Result};

/// Type alias for the connection pool.
pub type RedisPool = Pool<RedisConnectionManager>;

/// A pooled Redis connection.
pub struct RedisConnection<'a> {
    conn: PooledConnection<'a, RedisConnectionManager>,
}

impl<'a> RedisConnection<'a> {
    /// Create a new connection wrapper.
    pub fn new(conn: PooledConnection<'a, RedisConnectionManager>) -> Self {
        Self { conn }
    }
}

impl<'a> Deref for RedisConnection<'a> {
    type Target = MultiplexedConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl<'a> DerefMut for RedisConnection<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

/// Build a connection pool from the given configuration.
///
/// The pool is verified with a PING before it is handed back, so a bad URL or
/// an unreachable server fails here instead of on the first cache operation.
pub async fn build_pool(config: &RedisConfig) -> Result<RedisPool> {
    let url = config.connection_url();

    let manager = RedisConnectionManager::new(url)
        .map_err(|e| RedisError::Connection(e.to_string()))?;

    let pool = Pool::builder()
        .max_size(config.pool_size)
        .min_idle(config.min_idle)
        .connection_timeout(config.connection_timeout)
        .build(manager)
        .await
        .map_err(|e| RedisError::Pool(e.to_string()))?;

    {
        let mut conn = pool
            .get()
            .await
            .map_err(|e| RedisError::Pool(e.to_string()))?;
        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| RedisError::Connection(e.to_string()))?;
    }

    info!(
        pool_size = config.pool_size,
        url = %config.url,
        "Redis connection pool created"
    );

    Ok(pool)
}
