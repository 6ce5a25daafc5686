//! Redis store implementation.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tagvault_redis::RedisService;

use crate::error::{CacheError, CacheResult};
use crate::store::{StoreOp, StoreTransaction, TagStore};

fn redis_err(e: redis::RedisError) -> CacheError {
    CacheError::Redis(e.into())
}

/// [`TagStore`] over a Redis server.
///
/// Reads go through the shared connection pool. Transactions run on a
/// dedicated connection because WATCH state is per connection and must not
/// leak between users of a multiplexed pool connection.
#[derive(Clone)]
pub struct RedisStore {
    service: Arc<RedisService>,
}

impl RedisStore {
    /// Create a store over an existing Redis service.
    pub fn new(service: Arc<RedisService>) -> Self {
        Self { service }
    }

    /// Get the underlying service.
    pub fn service(&self) -> &RedisService {
        &self.service
    }
}

/// Transaction over a [`RedisStore`]: WATCH plus an atomic MULTI/EXEC
/// pipeline. A nil EXEC reply means a watched key changed and nothing was
/// applied. Dropping the transaction drops the connection, which discards
/// any watch state on the server.
pub struct RedisTransaction {
    conn: MultiplexedConnection,
    watched: bool,
    ops: Vec<StoreOp>,
}

#[async_trait]
impl StoreTransaction for RedisTransaction {
    async fn watch(&mut self, key: &str) -> CacheResult<()> {
        let _: () = redis::cmd("WATCH")
            .arg(key)
            .query_async(&mut self.conn)
            .await
            .map_err(redis_err)?;
        self.watched = true;
        Ok(())
    }

    async fn set_members(&mut self, key: &str) -> CacheResult<Vec<String>> {
        let members: Vec<String> = self.conn.smembers(key).await.map_err(redis_err)?;
        Ok(members)
    }

    async fn exists(&mut self, key: &str) -> CacheResult<bool> {
        let exists: bool = self.conn.exists(key).await.map_err(redis_err)?;
        Ok(exists)
    }

    fn push(&mut self, op: StoreOp) {
        self.ops.push(op);
    }

    fn len(&self) -> usize {
        self.ops.len()
    }

    async fn commit(mut self) -> CacheResult<()> {
        if self.ops.is_empty() {
            if self.watched {
                let _: () = redis::cmd("UNWATCH")
                    .query_async(&mut self.conn)
                    .await
                    .map_err(redis_err)?;
            }
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in &self.ops {
            match op {
                StoreOp::HashSet { key, fields } => {
                    pipe.hset_multiple(key, fields).ignore();
                }
                StoreOp::Expire { key, seconds } => {
                    pipe.expire(key, *seconds as i64).ignore();
                }
                StoreOp::SetAdd { key, members } => {
                    pipe.sadd(key, members).ignore();
                }
                StoreOp::SetRemove { key, members } => {
                    pipe.srem(key, members).ignore();
                }
                StoreOp::Delete { keys } => {
                    pipe.del(keys).ignore();
                }
            }
        }

        // EXEC returns nil when a watched key changed since WATCH.
        let result: Option<()> = pipe
            .query_async(&mut self.conn)
            .await
            .map_err(redis_err)?;
        match result {
            Some(()) => Ok(()),
            None => Err(CacheError::Conflict),
        }
    }
}

#[async_trait]
impl TagStore for RedisStore {
    type Txn = RedisTransaction;

    async fn begin(&self) -> CacheResult<RedisTransaction> {
        let conn = self.service.get_dedicated().await?;
        Ok(RedisTransaction {
            conn,
            watched: false,
            ops: Vec::new(),
        })
    }

    async fn hash_get(&self, key: &str, field: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.service.hget(key, field).await?)
    }

    async fn hash_get_all(&self, key: &str) -> CacheResult<HashMap<String, Vec<u8>>> {
        Ok(self.service.hgetall(key).await?)
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        Ok(self.service.smembers(key).await?)
    }

    async fn set_intersect(&self, keys: &[String]) -> CacheResult<Vec<String>> {
        Ok(self.service.sinter(keys).await?)
    }

    async fn set_union(&self, keys: &[String]) -> CacheResult<Vec<String>> {
        Ok(self.service.sunion(keys).await?)
    }

    async fn set_diff(&self, keys: &[String]) -> CacheResult<Vec<String>> {
        Ok(self.service.sdiff(keys).await?)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.service.exists(key).await?)
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        Ok(self.service.ttl(key).await?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        Ok(self.service.expire(key, ttl).await?)
    }
}
