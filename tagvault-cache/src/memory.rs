//! In-memory store implementation.
//!
//! Backs the test suite and small single-process deployments. Implements the
//! same watch/commit semantics as the Redis store: every key carries a
//! version counter, a transaction records the versions of watched keys, and
//! the commit aborts if any of them moved. Hash records expire lazily
//! against `tokio::time::Instant`, so paused-clock tests can drive expiry.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::{CacheError, CacheResult};
use crate::store::{StoreOp, StoreTransaction, TagStore};

#[derive(Default)]
struct HashRecord {
    fields: HashMap<String, Vec<u8>>,
    deadline: Option<Instant>,
}

impl HashRecord {
    fn is_live(&self) -> bool {
        self.deadline.is_none_or(|d| d > Instant::now())
    }
}

#[derive(Default)]
struct Shared {
    hashes: HashMap<String, HashRecord>,
    sets: HashMap<String, HashSet<String>>,
    versions: HashMap<String, u64>,
}

impl Shared {
    fn live_hash(&self, key: &str) -> Option<&HashRecord> {
        self.hashes.get(key).filter(|r| r.is_live())
    }

    fn set_of(&self, key: &str) -> HashSet<String> {
        self.sets.get(key).cloned().unwrap_or_default()
    }

    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn bump(&mut self, key: &str) {
        *self.versions.entry(key.to_string()).or_insert(0) += 1;
    }

    fn key_exists(&self, key: &str) -> bool {
        self.live_hash(key).is_some() || self.sets.contains_key(key)
    }

    fn apply(&mut self, op: StoreOp) {
        match op {
            StoreOp::HashSet { key, fields } => {
                let record = self.hashes.entry(key.clone()).or_default();
                if !record.is_live() {
                    // The old record already expired; this write starts fresh.
                    record.fields.clear();
                    record.deadline = None;
                }
                record.fields.extend(fields);
                self.bump(&key);
            }
            StoreOp::Expire { key, seconds } => {
                if let Some(record) = self.hashes.get_mut(&key)
                    && record.is_live()
                {
                    record.deadline = Some(Instant::now() + Duration::from_secs(seconds));
                    self.bump(&key);
                }
            }
            StoreOp::SetAdd { key, members } => {
                self.sets.entry(key.clone()).or_default().extend(members);
                self.bump(&key);
            }
            StoreOp::SetRemove { key, members } => {
                if let Some(set) = self.sets.get_mut(&key) {
                    for member in &members {
                        set.remove(member);
                    }
                    if set.is_empty() {
                        self.sets.remove(&key);
                    }
                    self.bump(&key);
                }
            }
            StoreOp::Delete { keys } => {
                for key in keys {
                    self.hashes.remove(&key);
                    self.sets.remove(&key);
                    self.bump(&key);
                }
            }
        }
    }
}

/// In-memory [`TagStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Shared>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Transaction over a [`MemoryStore`].
pub struct MemoryTransaction {
    inner: Arc<RwLock<Shared>>,
    watched: Vec<(String, u64)>,
    ops: Vec<StoreOp>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn watch(&mut self, key: &str) -> CacheResult<()> {
        let shared = self.inner.read().await;
        self.watched.push((key.to_string(), shared.version(key)));
        Ok(())
    }

    async fn set_members(&mut self, key: &str) -> CacheResult<Vec<String>> {
        let shared = self.inner.read().await;
        Ok(shared.set_of(key).into_iter().collect())
    }

    async fn exists(&mut self, key: &str) -> CacheResult<bool> {
        let shared = self.inner.read().await;
        Ok(shared.key_exists(key))
    }

    fn push(&mut self, op: StoreOp) {
        self.ops.push(op);
    }

    fn len(&self) -> usize {
        self.ops.len()
    }

    async fn commit(self) -> CacheResult<()> {
        let mut shared = self.inner.write().await;
        for (key, version) in &self.watched {
            if shared.version(key) != *version {
                return Err(CacheError::Conflict);
            }
        }
        for op in self.ops {
            shared.apply(op);
        }
        Ok(())
    }
}

#[async_trait]
impl TagStore for MemoryStore {
    type Txn = MemoryTransaction;

    async fn begin(&self) -> CacheResult<MemoryTransaction> {
        Ok(MemoryTransaction {
            inner: self.inner.clone(),
            watched: Vec::new(),
            ops: Vec::new(),
        })
    }

    async fn hash_get(&self, key: &str, field: &str) -> CacheResult<Option<Vec<u8>>> {
        let shared = self.inner.read().await;
        Ok(shared
            .live_hash(key)
            .and_then(|r| r.fields.get(field).cloned()))
    }

    async fn hash_get_all(&self, key: &str) -> CacheResult<HashMap<String, Vec<u8>>> {
        let shared = self.inner.read().await;
        Ok(shared
            .live_hash(key)
            .map(|r| r.fields.clone())
            .unwrap_or_default())
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        let shared = self.inner.read().await;
        Ok(shared.set_of(key).into_iter().collect())
    }

    async fn set_intersect(&self, keys: &[String]) -> CacheResult<Vec<String>> {
        let shared = self.inner.read().await;
        let Some((first, rest)) = keys.split_first() else {
            return Ok(Vec::new());
        };
        let mut result = shared.set_of(first);
        for key in rest {
            let other = shared.set_of(key);
            result.retain(|m| other.contains(m));
        }
        Ok(result.into_iter().collect())
    }

    async fn set_union(&self, keys: &[String]) -> CacheResult<Vec<String>> {
        let shared = self.inner.read().await;
        let mut result = HashSet::new();
        for key in keys {
            result.extend(shared.set_of(key));
        }
        Ok(result.into_iter().collect())
    }

    async fn set_diff(&self, keys: &[String]) -> CacheResult<Vec<String>> {
        let shared = self.inner.read().await;
        let Some((first, rest)) = keys.split_first() else {
            return Ok(Vec::new());
        };
        let mut result = shared.set_of(first);
        for key in rest {
            let other = shared.set_of(key);
            result.retain(|m| !other.contains(m));
        }
        Ok(result.into_iter().collect())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let shared = self.inner.read().await;
        Ok(shared.key_exists(key))
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let shared = self.inner.read().await;
        Ok(shared
            .live_hash(key)
            .and_then(|r| r.deadline)
            .map(|d| d.saturating_duration_since(Instant::now())))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let mut shared = self.inner.write().await;
        let live = shared.hashes.get(key).is_some_and(|r| r.is_live());
        if !live {
            return Ok(false);
        }
        if let Some(record) = shared.hashes.get_mut(key) {
            record.deadline = Some(Instant::now() + ttl);
        }
        shared.bump(key);
        Ok(true)
    }
}
