//! Store client seam: the key-value operations the backend is built on.
//!
//! The backend never mutates more than one key outside a transaction. A
//! [`StoreTransaction`] is an explicit value scoped to one logical update:
//! watches and reads happen on it first, mutations are queued on it, and
//! [`StoreTransaction::commit`] applies the whole batch atomically or not at
//! all. Dropping an uncommitted transaction applies nothing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::CacheResult;

/// One queued mutation inside a transaction batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// Write fields into a hash record.
    HashSet {
        /// Hash key.
        key: String,
        /// Field name/value pairs.
        fields: Vec<(String, Vec<u8>)>,
    },
    /// Set a key's TTL in seconds.
    Expire {
        /// Key to expire.
        key: String,
        /// Lifetime in seconds.
        seconds: u64,
    },
    /// Add members to a set.
    SetAdd {
        /// Set key.
        key: String,
        /// Members to add.
        members: Vec<String>,
    },
    /// Remove members from a set.
    SetRemove {
        /// Set key.
        key: String,
        /// Members to remove.
        members: Vec<String>,
    },
    /// Delete keys outright.
    Delete {
        /// Keys to delete.
        keys: Vec<String>,
    },
}

/// A transaction in progress against the store.
///
/// Reads performed through the transaction happen after any watches placed
/// on it, so a commit fails with [`crate::CacheError::Conflict`] if another
/// writer touched a watched key between the read and the commit.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Watch a key: the commit aborts if it changes before `commit`.
    async fn watch(&mut self, key: &str) -> CacheResult<()>;

    /// Read a set's members within the transaction.
    async fn set_members(&mut self, key: &str) -> CacheResult<Vec<String>>;

    /// Check key existence within the transaction.
    async fn exists(&mut self, key: &str) -> CacheResult<bool>;

    /// Queue a mutation.
    fn push(&mut self, op: StoreOp);

    /// Number of queued mutations.
    fn len(&self) -> usize;

    /// True when no mutations are queued.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Commit the queued batch atomically.
    async fn commit(self) -> CacheResult<()>
    where
        Self: Sized;

    /// Queue a hash write.
    fn hash_set(&mut self, key: impl Into<String>, fields: Vec<(String, Vec<u8>)>)
    where
        Self: Sized,
    {
        self.push(StoreOp::HashSet {
            key: key.into(),
            fields,
        });
    }

    /// Queue a TTL update.
    fn expire(&mut self, key: impl Into<String>, seconds: u64)
    where
        Self: Sized,
    {
        self.push(StoreOp::Expire {
            key: key.into(),
            seconds,
        });
    }

    /// Queue a set insertion.
    fn set_add(&mut self, key: impl Into<String>, members: Vec<String>)
    where
        Self: Sized,
    {
        if members.is_empty() {
            return;
        }
        self.push(StoreOp::SetAdd {
            key: key.into(),
            members,
        });
    }

    /// Queue a set removal.
    fn set_remove(&mut self, key: impl Into<String>, members: Vec<String>)
    where
        Self: Sized,
    {
        if members.is_empty() {
            return;
        }
        self.push(StoreOp::SetRemove {
            key: key.into(),
            members,
        });
    }

    /// Queue key deletion.
    fn delete(&mut self, keys: Vec<String>)
    where
        Self: Sized,
    {
        if keys.is_empty() {
            return;
        }
        self.push(StoreOp::Delete { keys });
    }
}

/// The key-value store the cache backend runs on: hashes, sets, set algebra,
/// TTLs, and optimistic transactions.
#[async_trait]
pub trait TagStore: Send + Sync {
    /// The transaction type this store hands out.
    type Txn: StoreTransaction;

    /// Begin a transaction.
    async fn begin(&self) -> CacheResult<Self::Txn>;

    /// Read one hash field.
    async fn hash_get(&self, key: &str, field: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Read all fields of a hash. Empty map when the key is absent.
    async fn hash_get_all(&self, key: &str) -> CacheResult<HashMap<String, Vec<u8>>>;

    /// Read a set's members. Empty when the key is absent.
    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>>;

    /// Intersection of the given sets.
    async fn set_intersect(&self, keys: &[String]) -> CacheResult<Vec<String>>;

    /// Union of the given sets.
    async fn set_union(&self, keys: &[String]) -> CacheResult<Vec<String>>;

    /// Difference: the first set minus all the others.
    async fn set_diff(&self, keys: &[String]) -> CacheResult<Vec<String>>;

    /// Check key existence.
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Remaining TTL of a key. `None`: absent key or no expiry set.
    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>>;

    /// Set a key's TTL. False when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool>;
}
