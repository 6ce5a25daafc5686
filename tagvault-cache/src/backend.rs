//! The cache backend: load/test/save/remove/clean/metadata/touch plus the
//! tag queries and the garbage collector.
//!
//! Every multi-step state change goes through one store transaction, so a
//! concurrent writer can never observe a half-applied save or remove. Reads
//! are not transactional; tag membership is allowed to lag entry existence
//! until the garbage collector reconciles them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::entry::{self, CacheEntry, Lifetime, MAX_LIFETIME};
use crate::error::{CacheError, CacheResult};
use crate::index;
use crate::store::{StoreTransaction, TagStore};

/// Group-invalidation mode for [`CacheBackend::clean`].
///
/// The tag-carrying variants require their tag list by construction; there
/// is no unrecognized mode to reject at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanMode {
    /// Remove every entry.
    All,
    /// Garbage-collect expired index references only.
    Old,
    /// Remove entries carrying all of the given tags (logical AND).
    MatchingTags(Vec<String>),
    /// Remove entries carrying none of the given tags.
    NotMatchingTags(Vec<String>),
    /// Remove entries carrying any of the given tags (logical OR), then
    /// drop the tags themselves.
    MatchingAnyTags(Vec<String>),
}

/// When an entry expires, as reported by [`CacheBackend::metadata`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// The entry never expires for the caller.
    Never,
    /// Unix timestamp of the expected expiry.
    At(i64),
}

/// Metadata for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    /// Unix timestamp of the last save.
    pub mtime: i64,
    /// Tags attached to the entry.
    pub tags: Vec<String>,
    /// Expected expiry.
    pub expires_at: Expiry,
}

/// What the backend supports, for frontends that adapt to their backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Expired index references are reclaimed automatically.
    pub automatic_cleaning: bool,
    /// Tag-based invalidation.
    pub tags: bool,
    /// Entries can outlive their logical expiry in the index and still be
    /// read until collected.
    pub expired_read: bool,
    /// Priority-based eviction.
    pub priority: bool,
    /// Entries can be saved without expiry.
    pub infinite_lifetime: bool,
    /// All ids and tags can be listed.
    pub get_list: bool,
}

/// Outcome of a completed garbage-collection run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Ids whose entry record had expired and were dropped from the index.
    pub expired_ids: usize,
    /// Tags whose membership became empty and were dropped.
    pub dropped_tags: usize,
    /// Passes needed (1 unless commits conflicted).
    pub attempts: u32,
}

/// Tag-indexed cache backend over a [`TagStore`].
pub struct CacheBackend<S: TagStore> {
    store: Arc<S>,
    config: CacheConfig,
}

impl<S: TagStore> CacheBackend<S> {
    /// Create a backend over the given store.
    pub fn new(store: Arc<S>, config: CacheConfig) -> Self {
        if let Some(default) = config.default_lifetime
            && default > MAX_LIFETIME
        {
            warn!(
                default_lifetime = default,
                max = MAX_LIFETIME,
                "default lifetime exceeds the 30-day store ceiling and will be capped"
            );
        }
        Self { store, config }
    }

    /// What this backend supports.
    pub const fn capabilities() -> Capabilities {
        Capabilities {
            automatic_cleaning: true,
            tags: true,
            expired_read: true,
            priority: false,
            infinite_lifetime: true,
            get_list: true,
        }
    }

    /// Load the payload stored under `id`. `None` when no entry record
    /// exists.
    ///
    /// `skip_validity` is accepted for interface parity with frontends that
    /// distinguish a validity-checked load; validity here is enforced by the
    /// store's own TTL, so absence is the only condition either way.
    pub async fn load(&self, id: &str, skip_validity: bool) -> CacheResult<Option<Vec<u8>>> {
        let _ = skip_validity;
        self.store
            .hash_get(&index::entry_key(id), entry::FIELD_DATA)
            .await
    }

    /// Return the entry's last modification time without the payload.
    pub async fn test(&self, id: &str) -> CacheResult<Option<i64>> {
        let raw = self
            .store
            .hash_get(&index::entry_key(id), entry::FIELD_MTIME)
            .await?;
        Ok(raw.as_deref().and_then(entry::parse_mtime))
    }

    /// Save a payload under `id` with the given tags.
    ///
    /// The entry record, its TTL, the per-tag membership updates and the
    /// global id/tag sets are committed as one transaction.
    pub async fn save(
        &self,
        payload: &[u8],
        id: &str,
        tags: &[String],
        lifetime: Lifetime,
    ) -> CacheResult<()> {
        entry::validate_tags(tags)?;
        let lifetime = lifetime.resolve(self.config.default_lifetime);

        let key = index::entry_key(id);
        let old_tags = match self.store.hash_get(&key, entry::FIELD_TAGS).await? {
            Some(raw) => entry::split_tags(&String::from_utf8_lossy(&raw)),
            None => Vec::new(),
        };
        let diff = index::diff_tags(&old_tags, tags);

        let record = CacheEntry {
            payload: payload.to_vec(),
            tags: tags.to_vec(),
            modified_at: entry::unix_now(),
            infinite: lifetime.is_none(),
        };

        let mut txn = self.store.begin().await?;
        txn.hash_set(key.clone(), record.to_fields());
        txn.expire(key, lifetime.unwrap_or(MAX_LIFETIME));
        txn.set_add(index::TAG_SET, diff.added.clone());
        for tag in &diff.added {
            txn.set_add(index::tag_key(tag), vec![id.to_string()]);
        }
        for tag in &diff.removed {
            txn.set_remove(index::tag_key(tag), vec![id.to_string()]);
        }
        txn.set_add(index::ID_SET, vec![id.to_string()]);
        txn.commit().await?;

        debug!(
            id,
            tags = tags.len(),
            infinite = record.infinite,
            "saved cache entry"
        );
        Ok(())
    }

    /// Remove an entry and every index reference to it. Removing an id that
    /// was never saved is a no-op success.
    pub async fn remove(&self, id: &str) -> CacheResult<bool> {
        let key = index::entry_key(id);
        let tags = match self.store.hash_get(&key, entry::FIELD_TAGS).await? {
            Some(raw) => entry::split_tags(&String::from_utf8_lossy(&raw)),
            None => Vec::new(),
        };

        let mut txn = self.store.begin().await?;
        txn.delete(vec![key]);
        txn.set_remove(index::ID_SET, vec![id.to_string()]);
        for tag in &tags {
            txn.set_remove(index::tag_key(tag), vec![id.to_string()]);
        }
        txn.commit().await?;

        debug!(id, "removed cache entry");
        Ok(true)
    }

    /// Clean entries by mode. Tag modes finish with a garbage-collection
    /// pass, since a bulk removal leaves other tags' membership sets holding
    /// references to the deleted entries.
    pub async fn clean(&self, mode: CleanMode) -> CacheResult<()> {
        match mode {
            CleanMode::All => {
                let ids = self.ids().await?;
                self.remove_ids(&ids).await
            }
            CleanMode::Old => {
                self.collect_garbage().await?;
                Ok(())
            }
            CleanMode::MatchingTags(tags) => {
                if tags.is_empty() {
                    return Ok(());
                }
                let ids = self.ids_matching_tags(&tags).await?;
                self.remove_ids(&ids).await?;
                self.collect_garbage().await?;
                Ok(())
            }
            CleanMode::NotMatchingTags(tags) => {
                if tags.is_empty() {
                    return Ok(());
                }
                let ids = self.ids_not_matching_tags(&tags).await?;
                self.remove_ids(&ids).await?;
                self.collect_garbage().await?;
                Ok(())
            }
            CleanMode::MatchingAnyTags(tags) => {
                if tags.is_empty() {
                    return Ok(());
                }
                let ids = self.ids_matching_any_tags(&tags).await?;
                let mut txn = self.store.begin().await?;
                txn.delete(index::entry_keys(&ids));
                txn.set_remove(index::ID_SET, ids);
                txn.delete(index::tag_keys(&tags));
                txn.set_remove(index::TAG_SET, tags);
                txn.commit().await?;
                self.collect_garbage().await?;
                Ok(())
            }
        }
    }

    /// All stored ids.
    pub async fn ids(&self) -> CacheResult<Vec<String>> {
        self.store.set_members(index::ID_SET).await
    }

    /// All tags in use.
    pub async fn tags(&self) -> CacheResult<Vec<String>> {
        self.store.set_members(index::TAG_SET).await
    }

    /// Ids carrying all of the given tags (logical AND).
    pub async fn ids_matching_tags(&self, tags: &[String]) -> CacheResult<Vec<String>> {
        self.store.set_intersect(&index::tag_keys(tags)).await
    }

    /// Ids carrying none of the given tags.
    pub async fn ids_not_matching_tags(&self, tags: &[String]) -> CacheResult<Vec<String>> {
        let mut keys = Vec::with_capacity(tags.len() + 1);
        keys.push(index::ID_SET.to_string());
        keys.extend(index::tag_keys(tags));
        self.store.set_diff(&keys).await
    }

    /// Ids carrying any of the given tags (logical OR).
    pub async fn ids_matching_any_tags(&self, tags: &[String]) -> CacheResult<Vec<String>> {
        self.store.set_union(&index::tag_keys(tags)).await
    }

    /// Metadata for one entry: mtime, tags and expected expiry. `None` when
    /// the entry record is absent.
    pub async fn metadata(&self, id: &str) -> CacheResult<Option<EntryMetadata>> {
        let key = index::entry_key(id);
        let fields = self.store.hash_get_all(&key).await?;
        let Some(record) = CacheEntry::from_fields(&fields) else {
            return Ok(None);
        };

        let expires_at = if record.infinite {
            Expiry::Never
        } else {
            match self.store.ttl(&key).await? {
                Some(remaining) => Expiry::At(entry::unix_now() + remaining.as_secs() as i64),
                None => Expiry::Never,
            }
        };

        Ok(Some(EntryMetadata {
            mtime: record.modified_at,
            tags: record.tags,
            expires_at,
        }))
    }

    /// Extend a finite entry's lifetime by `extra_lifetime` seconds beyond
    /// its current remaining TTL. Returns false for absent or infinite
    /// entries.
    pub async fn touch(&self, id: &str, extra_lifetime: u64) -> CacheResult<bool> {
        let key = index::entry_key(id);
        match self.store.hash_get(&key, entry::FIELD_INF).await? {
            Some(flag) if flag.as_slice() == b"0" => {
                let remaining = self
                    .store
                    .ttl(&key)
                    .await?
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                let extended = remaining.saturating_add(extra_lifetime).min(MAX_LIFETIME);
                self.store.expire(&key, Duration::from_secs(extended)).await
            }
            _ => Ok(false),
        }
    }

    /// Reconcile the tag index against actual entry existence.
    ///
    /// Runs passes until one commits cleanly; a pass that loses its
    /// watch/commit race is retried from the beginning, up to the configured
    /// attempt budget, after which the run ends with
    /// [`CacheError::CollectionDeferred`].
    pub async fn collect_garbage(&self) -> CacheResult<GcReport> {
        let max_attempts = self.config.gc_max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.gc_pass().await {
                Ok(mut report) => {
                    report.attempts = attempt;
                    debug!(
                        expired_ids = report.expired_ids,
                        dropped_tags = report.dropped_tags,
                        attempts = attempt,
                        "garbage collection completed"
                    );
                    return Ok(report);
                }
                Err(CacheError::Conflict) => {
                    debug!(attempt, "garbage collection pass conflicted, restarting");
                }
                Err(e) => return Err(e),
            }
        }
        Err(CacheError::CollectionDeferred {
            attempts: max_attempts,
        })
    }

    /// One garbage-collection pass, committed as a single transaction that
    /// watches every tag membership key it read. Never touches entries that
    /// still exist.
    async fn gc_pass(&self) -> CacheResult<GcReport> {
        let tags = self.tags().await?;

        let mut txn = self.store.begin().await?;
        let mut existence: HashMap<String, bool> = HashMap::new();
        let mut expired_ids: HashSet<String> = HashSet::new();
        let mut dropped_tags = 0usize;

        for tag in &tags {
            let key = index::tag_key(tag);
            txn.watch(&key).await?;
            let members = txn.set_members(&key).await?;

            let mut expired = Vec::new();
            for id in &members {
                let exists = match existence.get(id) {
                    Some(known) => *known,
                    None => {
                        let probed = txn.exists(&index::entry_key(id)).await?;
                        existence.insert(id.clone(), probed);
                        probed
                    }
                };
                if !exists {
                    expired.push(id.clone());
                }
            }

            if members.is_empty() || expired.len() == members.len() {
                txn.delete(vec![key]);
                txn.set_remove(index::TAG_SET, vec![tag.clone()]);
                dropped_tags += 1;
            } else {
                txn.set_remove(key, expired.clone());
            }
            expired_ids.extend(expired);
        }

        if !expired_ids.is_empty() {
            txn.set_remove(index::ID_SET, expired_ids.iter().cloned().collect());
        }
        if !txn.is_empty() {
            txn.commit().await?;
        }

        Ok(GcReport {
            expired_ids: expired_ids.len(),
            dropped_tags,
            attempts: 0,
        })
    }

    /// Delete a batch of entries and their global-id references in one
    /// transaction. Their tag memberships are left for garbage collection.
    async fn remove_ids(&self, ids: &[String]) -> CacheResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut txn = self.store.begin().await?;
        txn.delete(index::entry_keys(ids));
        txn.set_remove(index::ID_SET, ids.to_vec());
        txn.commit().await?;
        debug!(count = ids.len(), "removed cache entries");
        Ok(())
    }
}
