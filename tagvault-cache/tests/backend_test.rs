//! Integration tests for the cache backend over the in-memory store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tagvault_cache::memory::MemoryTransaction;
use tagvault_cache::prelude::*;
use tagvault_cache::store::StoreOp;

fn backend() -> CacheBackend<MemoryStore> {
    CacheBackend::new(Arc::new(MemoryStore::new()), CacheConfig::default())
}

fn tags(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn sorted(mut v: Vec<String>) -> Vec<String> {
    v.sort();
    v
}

#[tokio::test]
async fn test_load_and_test_unknown_id() {
    let cache = backend();
    assert_eq!(cache.load("nope", false).await.unwrap(), None);
    assert_eq!(cache.load("nope", true).await.unwrap(), None);
    assert_eq!(cache.test("nope").await.unwrap(), None);
    assert_eq!(cache.metadata("nope").await.unwrap(), None);
}

#[tokio::test]
async fn test_save_then_load() {
    let cache = backend();
    cache
        .save(b"payload", "id1", &tags(&["t1", "t2"]), Lifetime::Secs(100))
        .await
        .unwrap();

    assert_eq!(
        cache.load("id1", false).await.unwrap(),
        Some(b"payload".to_vec())
    );
    assert!(cache.test("id1").await.unwrap().is_some());
    assert_eq!(cache.ids().await.unwrap(), vec!["id1"]);
    assert_eq!(sorted(cache.tags().await.unwrap()), vec!["t1", "t2"]);

    for tag in ["t1", "t2"] {
        assert_eq!(
            cache.ids_matching_any_tags(&tags(&[tag])).await.unwrap(),
            vec!["id1"]
        );
    }
}

#[tokio::test]
async fn test_resave_moves_tag_memberships() {
    let cache = backend();
    cache
        .save(b"v1", "id", &tags(&["a", "b"]), Lifetime::Secs(100))
        .await
        .unwrap();
    cache
        .save(b"v2", "id", &tags(&["b", "c"]), Lifetime::Secs(100))
        .await
        .unwrap();

    assert!(
        cache
            .ids_matching_any_tags(&tags(&["a"]))
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        cache.ids_matching_any_tags(&tags(&["b"])).await.unwrap(),
        vec!["id"]
    );
    assert_eq!(
        cache.ids_matching_any_tags(&tags(&["c"])).await.unwrap(),
        vec!["id"]
    );
    assert_eq!(cache.load("id", false).await.unwrap(), Some(b"v2".to_vec()));
}

#[tokio::test]
async fn test_remove_clears_entry_and_memberships() {
    let cache = backend();
    cache
        .save(b"v", "id", &tags(&["a", "b"]), Lifetime::Secs(100))
        .await
        .unwrap();

    assert!(cache.remove("id").await.unwrap());
    assert_eq!(cache.load("id", false).await.unwrap(), None);
    assert!(cache.ids().await.unwrap().is_empty());
    for tag in ["a", "b"] {
        assert!(
            cache
                .ids_matching_any_tags(&tags(&[tag]))
                .await
                .unwrap()
                .is_empty()
        );
    }
}

#[tokio::test]
async fn test_tag_query_scenario() {
    let cache = backend();
    cache
        .save(b"v1", "x1", &tags(&["t1", "t2"]), Lifetime::Secs(100))
        .await
        .unwrap();
    assert_eq!(
        cache.ids_matching_tags(&tags(&["t1", "t2"])).await.unwrap(),
        vec!["x1"]
    );

    cache
        .save(b"v2", "x2", &tags(&["t2"]), Lifetime::Secs(100))
        .await
        .unwrap();
    assert_eq!(
        cache.ids_matching_any_tags(&tags(&["t1"])).await.unwrap(),
        vec!["x1"]
    );
    assert_eq!(
        sorted(cache.ids_matching_any_tags(&tags(&["t2"])).await.unwrap()),
        vec!["x1", "x2"]
    );
    assert_eq!(
        cache.ids_not_matching_tags(&tags(&["t1"])).await.unwrap(),
        vec!["x2"]
    );

    cache
        .clean(CleanMode::MatchingTags(tags(&["t1"])))
        .await
        .unwrap();
    assert_eq!(cache.load("x1", false).await.unwrap(), None);
    assert_eq!(cache.load("x2", false).await.unwrap(), Some(b"v2".to_vec()));
}

#[tokio::test]
async fn test_clean_matching_requires_all_tags() {
    let cache = backend();
    cache
        .save(b"ab", "both", &tags(&["a", "b"]), Lifetime::Secs(100))
        .await
        .unwrap();
    cache
        .save(b"a", "only_a", &tags(&["a"]), Lifetime::Secs(100))
        .await
        .unwrap();

    cache
        .clean(CleanMode::MatchingTags(tags(&["a", "b"])))
        .await
        .unwrap();

    assert_eq!(cache.load("both", false).await.unwrap(), None);
    assert_eq!(cache.load("only_a", false).await.unwrap(), Some(b"a".to_vec()));
}

#[tokio::test]
async fn test_clean_not_matching() {
    let cache = backend();
    cache
        .save(b"1", "tagged", &tags(&["keep"]), Lifetime::Secs(100))
        .await
        .unwrap();
    cache
        .save(b"2", "other", &tags(&["drop"]), Lifetime::Secs(100))
        .await
        .unwrap();

    cache
        .clean(CleanMode::NotMatchingTags(tags(&["keep"])))
        .await
        .unwrap();

    assert_eq!(cache.load("tagged", false).await.unwrap(), Some(b"1".to_vec()));
    assert_eq!(cache.load("other", false).await.unwrap(), None);
    assert_eq!(cache.ids().await.unwrap(), vec!["tagged"]);
}

#[tokio::test]
async fn test_clean_matching_any_drops_tag_records() {
    let cache = backend();
    cache
        .save(b"1", "x1", &tags(&["a"]), Lifetime::Secs(100))
        .await
        .unwrap();
    cache
        .save(b"2", "x2", &tags(&["b"]), Lifetime::Secs(100))
        .await
        .unwrap();
    cache
        .save(b"3", "x3", &tags(&["c"]), Lifetime::Secs(100))
        .await
        .unwrap();

    cache
        .clean(CleanMode::MatchingAnyTags(tags(&["a", "b"])))
        .await
        .unwrap();

    assert_eq!(cache.load("x1", false).await.unwrap(), None);
    assert_eq!(cache.load("x2", false).await.unwrap(), None);
    assert_eq!(cache.load("x3", false).await.unwrap(), Some(b"3".to_vec()));
    assert_eq!(cache.tags().await.unwrap(), vec!["c"]);
    assert!(
        cache
            .ids_matching_any_tags(&tags(&["a", "b"]))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_clean_all() {
    let cache = backend();
    for id in ["a", "b", "c"] {
        cache
            .save(b"v", id, &tags(&["t"]), Lifetime::Secs(100))
            .await
            .unwrap();
    }

    cache.clean(CleanMode::All).await.unwrap();

    assert!(cache.ids().await.unwrap().is_empty());
    for id in ["a", "b", "c"] {
        assert_eq!(cache.load(id, false).await.unwrap(), None);
    }

    // Stale membership references are reclaimed by the next collection.
    cache.clean(CleanMode::Old).await.unwrap();
    assert!(cache.tags().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_clean_with_empty_tag_list_is_noop() {
    let cache = backend();
    cache
        .save(b"v", "id", &tags(&["t"]), Lifetime::Secs(100))
        .await
        .unwrap();

    cache.clean(CleanMode::MatchingTags(Vec::new())).await.unwrap();
    cache
        .clean(CleanMode::NotMatchingTags(Vec::new()))
        .await
        .unwrap();
    cache
        .clean(CleanMode::MatchingAnyTags(Vec::new()))
        .await
        .unwrap();

    assert_eq!(cache.load("id", false).await.unwrap(), Some(b"v".to_vec()));
}

#[tokio::test(start_paused = true)]
async fn test_garbage_collection_reclaims_expired_references() {
    let cache = backend();
    cache
        .save(b"short", "a", &tags(&["t1"]), Lifetime::Secs(10))
        .await
        .unwrap();
    cache
        .save(b"long", "b", &tags(&["t1", "t2"]), Lifetime::Secs(100))
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(11)).await;
    assert_eq!(cache.load("a", false).await.unwrap(), None);
    // Expired id still lingers in the index until collected.
    assert_eq!(sorted(cache.ids().await.unwrap()), vec!["a", "b"]);

    let report = cache.collect_garbage().await.unwrap();
    assert_eq!(report.expired_ids, 1);
    assert_eq!(report.dropped_tags, 0);
    assert_eq!(report.attempts, 1);

    assert_eq!(cache.ids().await.unwrap(), vec!["b"]);
    assert_eq!(
        cache.ids_matching_any_tags(&tags(&["t1"])).await.unwrap(),
        vec!["b"]
    );

    // Idempotent: a second run with no intervening writes changes nothing.
    let report = cache.collect_garbage().await.unwrap();
    assert_eq!(report.expired_ids, 0);
    assert_eq!(report.dropped_tags, 0);

    tokio::time::advance(Duration::from_secs(100)).await;
    let report = cache.collect_garbage().await.unwrap();
    assert_eq!(report.expired_ids, 1);
    assert_eq!(report.dropped_tags, 2);
    assert!(cache.ids().await.unwrap().is_empty());
    assert!(cache.tags().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_infinite_lifetime_and_touch() {
    let cache = backend();
    cache
        .save(b"forever", "y", &tags(&["t"]), Lifetime::Secs(0))
        .await
        .unwrap();

    let meta = cache.metadata("y").await.unwrap().unwrap();
    assert_eq!(meta.expires_at, Expiry::Never);
    assert_eq!(meta.tags, vec!["t"]);

    // Infinite entries are not extendable.
    assert!(!cache.touch("y", 50).await.unwrap());

    cache
        .save(b"brief", "z", &tags(&[]), Lifetime::Secs(10))
        .await
        .unwrap();
    let before = cache.metadata("z").await.unwrap().unwrap();
    assert!(matches!(before.expires_at, Expiry::At(_)));

    assert!(cache.touch("z", 50).await.unwrap());
    let (Expiry::At(a), Expiry::At(b)) = (
        before.expires_at,
        cache.metadata("z").await.unwrap().unwrap().expires_at,
    ) else {
        panic!("expected finite expiries");
    };
    assert!(b >= a + 50);
}

#[tokio::test]
async fn test_default_lifetime_none_means_infinite() {
    let store = Arc::new(MemoryStore::new());
    let cache = CacheBackend::new(store, CacheConfig::new().with_infinite_default());

    cache
        .save(b"v", "id", &tags(&[]), Lifetime::Default)
        .await
        .unwrap();
    let meta = cache.metadata("id").await.unwrap().unwrap();
    assert_eq!(meta.expires_at, Expiry::Never);
}

// Store wrapper whose transactions always lose their watch race, for
// exercising the garbage collector's bounded retry.
struct ContentiousStore {
    inner: MemoryStore,
}

struct ContentiousTxn {
    txn: MemoryTransaction,
    store: MemoryStore,
    watched: Vec<String>,
}

#[async_trait]
impl StoreTransaction for ContentiousTxn {
    async fn watch(&mut self, key: &str) -> CacheResult<()> {
        self.watched.push(key.to_string());
        self.txn.watch(key).await
    }

    async fn set_members(&mut self, key: &str) -> CacheResult<Vec<String>> {
        self.txn.set_members(key).await
    }

    async fn exists(&mut self, key: &str) -> CacheResult<bool> {
        self.txn.exists(key).await
    }

    fn push(&mut self, op: StoreOp) {
        self.txn.push(op);
    }

    fn len(&self) -> usize {
        self.txn.len()
    }

    async fn commit(self) -> CacheResult<()> {
        if let Some(key) = self.watched.first() {
            let mut noise = self.inner_txn().await?;
            noise.set_add(key.clone(), vec!["__contender__".to_string()]);
            noise.commit().await?;
        }
        self.txn.commit().await
    }
}

impl ContentiousTxn {
    async fn inner_txn(&self) -> CacheResult<MemoryTransaction> {
        self.store.begin().await
    }
}

#[async_trait]
impl TagStore for ContentiousStore {
    type Txn = ContentiousTxn;

    async fn begin(&self) -> CacheResult<ContentiousTxn> {
        Ok(ContentiousTxn {
            txn: self.inner.begin().await?,
            store: self.inner.clone(),
            watched: Vec::new(),
        })
    }

    async fn hash_get(&self, key: &str, field: &str) -> CacheResult<Option<Vec<u8>>> {
        self.inner.hash_get(key, field).await
    }

    async fn hash_get_all(&self, key: &str) -> CacheResult<HashMap<String, Vec<u8>>> {
        self.inner.hash_get_all(key).await
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        self.inner.set_members(key).await
    }

    async fn set_intersect(&self, keys: &[String]) -> CacheResult<Vec<String>> {
        self.inner.set_intersect(keys).await
    }

    async fn set_union(&self, keys: &[String]) -> CacheResult<Vec<String>> {
        self.inner.set_union(keys).await
    }

    async fn set_diff(&self, keys: &[String]) -> CacheResult<Vec<String>> {
        self.inner.set_diff(keys).await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.inner.exists(key).await
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        self.inner.ttl(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        self.inner.expire(key, ttl).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_gc_defers_under_sustained_contention() {
    let inner = MemoryStore::new();
    let seed = CacheBackend::new(Arc::new(inner.clone()), CacheConfig::default());
    seed.save(b"v", "id", &tags(&["t"]), Lifetime::Secs(5))
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(6)).await;

    let contentious = Arc::new(ContentiousStore { inner });
    let cache = CacheBackend::new(contentious, CacheConfig::new().with_gc_max_attempts(3));

    let err = cache.collect_garbage().await.unwrap_err();
    assert!(matches!(
        err,
        CacheError::CollectionDeferred { attempts: 3 }
    ));
}
