//! Stale-while-revalidate cache on top of a [`CacheStore`]

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use metrics::counter;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::domain::cache::{CacheEntry, CacheNamespace, CacheStore, CacheStoreExt, EntryState, Freshness};
use crate::domain::{Clock, DomainError};

/// SWR cache shared by the services
///
/// - fresh hit: served from the store, origin untouched
/// - stale hit: served from the store while a detached task reloads it
/// - miss or expired: origin is called inline, the result is written back
///   in the background
///
/// Concurrent misses for the same key are not collapsed; each caller may
/// reach the origin. Background revalidations are deduplicated per key on a
/// best-effort basis.
///
/// Background writes carry the invalidation epoch observed before the
/// origin was read and are dropped if any `remove` happened since, so a
/// load racing an invalidation in this process does not resurrect the old
/// value. Other processes sharing a Redis store are not covered.
#[derive(Debug, Clone)]
pub struct SwrCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    freshness: HashMap<CacheNamespace, Freshness>,
    revalidating: Arc<Mutex<HashSet<String>>>,
    epoch: Arc<AtomicU64>,
}

impl SwrCache {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            freshness: HashMap::new(),
            revalidating: Arc::new(Mutex::new(HashSet::new())),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Overrides the default freshness of a namespace
    pub fn with_freshness(mut self, namespace: CacheNamespace, freshness: Freshness) -> Self {
        self.freshness.insert(namespace, freshness);
        self
    }

    pub fn freshness(&self, namespace: CacheNamespace) -> Freshness {
        self.freshness
            .get(&namespace)
            .copied()
            .unwrap_or_else(|| namespace.default_freshness())
    }

    /// Reads an entry; entries past `stale_until` are removed and reported
    /// as a miss
    pub async fn get<V>(
        &self,
        namespace: CacheNamespace,
        key: &str,
    ) -> Result<Option<CacheEntry<V>>, DomainError>
    where
        V: DeserializeOwned + Send,
    {
        let entry = self.store.get_entry::<V>(namespace, key).await?;

        match entry {
            Some(entry) if entry.state_at(self.clock.now_millis()) == EntryState::Expired => {
                if let Err(e) = self.store.remove_entry(namespace, key).await {
                    warn!(namespace = %namespace, key, error = %e, "Failed to evict expired cache entry");
                }
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Writes `value` with the namespace's freshness starting now
    pub async fn set<V>(&self, namespace: CacheNamespace, key: &str, value: V) -> Result<(), DomainError>
    where
        V: Serialize + Send + Sync,
    {
        self.set_with(namespace, key, value, self.freshness(namespace)).await
    }

    /// Writes `value` with windows chosen for this entry only
    pub async fn set_with<V>(
        &self,
        namespace: CacheNamespace,
        key: &str,
        value: V,
        freshness: Freshness,
    ) -> Result<(), DomainError>
    where
        V: Serialize + Send + Sync,
    {
        let entry = CacheEntry::new(value, self.clock.now_millis(), freshness);
        self.store.set_entry(namespace, key, &entry).await
    }

    pub async fn remove(&self, namespace: CacheNamespace, key: &str) -> Result<(), DomainError> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.store.remove_entry(namespace, key).await.map(|_| ())
    }

    /// Removes an entry, logging instead of failing
    pub async fn invalidate(&self, namespace: CacheNamespace, key: &str) {
        if let Err(e) = self.remove(namespace, key).await {
            warn!(namespace = %namespace, key, error = %e, "Failed to invalidate cache entry");
        }
    }

    /// Returns the cached value or loads it from the origin
    ///
    /// Cache read failures fall back to the origin. Origin failures are
    /// returned to the caller and nothing is cached.
    pub async fn swr<V, F, Fut>(
        &self,
        namespace: CacheNamespace,
        key: &str,
        load_from_origin: F,
    ) -> Result<V, DomainError>
    where
        V: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, DomainError>> + Send + 'static,
    {
        match self.get::<V>(namespace, key).await {
            Ok(Some(entry)) => {
                if entry.state_at(self.clock.now_millis()) == EntryState::Fresh {
                    counter!("keygate_cache_reads_total", "namespace" => namespace.as_str(), "result" => "fresh")
                        .increment(1);
                    return Ok(entry.value);
                }

                counter!("keygate_cache_reads_total", "namespace" => namespace.as_str(), "result" => "stale")
                    .increment(1);
                self.spawn_revalidation(namespace, key.to_string(), load_from_origin);
                return Ok(entry.value);
            }
            Ok(None) => {
                counter!("keygate_cache_reads_total", "namespace" => namespace.as_str(), "result" => "miss")
                    .increment(1);
            }
            Err(e) => {
                warn!(namespace = %namespace, key, error = %e, "Cache read failed, loading from origin");
            }
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        let value = load_from_origin().await?;
        let entry = CacheEntry::new(value, self.clock.now_millis(), self.freshness(namespace));
        let data = serde_json::to_string(&entry)
            .map_err(|e| DomainError::cache(format!("Failed to serialize cache entry: {}", e)));

        match data {
            Ok(data) => self.spawn_write(namespace, key.to_string(), data, entry.stale_until, epoch),
            Err(e) => warn!(namespace = %namespace, key, error = %e, "Skipping cache write"),
        }

        Ok(entry.value)
    }

    fn spawn_write(
        &self,
        namespace: CacheNamespace,
        key: String,
        data: String,
        expires_at: i64,
        epoch: u64,
    ) {
        let store = self.store.clone();
        let current_epoch = self.epoch.clone();

        tokio::spawn(async move {
            if current_epoch.load(Ordering::SeqCst) != epoch {
                debug!(namespace = %namespace, key, "Dropping write-back after invalidation");
                return;
            }

            if let Err(e) = store.set_raw(&namespace.key(&key), &data, expires_at).await {
                warn!(namespace = %namespace, key, error = %e, "Cache write-back failed");
            }
        });
    }

    fn spawn_revalidation<V, F, Fut>(&self, namespace: CacheNamespace, key: String, load: F)
    where
        V: Serialize + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, DomainError>> + Send + 'static,
    {
        let inflight_key = namespace.key(&key);

        {
            let mut inflight = self
                .revalidating
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            if !inflight.insert(inflight_key.clone()) {
                debug!(namespace = %namespace, key, "Revalidation already in flight");
                return;
            }
        }

        let cache = self.clone();
        let epoch = self.epoch.load(Ordering::SeqCst);

        tokio::spawn(async move {
            debug!(namespace = %namespace, key, "Revalidating stale cache entry");

            match load().await {
                Ok(_) if cache.epoch.load(Ordering::SeqCst) != epoch => {
                    debug!(namespace = %namespace, key, "Dropping revalidated value after invalidation");
                }
                Ok(value) => {
                    if let Err(e) = cache.set(namespace, &key, value).await {
                        warn!(namespace = %namespace, key, error = %e, "Failed to store revalidated value");
                    }
                }
                Err(e) => {
                    warn!(namespace = %namespace, key, error = %e, "Revalidation from origin failed");
                }
            }

            cache
                .revalidating
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&inflight_key);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::domain::cache::MockCacheStore;
    use crate::domain::ManualClock;
    use crate::infrastructure::cache::{InMemoryCacheConfig, InMemoryCacheStore};

    const NS: CacheNamespace = CacheNamespace::ApiById;

    fn cache_with(store: Arc<dyn CacheStore>, clock: Arc<ManualClock>) -> SwrCache {
        SwrCache::new(store, clock).with_freshness(NS, Freshness::from_millis(100, 500))
    }

    fn memory_cache() -> (SwrCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(10_000));
        let store = Arc::new(InMemoryCacheStore::with_config(
            InMemoryCacheConfig::default(),
            clock.clone(),
        ));
        (cache_with(store, clock.clone()), clock)
    }

    fn counting_loader(
        calls: &Arc<AtomicUsize>,
        value: &str,
    ) -> impl FnOnce() -> futures::future::BoxFuture<'static, Result<String, DomainError>> + Send + 'static
    {
        let calls = calls.clone();
        let value = value.to_string();
        move || {
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(value)
            })
        }
    }

    async fn wait_for(calls: &Arc<AtomicUsize>, expected: usize) {
        for _ in 0..100 {
            if calls.load(Ordering::SeqCst) >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_fresh_hit_skips_origin() {
        let (cache, clock) = memory_cache();
        let calls = Arc::new(AtomicUsize::new(0));

        cache.set(NS, "a", "cached".to_string()).await.unwrap();
        clock.advance(99);

        let value = cache.swr(NS, "a", counting_loader(&calls, "origin")).await.unwrap();
        assert_eq!(value, "cached");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_hit_serves_cached_and_revalidates_once() {
        let (cache, clock) = memory_cache();
        let calls = Arc::new(AtomicUsize::new(0));

        cache.set(NS, "a", "cached".to_string()).await.unwrap();
        clock.advance(250);

        let value = cache.swr(NS, "a", counting_loader(&calls, "origin")).await.unwrap();
        assert_eq!(value, "cached");

        wait_for(&calls, 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The revalidated value is now fresh
        let value = cache.swr(NS, "a", counting_loader(&calls, "other")).await.unwrap();
        assert_eq!(value, "origin");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_stale_reads_share_one_revalidation() {
        let (cache, clock) = memory_cache();
        let calls = Arc::new(AtomicUsize::new(0));

        cache.set(NS, "a", "cached".to_string()).await.unwrap();
        clock.advance(250);

        let slow_calls = calls.clone();
        let slow = move || async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            slow_calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, DomainError>("origin".to_string())
        };

        let first = cache.swr(NS, "a", slow).await.unwrap();
        let second = cache.swr(NS, "a", counting_loader(&calls, "dup")).await.unwrap();
        assert_eq!(first, "cached");
        assert_eq!(second, "cached");

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let (cache, clock) = memory_cache();
        let calls = Arc::new(AtomicUsize::new(0));

        cache.set(NS, "a", "cached".to_string()).await.unwrap();
        clock.advance(600);

        let value = cache.swr(NS, "a", counting_loader(&calls, "origin")).await.unwrap();
        assert_eq!(value, "origin");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_miss_writes_back_in_background() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(MockCacheStore::new());
        let cache = cache_with(store.clone(), clock);
        let calls = Arc::new(AtomicUsize::new(0));

        let value = cache.swr(NS, "a", counting_loader(&calls, "origin")).await.unwrap();
        assert_eq!(value, "origin");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.writes(), 1);
        assert!(store.contains("apiById:a"));
    }

    #[tokio::test]
    async fn test_origin_error_is_returned_and_not_cached() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(MockCacheStore::new());
        let cache = cache_with(store.clone(), clock);

        let result: Result<String, _> = cache
            .swr(NS, "a", || async { Err(DomainError::storage("db down")) })
            .await;
        assert!(matches!(result, Err(DomainError::Storage { .. })));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_falls_back_to_origin() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(MockCacheStore::new());
        store.set_failing(true);
        let cache = cache_with(store, clock);
        let calls = Arc::new(AtomicUsize::new(0));

        let value = cache.swr(NS, "a", counting_loader(&calls, "origin")).await.unwrap();
        assert_eq!(value, "origin");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidation_drops_pending_write_back() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(MockCacheStore::new());
        let cache = cache_with(store.clone(), clock);
        let calls = Arc::new(AtomicUsize::new(0));

        cache.swr(NS, "a", counting_loader(&calls, "origin")).await.unwrap();
        cache.remove(NS, "a").await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.writes(), 0);
        assert!(!store.contains("apiById:a"));
    }

    #[tokio::test]
    async fn test_remove() {
        let (cache, _) = memory_cache();

        cache.set(NS, "a", 1u32).await.unwrap();
        cache.remove(NS, "a").await.unwrap();

        let entry: Option<CacheEntry<u32>> = cache.get(NS, "a").await.unwrap();
        assert!(entry.is_none());
    }

    #[tokio::test]
    async fn test_set_with_overrides_namespace_freshness() {
        let (cache, clock) = memory_cache();

        cache
            .set_with(NS, "short", 1u32, Freshness::from_millis(10, 20))
            .await
            .unwrap();
        cache.set(NS, "default", 2u32).await.unwrap();

        clock.advance(15);
        let short: CacheEntry<u32> = cache.get(NS, "short").await.unwrap().unwrap();
        assert_eq!(short.state_at(clock.now_millis()), EntryState::Stale);
        let default: CacheEntry<u32> = cache.get(NS, "default").await.unwrap().unwrap();
        assert_eq!(default.state_at(clock.now_millis()), EntryState::Fresh);

        clock.advance(10);
        let short: Option<CacheEntry<u32>> = cache.get(NS, "short").await.unwrap();
        assert!(short.is_none());
    }

    #[test]
    fn test_default_freshness_used_when_not_overridden() {
        let cache = SwrCache::new(Arc::new(MockCacheStore::new()), Arc::new(ManualClock::new(0)));
        assert_eq!(
            cache.freshness(CacheNamespace::KeyByHash),
            CacheNamespace::KeyByHash.default_freshness()
        );
    }
}
