//! Keyed TTL cache with double-checked refresh.
//!
//! Each key owns a slot guarded by its own lock. The map lock is only held
//! long enough to find or insert a slot, so a slow refresh of one key never
//! delays hits or refreshes of another. Readers take the slot's shared lock
//! and return an entry while it is younger than the TTL. On a miss the caller
//! takes the slot's exclusive lock, checks again (a concurrent caller may have
//! refreshed while it waited) and only then runs the loader. Failed lookups
//! are cached with their error, so a key that keeps failing is retried once
//! per TTL window.
//!
//! The loader runs in a detached task that owns the slot's write guard. A
//! caller that stops waiting (timeout, dropped future) does not cancel the
//! refresh; the entry is still stored for the next caller.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Failure of the cache machinery itself, not of the cached lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("Refresh of {cache} cache entry did not complete: {reason}")]
    RefreshAborted { cache: &'static str, reason: String },
}

/// One cached lookup outcome.
#[derive(Debug, Clone)]
pub struct CacheEntry<V, E> {
    pub outcome: Result<V, E>,
    pub refreshed_at: Instant,
}

impl<V, E> CacheEntry<V, E> {
    fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.refreshed_at) < ttl
    }
}

/// Per-key storage. `None` until the first refresh of the key completes.
type Slot<V, E> = Arc<RwLock<Option<CacheEntry<V, E>>>>;

/// A keyed cache whose entries are valid for a fixed time-to-live.
///
/// Constructed explicitly and shared by `Arc`; there is no process-wide
/// instance.
pub struct TtlCache<K, V, E> {
    name: &'static str,
    ttl: Duration,
    slots: RwLock<HashMap<K, Slot<V, E>>>,
    closed: AtomicBool,
}

impl<K, V, E> TtlCache<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<CacheError> + 'static,
{
    /// Create an empty cache. `name` only appears in logs.
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            slots: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Find the slot for `key`, inserting an empty one if needed.
    async fn slot(&self, key: &K) -> Slot<V, E> {
        if let Some(slot) = self.slots.read().await.get(key) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    fn fresh(&self, entry: Option<&CacheEntry<V, E>>) -> Option<Result<V, E>> {
        entry
            .filter(|e| e.is_fresh(self.ttl, Instant::now()))
            .map(|e| e.outcome.clone())
    }

    /// Return the cached outcome for `key`, running `loader` if it is
    /// missing or older than the TTL.
    pub async fn get_or_refresh<F, Fut>(&self, key: K, loader: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            debug!(cache = self.name, ?key, "cache closed, loading without caching");
            return loader().await;
        }

        let slot = self.slot(&key).await;
        if let Some(outcome) = self.fresh(slot.read().await.as_ref()) {
            trace!(cache = self.name, ?key, "cache hit");
            return outcome;
        }

        let mut entry = slot.write_owned().await;
        if let Some(outcome) = self.fresh(entry.as_ref()) {
            trace!(cache = self.name, ?key, "cache hit after acquiring slot lock");
            return outcome;
        }

        debug!(cache = self.name, ?key, "refreshing cache entry");
        let refresh = tokio::spawn(async move {
            let outcome = loader().await;
            *entry = Some(CacheEntry {
                outcome: outcome.clone(),
                refreshed_at: Instant::now(),
            });
            outcome
        });

        refresh.await.unwrap_or_else(|err| {
            Err(E::from(CacheError::RefreshAborted {
                cache: self.name,
                reason: err.to_string(),
            }))
        })
    }

    /// Copy of the current entry for `key`, fresh or not.
    pub async fn peek(&self, key: &K) -> Option<CacheEntry<V, E>> {
        let slot = self.slots.read().await.get(key).cloned()?;
        let entry = slot.read().await;
        entry.clone()
    }

    /// Number of keys holding an entry. Waits for in-flight refreshes.
    pub async fn len(&self) -> usize {
        let slots: Vec<Slot<V, E>> = self.slots.read().await.values().cloned().collect();
        let mut count = 0;
        for slot in slots {
            if slot.read().await.is_some() {
                count += 1;
            }
        }
        count
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop all entries and stop caching. Later lookups call the loader directly.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let mut slots = self.slots.write().await;
        debug!(cache = self.name, entries = slots.len(), "closing cache");
        slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TestError {
        Lookup(String),
        Cache(CacheError),
    }

    impl From<CacheError> for TestError {
        fn from(err: CacheError) -> Self {
            Self::Cache(err)
        }
    }

    type TestCache = TtlCache<String, u32, TestError>;

    const TTL: Duration = Duration::from_secs(300);

    async fn counted_get(cache: &TestCache, calls: &Arc<AtomicUsize>, key: &str) -> Result<u32, TestError> {
        let calls = Arc::clone(calls);
        cache
            .get_or_refresh(key.to_string(), move || async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Ok(u32::try_from(n).unwrap_or(u32::MAX) + 100)
            })
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_value_is_reused_within_ttl() {
        let cache = TestCache::new("test", TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        let first = counted_get(&cache, &calls, "eth0").await.unwrap();
        tokio::time::advance(TTL - Duration::from_millis(1)).await;
        let second = counted_get(&cache, &calls, "eth0").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_refreshes_once_under_concurrency() {
        let cache = Arc::new(TestCache::new("test", TTL));
        let calls = Arc::new(AtomicUsize::new(0));

        counted_get(&cache, &calls, "eth0").await.unwrap();
        tokio::time::advance(TTL + Duration::from_millis(1)).await;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                counted_get(&cache, &calls, "eth0").await
            }));
        }
        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(values.iter().all(|v| *v == 101));
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_are_cached() {
        let cache = TestCache::new("test", TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let result = cache
                .get_or_refresh("ib0".to_string(), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::Lookup("no route".to_string()))
                })
                .await;
            assert_eq!(result, Err(TestError::Lookup("no route".to_string())));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(TTL).await;
        let calls_after = Arc::clone(&calls);
        let _ = cache
            .get_or_refresh("ib0".to_string(), move || async move {
                calls_after.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_refresh_still_populates_cache() {
        let cache = TestCache::new("test", TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        let slow_calls = Arc::clone(&calls);
        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            cache.get_or_refresh("eth1".to_string(), move || async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                slow_calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            }),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(500)).await;
        let value = counted_get(&cache, &calls, "eth1").await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let cache = TestCache::new("test", TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        counted_get(&cache, &calls, "eth0").await.unwrap();
        counted_get(&cache, &calls, "eth1").await.unwrap();
        counted_get(&cache, &calls, "eth0").await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_refresh_does_not_block_other_keys() {
        let cache = Arc::new(TestCache::new("test", TTL));
        let calls = Arc::new(AtomicUsize::new(0));
        let warm = counted_get(&cache, &calls, "eth1").await.unwrap();

        let slow_cache = Arc::clone(&cache);
        let slow = tokio::spawn(async move {
            slow_cache
                .get_or_refresh("eth0".to_string(), || async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(1)
                })
                .await
        });
        // Let the slow refresh take its slot lock.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        let started = Instant::now();
        let hit = tokio::time::timeout(Duration::from_millis(5), counted_get(&cache, &calls, "eth1"))
            .await
            .expect("hit on eth1 waited behind the eth0 refresh")
            .unwrap();
        assert_eq!(hit, warm);
        assert!(started.elapsed() < Duration::from_millis(5));

        let fresh_calls = Arc::clone(&calls);
        let other = tokio::time::timeout(Duration::from_secs(1), counted_get(&cache, &fresh_calls, "eth2"))
            .await
            .expect("refresh of eth2 waited behind the eth0 refresh")
            .unwrap();
        assert_eq!(other, 101);

        assert_eq!(slow.await.unwrap(), Ok(1));
        assert_eq!(cache.len().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_clears_and_bypasses() {
        let cache = TestCache::new("test", TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        counted_get(&cache, &calls, "eth0").await.unwrap();
        cache.close().await;
        assert!(cache.is_empty().await);

        counted_get(&cache, &calls, "eth0").await.unwrap();
        counted_get(&cache, &calls, "eth0").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(cache.peek(&"eth0".to_string()).await.is_none());
    }
}
