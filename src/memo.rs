// Memoization Store
// Thread-safe key -> result cache with compute-once semantics. Backs both the
// result-caching decorator and the singleton registry.

pub mod registry;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

pub use registry::SingletonRegistry;

/// Structured cache key: operation identity plus the full argument value.
///
/// Arguments are compared by value and by position, never by their string
/// rendering, so `("1", 23)` and `("12", 3)` stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallKey<A> {
    operation: String,
    args: A,
}

impl<A> CallKey<A> {
    pub fn new(operation: impl Into<String>, args: A) -> Self {
        Self {
            operation: operation.into(),
            args,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn args(&self) -> &A {
        &self.args
    }
}

/// Where a returned value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Slot was already resolved
    Cached,
    /// This caller ran the computation
    Computed,
    /// Another caller's in-flight computation resolved the slot while we waited
    Shared,
}

/// Point-in-time counters for a store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub failures: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Key -> result store where each slot moves `empty -> in-progress -> resolved`.
///
/// * At most one caller computes a given key; concurrent callers wait on the
///   in-flight computation and receive the same value.
/// * A failed computation leaves the slot empty. The failure goes to the
///   caller that ran it; the next caller for the key computes afresh.
/// * Locking is per slot. Reading a resolved slot takes no slot lock.
pub struct MemoizationStore<K, V> {
    slots: DashMap<K, Arc<OnceCell<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    failures: AtomicU64,
}

impl<K, V> MemoizationStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Return the resolved value for `key`, running `compute` only if no
    /// caller has resolved it yet.
    pub async fn get_or_compute<F, Fut, E>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        self.get_or_compute_tracked(key, compute)
            .await
            .map(|(value, _)| value)
    }

    /// Same as [`get_or_compute`](Self::get_or_compute), also reporting
    /// whether this caller computed the value.
    pub async fn get_or_compute_tracked<F, Fut, E>(
        &self,
        key: K,
        compute: F,
    ) -> Result<(V, Provenance), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = self.slot(&key);

        if let Some(value) = slot.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok((value.clone(), Provenance::Cached));
        }

        let mut computed = false;
        let outcome = slot
            .get_or_try_init(|| {
                computed = true;
                compute()
            })
            .await;

        match outcome {
            Ok(value) if computed => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok((value.clone(), Provenance::Computed))
            }
            Ok(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok((value.clone(), Provenance::Shared))
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                self.discard_empty(&key, &slot);
                Err(e)
            }
        }
    }

    /// Resolved value for `key`, if any. Never waits.
    pub fn get(&self, key: &K) -> Option<V> {
        self.slots.get(key).and_then(|slot| slot.get().cloned())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Drop the slot for `key`. Returns true if it held a resolved value.
    /// An in-flight computation still completes for its waiters.
    pub fn invalidate(&self, key: &K) -> bool {
        self.slots
            .remove(key)
            .map(|(_, slot)| slot.initialized())
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        self.slots.clear();
    }

    /// Number of resolved slots
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    // The map guard is released before returning so no shard lock is held
    // across an await.
    fn slot(&self, key: &K) -> Arc<OnceCell<V>> {
        if let Some(slot) = self.slots.get(key) {
            return Arc::clone(slot.value());
        }
        Arc::clone(self.slots.entry(key.clone()).or_default().value())
    }

    // Remove a slot left empty by a failed computation. Slots another caller
    // still holds are kept so its waiters share the next attempt. Clones are
    // taken under the shard lock, so the count cannot grow during the check.
    fn discard_empty(&self, key: &K, slot: &Arc<OnceCell<V>>) {
        self.slots.remove_if(key, |_, current| {
            Arc::ptr_eq(current, slot) && !current.initialized() && Arc::strong_count(current) == 2
        });
    }
}

impl<K, V> Default for MemoizationStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_resolved_slot_skips_compute() {
        let store: MemoizationStore<CallKey<u64>, u64> = MemoizationStore::new();
        let key = CallKey::new("square", 12);

        let first = store
            .get_or_compute(key.clone(), || async { Ok::<_, anyhow::Error>(144) })
            .await
            .unwrap();
        let second = store
            .get_or_compute(key.clone(), || async {
                Err(anyhow::anyhow!("compute must not run for a resolved key"))
            })
            .await
            .unwrap();

        assert_eq!(first, 144);
        assert_eq!(second, 144);
        let stats = store.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn test_failed_compute_leaves_slot_empty() {
        let store: MemoizationStore<&'static str, String> = MemoizationStore::new();

        let failed = store
            .get_or_compute("config", || async { Err(anyhow::anyhow!("not ready")) })
            .await;
        assert!(failed.is_err());
        assert!(!store.contains(&"config"));
        assert_eq!(store.stats().failures, 1);

        let (value, provenance) = store
            .get_or_compute_tracked("config", || async {
                Ok::<_, anyhow::Error>("loaded".to_string())
            })
            .await
            .unwrap();
        assert_eq!(value, "loaded");
        assert_eq!(provenance, Provenance::Computed);
    }

    #[tokio::test]
    async fn test_failures_do_not_accumulate_slots() {
        let store: MemoizationStore<u32, u32> = MemoizationStore::new();

        for n in 0..100 {
            let result = store
                .get_or_compute(n, || async { Err::<u32, _>(anyhow::anyhow!("offline")) })
                .await;
            assert!(result.is_err());
        }

        assert_eq!(store.slots.len(), 0);
        assert_eq!(store.stats().failures, 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_computation() {
        let store = Arc::new(MemoizationStore::<u32, u64>::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            let runs = Arc::clone(&runs);
            handles.push(tokio::spawn(async move {
                store
                    .get_or_compute(7, move || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, anyhow::Error>(5040)
                    })
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 5040);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let store: MemoizationStore<u8, u8> = MemoizationStore::new();
        store
            .get_or_compute(1, || async { Ok::<_, anyhow::Error>(10) })
            .await
            .unwrap();
        store
            .get_or_compute(2, || async { Ok::<_, anyhow::Error>(20) })
            .await
            .unwrap();
        assert_eq!(store.len(), 2);

        assert!(store.invalidate(&1));
        assert!(!store.invalidate(&1));
        assert_eq!(store.get(&2), Some(20));

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_call_keys_are_positional() {
        let a = CallKey::new("concat", ("1".to_string(), 23));
        let b = CallKey::new("concat", ("12".to_string(), 3));
        assert_ne!(a, b);
        assert_ne!(CallKey::new("add", (1, 2)), CallKey::new("add", (2, 1)));
        assert_ne!(CallKey::new("f", 1), CallKey::new("g", 1));
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            failures: 0,
            entries: 1,
        };
        assert_eq!(stats.hit_rate(), 75.0);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
