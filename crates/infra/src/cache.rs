//! Read-through TTL cache for cheap, non-authoritative reads.
//!
//! One instance is constructed at process start and handed to consumers by
//! reference; there is no module-level global. Two locks split the work: a
//! brief `std::sync::Mutex` guards the key map, and a per-key async mutex
//! serializes recomputation, so a miss computes its value exactly once while
//! other keys stay untouched.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct Slot<V> {
    value: tokio::sync::Mutex<Option<(V, Instant)>>,
}

impl<V> Slot<V> {
    fn empty() -> Self {
        Self {
            value: tokio::sync::Mutex::new(None),
        }
    }
}

/// Cache mapping keys to values with a fetch-timestamp TTL.
pub struct ReadThroughCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, Arc<Slot<V>>>>,
}

impl<K, V> ReadThroughCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached value for `key`, or compute and store it.
    ///
    /// At most one concurrent recomputation runs per key: a second caller for
    /// the same key waits on the slot and then reads the freshly stored value
    /// instead of computing again. Compute errors are not cached.
    pub async fn get_or_compute<F, Fut, E>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = {
            let mut entries = self.entries.lock().expect("cache lock poisoned");
            entries
                .entry(key)
                .or_insert_with(|| Arc::new(Slot::empty()))
                .clone()
        };

        let mut guard = slot.value.lock().await;
        if let Some((value, fetched_at)) = guard.as_ref() {
            if fetched_at.elapsed() < self.ttl {
                return Ok(value.clone());
            }
        }

        let value = compute().await?;
        *guard = Some((value.clone(), Instant::now()));
        Ok(value)
    }

    /// Drop the cached value for `key`, forcing the next read to recompute.
    pub fn invalidate(&self, key: &K) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.remove(key);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn second_read_within_ttl_hits_the_cache() {
        let cache: ReadThroughCache<&str, u64> = ReadThroughCache::new(Duration::from_secs(60));
        let computes = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Result<u64, ()> = cache
                .get_or_compute("stats", || async {
                    computes.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await;
            assert_eq!(value.unwrap(), 42);
        }

        assert_eq!(computes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_is_recomputed() {
        let cache: ReadThroughCache<&str, u64> =
            ReadThroughCache::new(Duration::from_millis(10));
        let computes = AtomicUsize::new(0);

        let read = || async {
            let _: Result<u64, ()> = cache
                .get_or_compute("stats", || async {
                    computes.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                })
                .await;
        };

        read().await;
        tokio::time::sleep(Duration::from_millis(25)).await;
        read().await;

        assert_eq!(computes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_compute_once() {
        let cache: Arc<ReadThroughCache<&'static str, u64>> =
            Arc::new(ReadThroughCache::new(Duration::from_secs(60)));
        let computes = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let computes = computes.clone();
            handles.push(tokio::spawn(async move {
                let value: Result<u64, ()> = cache
                    .get_or_compute("stats", || async {
                        computes.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(7)
                    })
                    .await;
                value.unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 7);
        }
        assert_eq!(computes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache: ReadThroughCache<&str, u64> = ReadThroughCache::new(Duration::from_secs(60));

        let failed: Result<u64, &str> = cache.get_or_compute("stats", || async { Err("down") }).await;
        assert!(failed.is_err());

        let ok: Result<u64, &str> = cache.get_or_compute("stats", || async { Ok(9) }).await;
        assert_eq!(ok.unwrap(), 9);
    }
}
