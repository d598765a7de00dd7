use std::{future::Future, hash::Hash, sync::Arc};

use dashmap::DashMap;
use tokio::sync::OnceCell;

/// Memoizing cache allowing at most one in-flight fetch per key.
///
/// Concurrent callers of the same missing key wait for the first caller's
/// fetch. Failed fetches are not cached, the next caller retries.
pub struct SingleFlight<K, V> {
    cells: DashMap<K, Arc<OnceCell<V>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> SingleFlight<K, V> {
    pub fn new() -> Self {
        Self {
            cells: DashMap::new(),
        }
    }

    pub async fn get_or_try_fetch<E, F, Fut>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        // Map guard must be released before awaiting
        let cell = self.cells.entry(key).or_default().clone();
        cell.get_or_try_init(fetch).await.cloned()
    }

    /// Cached value, if already resolved.
    pub fn get(&self, key: &K) -> Option<V> {
        self.cells.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Number of resolved entries.
    pub fn len(&self) -> usize {
        self.cells.iter().filter(|cell| cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops entries not matching the predicate, including failed ones.
    pub fn retain(&self, mut keep: impl FnMut(&K) -> bool) {
        self.cells.retain(|key, _| keep(key));
    }

    pub fn clear(&self) {
        self.cells.clear();
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };

    use futures::future::join_all;

    use super::*;

    #[tokio::test]
    async fn test_concurrent_callers_share_fetch() {
        let cache = SingleFlight::<u64, u64>::new();
        let fetches = &AtomicU32::new(0);

        let results = join_all((0..5).map(|_| {
            cache.get_or_try_fetch(42, || async move {
                fetches.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, ()>(1000)
            })
        }))
        .await;

        assert!(results.iter().all(|r| *r == Ok(1000)));
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(&42), Some(1000));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache = SingleFlight::<u64, u64>::new();

        let failed = cache.get_or_try_fetch(1, || async { Err("boom") }).await;
        assert_eq!(failed, Err("boom"));
        assert_eq!(cache.get(&1), None);
        assert!(cache.is_empty());

        let ok = cache.get_or_try_fetch(1, || async { Ok::<_, &str>(5) }).await;
        assert_eq!(ok, Ok(5));

        // Resolved value wins over new fetches
        let cached = cache
            .get_or_try_fetch(1, || async { Ok::<_, &str>(6) })
            .await;
        assert_eq!(cached, Ok(5));
    }

    #[tokio::test]
    async fn test_retain() {
        let cache = SingleFlight::<u64, u64>::new();
        for key in 0..10 {
            cache
                .get_or_try_fetch(key, || async move { Ok::<_, ()>(key) })
                .await
                .unwrap();
        }
        cache.retain(|key| *key >= 5);
        assert_eq!(cache.len(), 5);
        assert_eq!(cache.get(&4), None);
        assert_eq!(cache.get(&5), Some(5));

        cache.clear();
        assert!(cache.is_empty());
    }
}
