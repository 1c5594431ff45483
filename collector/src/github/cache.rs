//! In-memory LRU response cache with TTL

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::metrics;

struct Entry<V> {
    value: V,
    expires_at: Instant,
    /// Key into `Inner::recency`
    used: u64,
}

struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    /// Use counter -> key, oldest first
    recency: BTreeMap<u64, String>,
    clock: u64,
}

/// Bounded cache keyed by request URL. Entries expire `ttl` after insertion;
/// when full, the least recently used entry is evicted.
pub struct ApiCache<V> {
    capacity: usize,
    ttl: Duration,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> ApiCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                clock: 0,
            }),
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        inner.clock += 1;
        let tick = inner.clock;

        let Inner {
            entries, recency, ..
        } = &mut *inner;
        let fresh = entries.get(key).map(|entry| entry.expires_at > now);
        let hit = match fresh {
            Some(true) => entries.get_mut(key).map(|entry| {
                recency.remove(&entry.used);
                entry.used = tick;
                recency.insert(tick, key.to_string());
                entry.value.clone()
            }),
            Some(false) => {
                if let Some(expired) = entries.remove(key) {
                    recency.remove(&expired.used);
                }
                None
            }
            None => None,
        };

        let result = if hit.is_some() { "hit" } else { "miss" };
        metrics::CACHE_LOOKUPS.with_label_values(&[result]).inc();
        hit
    }

    pub async fn insert(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let mut inner = self.inner.lock().await;
        inner.clock += 1;
        let tick = inner.clock;

        let Inner {
            entries, recency, ..
        } = &mut *inner;
        if let Some(previous) = entries.remove(&key) {
            recency.remove(&previous.used);
        }
        while entries.len() >= self.capacity {
            let Some((_, oldest)) = recency.pop_first() else {
                break;
            };
            entries.remove(&oldest);
        }
        recency.insert(tick, key.clone());
        entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
                used: tick,
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = ApiCache::new(10, Duration::from_secs(900));
        cache.insert("a", 1).await;
        assert_eq!(cache.get("a").await, Some(1));

        tokio::time::advance(Duration::from_secs(899)).await;
        assert_eq!(cache.get("a").await, Some(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_least_recently_used_is_evicted() {
        let cache = ApiCache::new(2, Duration::from_secs(60));
        cache.insert("a", 1).await;
        cache.insert("b", 2).await;
        // touch "a" so "b" becomes the oldest
        assert_eq!(cache.get("a").await, Some(1));
        cache.insert("c", 3).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("b").await, None);
        assert_eq!(cache.get("a").await, Some(1));
        assert_eq!(cache.get("c").await, Some(3));
    }

    #[tokio::test]
    async fn test_reinsert_replaces_value() {
        let cache = ApiCache::new(2, Duration::from_secs(60));
        cache.insert("a", 1).await;
        cache.insert("a", 2).await;
        cache.insert("b", 3).await;
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("a").await, Some(2));
    }
}
