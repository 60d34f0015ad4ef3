use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;

use crate::error::Result;
use crate::ports::cache::KeyValueCache;

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// In-process LRU cache with per-entry TTL. Stands in for Redis in
/// development and tests.
pub struct MemoryCache {
    inner: RwLock<LruCache<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or_else(|| {
            tracing::warn!("Cache max_entries was 0, defaulting to 100");
            NonZeroUsize::new(100).unwrap()
        });
        Self {
            inner: RwLock::new(LruCache::new(cap)),
        }
    }

    fn get_sync(&self, key: &str) -> Option<String> {
        let mut cache = self.inner.write().map_or_else(
            |_| {
                tracing::error!("Cache lock poisoned on get('{key}'), returning miss");
                None
            },
            Some,
        )?;
        let entry = cache.get(key)?;
        if Instant::now() > entry.expires_at {
            cache.pop(key);
            return None;
        }
        Some(entry.value.clone())
    }

    fn set_sync(&self, key: &str, value: &str, ttl: Duration) {
        if let Ok(mut cache) = self.inner.write() {
            cache.put(
                key.to_string(),
                CacheEntry {
                    value: value.to_string(),
                    expires_at: Instant::now() + ttl,
                },
            );
        } else {
            tracing::error!("Cache lock poisoned on set('{key}'), skipping write");
        }
    }
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get_sync(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.set_sync(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if let Ok(mut cache) = self.inner.write() {
            cache.pop(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_none_for_missing_key() {
        let cache = MemoryCache::new(10);
        assert!(cache.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_then_get_returns_value() {
        let cache = MemoryCache::new(10);
        cache
            .set("key1", "value1", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("key1").await.unwrap(), Some("value1".to_string()));
    }

    #[tokio::test]
    async fn expired_entry_returns_none() {
        let cache = MemoryCache::new(10);
        cache
            .set("key1", "value1", Duration::from_millis(0))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(cache.get("key1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cache_eviction_at_capacity() {
        let cache = MemoryCache::new(2);
        cache.set("a", "1", Duration::from_secs(60)).await.unwrap();
        cache.set("b", "2", Duration::from_secs(60)).await.unwrap();
        cache.set("c", "3", Duration::from_secs(60)).await.unwrap();
        // "a" evicted (LRU)
        assert!(cache.get("a").await.unwrap().is_none());
        assert_eq!(cache.get("b").await.unwrap(), Some("2".to_string()));
        assert_eq!(cache.get("c").await.unwrap(), Some("3".to_string()));
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = MemoryCache::new(10);
        cache.set("key", "v", Duration::from_secs(60)).await.unwrap();
        cache.delete("key").await.unwrap();
        assert!(cache.get("key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cache_zero_capacity_fallback() {
        // max_entries=0 falls back to 100, does not panic
        let cache = MemoryCache::new(0);
        cache.set("key", "value", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("key").await.unwrap(), Some("value".to_string()));
    }

    #[tokio::test]
    async fn cache_overwrite_key() {
        let cache = MemoryCache::new(10);
        cache
            .set("key", "old_value", Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .set("key", "new_value", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            cache.get("key").await.unwrap(),
            Some("new_value".to_string())
        );
    }
}
