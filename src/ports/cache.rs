use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// TTL'd key-value cache used for sessions, embeddings, search results and
/// scrape status. Backed by Redis in deployments and by the in-process LRU
/// cache otherwise.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}
