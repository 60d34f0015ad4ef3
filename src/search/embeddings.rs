use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::types::CacheConfig;
use crate::domain::listing::{Listing, ListingType};
use crate::error::{Error, Result};
use crate::ports::cache::KeyValueCache;
use crate::ports::llm::LanguageModel;

/// Provider batch endpoint chunk size.
const BATCH_CHUNK: usize = 100;
/// Pause between consecutive provider chunks.
const BATCH_CHUNK_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct QueryEmbedding {
    pub embedding: Vec<f32>,
    pub token_count: u32,
    pub cached: bool,
}

/// Outcome of one batch embedding pass.
#[derive(Debug, Default)]
pub struct BatchResult {
    /// Listing id → vector, cache hits included.
    pub embeddings: Vec<(Uuid, Vec<f32>)>,
    pub cached: u64,
    pub generated: u64,
    pub failed_ids: Vec<Uuid>,
}

/// Text→vector service with a two-tier TTL cache: query embeddings keyed by
/// content hash, listing embeddings keyed by listing id.
pub struct EmbeddingService {
    model: Arc<dyn LanguageModel>,
    cache: Arc<dyn KeyValueCache>,
    dims: usize,
    query_ttl: Duration,
    listing_ttl: Duration,
}

impl EmbeddingService {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        cache: Arc<dyn KeyValueCache>,
        cache_config: &CacheConfig,
        dims: usize,
    ) -> Self {
        Self {
            model,
            cache,
            dims,
            query_ttl: Duration::from_secs(cache_config.query_embedding_ttl_secs),
            listing_ttl: Duration::from_secs(cache_config.listing_embedding_ttl_secs),
        }
    }

    /// Lowercase and collapse whitespace so trivially different phrasings
    /// share a cache slot.
    pub fn normalize_text(text: &str) -> String {
        text.to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn query_cache_key(normalized: &str) -> String {
        format!("embedding:query:{:x}", md5::compute(normalized))
    }

    pub fn listing_cache_key(id: Uuid) -> String {
        format!("embedding:listing:{id}")
    }

    /// Embed a search query, cache-aside. Cache failures are logged and
    /// treated as misses.
    pub async fn generate_query(&self, text: &str) -> Result<QueryEmbedding> {
        let normalized = Self::normalize_text(text);
        let key = Self::query_cache_key(&normalized);

        match self.cache.get(&key).await {
            Ok(Some(cached)) => {
                if let Ok(vector) = serde_json::from_str::<Vec<f32>>(&cached) {
                    debug!("Query embedding cache hit");
                    return Ok(QueryEmbedding {
                        embedding: vector,
                        token_count: 0,
                        cached: true,
                    });
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Embedding cache read failed, treating as miss"),
        }

        let embedding = self.model.embed(&normalized).await?;
        self.check_dims(embedding.vector.len())?;

        if let Ok(json) = serde_json::to_string(&embedding.vector)
            && let Err(e) = self.cache.set(&key, &json, self.query_ttl).await
        {
            warn!(error = %e, "Embedding cache write failed");
        }

        Ok(QueryEmbedding {
            embedding: embedding.vector,
            token_count: embedding.token_count,
            cached: false,
        })
    }

    /// Embed listings in bulk: probe the cache first, ship only misses to
    /// the provider in chunks, fall back to per-item generation when a chunk
    /// fails, and collect ids that still failed.
    pub async fn batch_generate(&self, listings: &[Listing]) -> Result<BatchResult> {
        let mut result = BatchResult::default();
        let mut misses: Vec<&Listing> = Vec::new();

        for listing in listings {
            let key = Self::listing_cache_key(listing.id);
            match self.cache.get(&key).await {
                Ok(Some(cached)) => {
                    if let Ok(vector) = serde_json::from_str::<Vec<f32>>(&cached) {
                        result.cached += 1;
                        result.embeddings.push((listing.id, vector));
                        continue;
                    }
                    misses.push(listing);
                }
                Ok(None) => misses.push(listing),
                Err(e) => {
                    warn!(error = %e, "Embedding cache read failed, treating as miss");
                    misses.push(listing);
                }
            }
        }

        for (chunk_index, chunk) in misses.chunks(BATCH_CHUNK).enumerate() {
            if chunk_index > 0 {
                tokio::time::sleep(BATCH_CHUNK_DELAY).await;
            }
            let texts: Vec<String> = chunk.iter().map(|l| Self::listing_text(l)).collect();
            match self.model.embed_batch(&texts).await {
                Ok(vectors) => {
                    for (listing, vector) in chunk.iter().zip(vectors) {
                        if self.check_dims(vector.len()).is_err() {
                            result.failed_ids.push(listing.id);
                            continue;
                        }
                        self.cache_listing_vector(listing.id, &vector).await;
                        result.generated += 1;
                        result.embeddings.push((listing.id, vector));
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Batch embedding failed, falling back to per-item");
                    for listing in chunk {
                        match self.model.embed(&Self::listing_text(listing)).await {
                            Ok(embedding)
                                if self.check_dims(embedding.vector.len()).is_ok() =>
                            {
                                self.cache_listing_vector(listing.id, &embedding.vector).await;
                                result.generated += 1;
                                result.embeddings.push((listing.id, embedding.vector));
                            }
                            Ok(_) => result.failed_ids.push(listing.id),
                            Err(e) => {
                                warn!(listing = %listing.id, error = %e, "Listing embedding failed");
                                result.failed_ids.push(listing.id);
                            }
                        }
                    }
                }
            }
        }

        Ok(result)
    }

    async fn cache_listing_vector(&self, id: Uuid, vector: &[f32]) {
        let key = Self::listing_cache_key(id);
        if let Ok(json) = serde_json::to_string(vector)
            && let Err(e) = self.cache.set(&key, &json, self.listing_ttl).await
        {
            warn!(error = %e, "Embedding cache write failed");
        }
    }

    fn check_dims(&self, len: usize) -> Result<()> {
        if len == self.dims {
            Ok(())
        } else {
            Err(Error::InvalidParams {
                reason: format!(
                    "provider returned embedding of {len} dims, expected {}",
                    self.dims
                ),
            })
        }
    }

    /// Deterministic text blob a listing embeds under. Reproducible so that
    /// re-embedding an unchanged listing yields a cache hit upstream.
    pub fn listing_text(listing: &Listing) -> String {
        let mut text = format!(
            "{}. {} za {}.",
            listing.title,
            listing.property_type.croatian(),
            match listing.listing_type {
                ListingType::Rent => "najam",
                ListingType::Sale => "prodaju",
            }
        );

        if !listing.city.is_empty() {
            text.push_str(" Lokacija: ");
            text.push_str(&listing.city);
            if !listing.address.is_empty() {
                text.push_str(", ");
                text.push_str(&listing.address);
            }
            text.push('.');
        }

        let mut metrics = Vec::new();
        if let Some(rooms) = listing.rooms {
            metrics.push(format!("{rooms} sobe"));
        }
        if let Some(area) = listing.surface_area_m2 {
            metrics.push(format!("{area:.0}m²"));
        }
        metrics.push(format!("{}€", listing.price));
        text.push(' ');
        text.push_str(&metrics.join(", "));
        text.push('.');

        let present = listing.amenities.present();
        if !present.is_empty() {
            text.push_str(" Pogodnosti: ");
            text.push_str(&present.join(", "));
            text.push('.');
        }

        if !listing.description.is_empty() {
            text.push(' ');
            let truncated: String = listing.description.chars().take(500).collect();
            text.push_str(&truncated);
        }

        text
    }
}
