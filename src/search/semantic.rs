use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::types::SearchConfig;
use crate::domain::filters::ExtractedFilters;
use crate::error::{Error, Result, SearchCode};
use crate::normalize::location::canonical_city;
use crate::ports::listing_store::{ListingQuery, ListingStore, ScoredListing};
use crate::search::embeddings::EmbeddingService;
use crate::search::matcher::FilterMatcher;
use crate::search::ranking::{RankedListing, RankingService, RankingWeights};

/// Similarity assigned to fallback candidates that were never scored by the
/// vector index.
const FALLBACK_SIMILARITY: f64 = 0.5;
const FIND_SIMILAR_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub listings: Vec<RankedListing>,
    pub total_matches: u64,
    pub search_time_ms: u64,
    pub filters: ExtractedFilters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub fallback_used: bool,
}

/// End-to-end retrieval: embed → vector search → hard gate → rank, with a
/// silent filter-only fallback when the semantic path yields nothing.
pub struct SemanticSearch {
    embeddings: Arc<EmbeddingService>,
    store: Arc<dyn ListingStore>,
    matcher: FilterMatcher,
    ranking: RankingService,
    config: SearchConfig,
}

impl SemanticSearch {
    pub fn new(
        embeddings: Arc<EmbeddingService>,
        store: Arc<dyn ListingStore>,
        config: SearchConfig,
    ) -> Self {
        Self {
            embeddings,
            store,
            matcher: FilterMatcher::default(),
            ranking: RankingService::default(),
            config,
        }
    }

    fn weights(&self) -> RankingWeights {
        RankingWeights {
            semantic: self.config.semantic_weight,
            filter: self.config.filter_weight,
            recency: self.config.recency_weight,
            freshness: self.config.freshness_weight,
        }
    }

    pub async fn search(
        &self,
        query_text: &str,
        filters: &ExtractedFilters,
    ) -> Result<SearchOutcome> {
        let started = Instant::now();
        let max_results = self.config.max_results.max(1);

        // Semantic path; any failure becomes the fallback, not an error.
        let semantic = self.semantic_candidates(query_text, max_results).await;

        match semantic {
            Ok((candidates, embedding)) if !candidates.is_empty() => {
                let kept = self.matcher.filter_by_hard_requirements(
                    candidates.iter().map(|c| c.listing.clone()).collect(),
                    filters,
                );
                let kept_ids: std::collections::HashSet<Uuid> =
                    kept.iter().map(|l| l.id).collect();
                let gated: Vec<ScoredListing> = candidates
                    .into_iter()
                    .filter(|c| kept_ids.contains(&c.listing.id))
                    .collect();

                let total_matches = gated.len() as u64;
                let mut ranked = self.ranking.rank(gated, filters, &self.weights());
                ranked.truncate(max_results);

                Ok(SearchOutcome {
                    listings: ranked,
                    total_matches,
                    search_time_ms: started.elapsed().as_millis() as u64,
                    filters: filters.clone(),
                    embedding: Some(embedding),
                    fallback_used: false,
                })
            }
            Ok((_, embedding)) => {
                debug!("Semantic search returned no candidates, using fallback");
                let mut outcome = self.fallback(filters, max_results).await?;
                outcome.embedding = Some(embedding);
                outcome.search_time_ms = started.elapsed().as_millis() as u64;
                Ok(outcome)
            }
            Err(e) => {
                warn!(error = %e, "Semantic path failed, using fallback");
                let mut outcome = self.fallback(filters, max_results).await?;
                outcome.search_time_ms = started.elapsed().as_millis() as u64;
                Ok(outcome)
            }
        }
    }

    async fn semantic_candidates(
        &self,
        query_text: &str,
        max_results: usize,
    ) -> Result<(Vec<ScoredListing>, Vec<f32>)> {
        let query = self.embeddings.generate_query(query_text).await?;
        // Over-fetch so the hard gate and ranking have room to drop
        // mismatches.
        let candidates = self
            .store
            .search_semantic(
                &query.embedding,
                self.config.similarity_threshold,
                3 * max_results,
            )
            .await?;
        Ok((candidates, query.embedding))
    }

    /// Filter-only path: plain store listing with neutral similarity and
    /// filter-heavy weights, for this call only.
    async fn fallback(
        &self,
        filters: &ExtractedFilters,
        max_results: usize,
    ) -> Result<SearchOutcome> {
        let query = filters_to_query(filters);
        let listings = self
            .store
            .list(&query, 2 * max_results, 0)
            .await
            .map_err(|e| Error::Search {
                code: SearchCode::DatabaseError,
                message: e.to_string(),
            })?;

        let candidates: Vec<ScoredListing> = listings
            .into_iter()
            .map(|listing| ScoredListing {
                listing,
                similarity: FALLBACK_SIMILARITY,
            })
            .collect();

        let total_matches = candidates.len() as u64;
        let mut ranked = self
            .ranking
            .rank(candidates, filters, &RankingWeights::fallback());
        ranked.truncate(max_results);

        Ok(SearchOutcome {
            listings: ranked,
            total_matches,
            search_time_ms: 0,
            filters: filters.clone(),
            embedding: None,
            fallback_used: true,
        })
    }

    /// Nearest neighbours of an existing listing.
    pub async fn find_similar(&self, id: Uuid, k: usize) -> Result<Vec<ScoredListing>> {
        let listing = self
            .store
            .get_by_id(id)
            .await
            .map_err(|e| Error::Search {
                code: SearchCode::DatabaseError,
                message: e.to_string(),
            })?
            .ok_or_else(|| Error::ListingNotFound { id: id.to_string() })?;

        let Some(embedding) = listing.embedding else {
            return Err(Error::Search {
                code: SearchCode::NoEmbedding,
                message: format!("listing {id} has no embedding"),
            });
        };

        let mut candidates = self
            .store
            .search_semantic(&embedding, FIND_SIMILAR_THRESHOLD, k + 1)
            .await
            .map_err(|e| Error::Search {
                code: SearchCode::DatabaseError,
                message: e.to_string(),
            })?;
        candidates.retain(|c| c.listing.id != id);
        candidates.truncate(k);
        Ok(candidates)
    }
}

/// Map extracted filters onto the store's list-query shape.
pub fn filters_to_query(filters: &ExtractedFilters) -> ListingQuery {
    ListingQuery {
        listing_type: filters.listing_type,
        property_type: filters.property_type,
        city: filters
            .location
            .as_ref()
            .map(|l| canonical_city(l).unwrap_or_else(|| l.clone())),
        price_min: filters.price_min,
        price_max: filters.price_max,
        rooms_min: filters.rooms_min,
        rooms_max: filters.rooms_max,
        has_parking: filters.has_parking,
        has_balcony: filters.has_balcony,
        is_furnished: filters.is_furnished,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::cache::memory::MemoryCache;
    use crate::adapters::store::memory::MemoryListingStore;
    use crate::config::types::CacheConfig;
    use crate::domain::listing::{Amenities, Listing, ListingType, PropertyType};
    use crate::ports::llm::{Embedding, JsonCompletionRequest, LanguageModel};
    use async_trait::async_trait;
    use chrono::Utc;

    const DIMS: usize = 4;

    struct DirectionModel;

    #[async_trait]
    impl LanguageModel for DirectionModel {
        async fn embed(&self, text: &str) -> Result<Embedding> {
            // "stan" queries point one way, everything else another
            let vector = if text.contains("stan") {
                vec![1.0, 0.0, 0.0, 0.0]
            } else {
                vec![0.0, 1.0, 0.0, 0.0]
            };
            Ok(Embedding {
                vector,
                token_count: 3,
            })
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut out = Vec::new();
            for text in texts {
                out.push(self.embed(text).await?.vector);
            }
            Ok(out)
        }

        async fn complete_json(&self, _request: &JsonCompletionRequest) -> Result<String> {
            unimplemented!("not used")
        }
    }

    fn listing(external_id: &str, price: i64, embedding: Option<Vec<f32>>) -> Listing {
        let now = Utc::now();
        Listing {
            id: Uuid::new_v4(),
            source: "njuskalo".into(),
            external_id: external_id.into(),
            url: format!("https://example.com/oglas-{external_id}"),
            title: "Stan".into(),
            description: String::new(),
            images: vec![],
            price,
            currency: "EUR".into(),
            listing_type: ListingType::Rent,
            property_type: PropertyType::Apartment,
            city: "Zagreb".into(),
            address: String::new(),
            latitude: None,
            longitude: None,
            rooms: Some(2),
            bedrooms: None,
            bathrooms: None,
            surface_area_m2: None,
            amenities: Amenities::default(),
            embedding,
            scraped_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    async fn search_service(store: Arc<MemoryListingStore>) -> SemanticSearch {
        let embeddings = Arc::new(EmbeddingService::new(
            Arc::new(DirectionModel),
            Arc::new(MemoryCache::new(100)),
            &CacheConfig::default(),
            DIMS,
        ));
        SemanticSearch::new(
            embeddings,
            store,
            SearchConfig {
                max_results: 2,
                similarity_threshold: 0.3,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn semantic_path_ranks_and_truncates() {
        let store = Arc::new(MemoryListingStore::new());
        for i in 0..4 {
            store
                .insert(listing(
                    &format!("{i}"),
                    600,
                    Some(vec![1.0, 0.1 * i as f32, 0.0, 0.0]),
                ))
                .await
                .unwrap();
        }
        let service = search_service(Arc::clone(&store)).await;
        let outcome = service
            .search("stan u zagrebu", &ExtractedFilters::default())
            .await
            .unwrap();

        assert!(!outcome.fallback_used);
        assert_eq!(outcome.listings.len(), 2); // max_results
        assert!(outcome.total_matches >= outcome.listings.len() as u64);
        assert!(outcome.embedding.is_some());
        for window in outcome.listings.windows(2) {
            assert!(window[0].scores.combined >= window[1].scores.combined);
        }
    }

    #[tokio::test]
    async fn hard_gate_drops_over_budget_candidates() {
        let store = Arc::new(MemoryListingStore::new());
        store
            .insert(listing("cheap", 600, Some(vec![1.0, 0.0, 0.0, 0.0])))
            .await
            .unwrap();
        store
            .insert(listing("pricey", 900, Some(vec![1.0, 0.0, 0.0, 0.0])))
            .await
            .unwrap();

        let service = search_service(Arc::clone(&store)).await;
        let filters = ExtractedFilters {
            price_max: Some(700),
            ..Default::default()
        };
        let outcome = service.search("stan", &filters).await.unwrap();
        assert_eq!(outcome.listings.len(), 1);
        assert_eq!(outcome.listings[0].listing.external_id, "cheap");
    }

    #[tokio::test]
    async fn empty_semantic_results_trigger_fallback() {
        let store = Arc::new(MemoryListingStore::new());
        // No embeddings at all → vector search yields nothing
        store.insert(listing("1", 600, None)).await.unwrap();
        store.insert(listing("2", 650, None)).await.unwrap();

        let service = search_service(Arc::clone(&store)).await;
        let outcome = service
            .search("stan", &ExtractedFilters::default())
            .await
            .unwrap();

        assert!(outcome.fallback_used);
        assert_eq!(outcome.listings.len(), 2);
        for entry in &outcome.listings {
            assert!((entry.similarity - FALLBACK_SIMILARITY).abs() < 1e-9);
            // semantic weight is zeroed on the fallback path
            assert!(
                (entry.scores.combined
                    - (0.8 * entry.scores.filter_match
                        + 0.15 * entry.scores.recency
                        + 0.05 * entry.scores.freshness))
                    .abs()
                    < 1e-9
            );
        }
    }

    #[tokio::test]
    async fn fallback_applies_list_filters() {
        let store = Arc::new(MemoryListingStore::new());
        store.insert(listing("cheap", 500, None)).await.unwrap();
        store.insert(listing("pricey", 2000, None)).await.unwrap();

        let service = search_service(Arc::clone(&store)).await;
        let filters = ExtractedFilters {
            price_max: Some(700),
            ..Default::default()
        };
        let outcome = service.search("stan", &filters).await.unwrap();
        assert!(outcome.fallback_used);
        assert_eq!(outcome.listings.len(), 1);
        assert_eq!(outcome.listings[0].listing.external_id, "cheap");
    }

    #[tokio::test]
    async fn no_results_is_empty_not_error() {
        let store = Arc::new(MemoryListingStore::new());
        let service = search_service(Arc::clone(&store)).await;
        let outcome = service
            .search("stan", &ExtractedFilters::default())
            .await
            .unwrap();
        assert!(outcome.listings.is_empty());
        assert_eq!(outcome.total_matches, 0);
    }

    #[tokio::test]
    async fn find_similar_drops_the_base_listing() {
        let store = Arc::new(MemoryListingStore::new());
        let base = listing("base", 600, Some(vec![1.0, 0.0, 0.0, 0.0]));
        let base_id = base.id;
        store.insert(base).await.unwrap();
        store
            .insert(listing("near", 620, Some(vec![0.9, 0.1, 0.0, 0.0])))
            .await
            .unwrap();
        store
            .insert(listing("far", 640, Some(vec![0.0, 0.0, 1.0, 0.0])))
            .await
            .unwrap();

        let service = search_service(Arc::clone(&store)).await;
        let similar = service.find_similar(base_id, 3).await.unwrap();
        assert!(!similar.is_empty());
        assert!(similar.iter().all(|c| c.listing.id != base_id));
        assert_eq!(similar[0].listing.external_id, "near");
    }

    #[tokio::test]
    async fn find_similar_without_embedding_errors() {
        let store = Arc::new(MemoryListingStore::new());
        let bare = listing("bare", 600, None);
        let id = bare.id;
        store.insert(bare).await.unwrap();

        let service = search_service(Arc::clone(&store)).await;
        let err = service.find_similar(id, 3).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Search {
                code: SearchCode::NoEmbedding,
                ..
            }
        ));
    }

    #[test]
    fn filters_to_query_canonicalizes_city() {
        let filters = ExtractedFilters {
            location: Some("zagrebu".into()),
            price_max: Some(700),
            ..Default::default()
        };
        let query = filters_to_query(&filters);
        assert_eq!(query.city.as_deref(), Some("Zagreb"));
        assert_eq!(query.price_max, Some(700));
    }
}
