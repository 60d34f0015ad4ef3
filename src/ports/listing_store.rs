use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::listing::{Listing, ListingType, PropertyType};
use crate::error::Result;

/// Filters for the non-semantic listing query path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingQuery {
    #[serde(default)]
    pub listing_type: Option<ListingType>,
    #[serde(default)]
    pub property_type: Option<PropertyType>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub price_min: Option<i64>,
    #[serde(default)]
    pub price_max: Option<i64>,
    #[serde(default)]
    pub rooms_min: Option<u32>,
    #[serde(default)]
    pub rooms_max: Option<u32>,
    #[serde(default)]
    pub has_parking: Option<bool>,
    #[serde(default)]
    pub has_balcony: Option<bool>,
    #[serde(default)]
    pub is_furnished: Option<bool>,
}

/// Insert outcome. A `(source, external_id)` conflict is not an error: the
/// stored row is refreshed (price, description, images, timestamps) and the
/// caller counts a duplicate.
#[derive(Debug, Clone)]
pub enum UpsertOutcome {
    Inserted(Listing),
    Duplicate(Listing),
}

impl UpsertOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// One semantic-search candidate.
#[derive(Debug, Clone)]
pub struct ScoredListing {
    pub listing: Listing,
    /// Cosine similarity mapped into [0, 1].
    pub similarity: f64,
}

/// The core's interface into the vector database.
#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn insert(&self, listing: Listing) -> Result<UpsertOutcome>;

    /// Insert many; returns how many were newly stored.
    async fn batch_insert(&self, listings: Vec<Listing>) -> Result<u64>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Listing>>;

    /// Filtered listing page, ordered by `scraped_at` descending.
    async fn list(&self, query: &ListingQuery, limit: usize, offset: usize)
    -> Result<Vec<Listing>>;

    /// Nearest-neighbour candidates above `threshold`, sorted by similarity
    /// descending. Callers over-fetch (3× the final result size) so ranking
    /// has room to drop mismatches.
    async fn search_semantic(
        &self,
        embedding: &[f32],
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<ScoredListing>>;

    async fn update_embedding(&self, id: Uuid, embedding: &[f32]) -> Result<()>;

    /// Listings that still need an embedding, oldest first.
    async fn list_missing_embeddings(&self, limit: usize) -> Result<Vec<Listing>>;

    /// Delete listings whose `updated_at` is older than the window. Returns
    /// the number removed.
    async fn cleanup_stale(&self, days: u32) -> Result<u64>;
}
