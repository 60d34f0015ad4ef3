use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::listing::Listing;
use crate::error::Result;
use crate::ports::listing_store::{ListingQuery, ListingStore, ScoredListing, UpsertOutcome};

/// In-memory listing store with brute-force cosine search. Development mode
/// and test double for the Qdrant adapter.
#[derive(Default)]
pub struct MemoryListingStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    listings: HashMap<Uuid, Listing>,
    /// Unique index enforcing one row per `(source, external_id)`.
    by_external: HashMap<(String, String), Uuid>,
}

impl MemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.listings.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

fn matches_query(listing: &Listing, query: &ListingQuery) -> bool {
    if let Some(lt) = query.listing_type
        && listing.listing_type != lt
    {
        return false;
    }
    if let Some(pt) = query.property_type
        && listing.property_type != pt
    {
        return false;
    }
    if let Some(ref city) = query.city
        && !listing.city.eq_ignore_ascii_case(city)
    {
        return false;
    }
    if let Some(min) = query.price_min
        && listing.price < min
    {
        return false;
    }
    if let Some(max) = query.price_max
        && listing.price > max
    {
        return false;
    }
    if let Some(min) = query.rooms_min
        && listing.rooms.is_some_and(|r| r < min)
    {
        return false;
    }
    if let Some(max) = query.rooms_max
        && listing.rooms.is_some_and(|r| r > max)
    {
        return false;
    }
    if let Some(parking) = query.has_parking
        && listing.amenities.has_parking != parking
    {
        return false;
    }
    if let Some(balcony) = query.has_balcony
        && listing.amenities.has_balcony != balcony
    {
        return false;
    }
    if let Some(furnished) = query.is_furnished
        && listing.amenities.is_furnished != furnished
    {
        return false;
    }
    true
}

#[async_trait]
impl ListingStore for MemoryListingStore {
    async fn insert(&self, listing: Listing) -> Result<UpsertOutcome> {
        let mut inner = self.inner.write().await;
        let key = (listing.source.clone(), listing.external_id.clone());

        if let Some(existing_id) = inner.by_external.get(&key).copied() {
            // Conflict is a refresh, not an error: mutable fields follow the
            // latest scrape, identity and created_at stay.
            if let Some(existing) = inner.listings.get_mut(&existing_id) {
                existing.title = listing.title;
                existing.description = listing.description;
                existing.images = listing.images;
                existing.price = listing.price;
                existing.amenities = listing.amenities;
                existing.scraped_at = listing.scraped_at;
                existing.updated_at = Utc::now();
                return Ok(UpsertOutcome::Duplicate(existing.clone()));
            }
        }

        inner.by_external.insert(key, listing.id);
        inner.listings.insert(listing.id, listing.clone());
        Ok(UpsertOutcome::Inserted(listing))
    }

    async fn batch_insert(&self, listings: Vec<Listing>) -> Result<u64> {
        let mut inserted = 0;
        for listing in listings {
            if matches!(self.insert(listing).await?, UpsertOutcome::Inserted(_)) {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Listing>> {
        Ok(self.inner.read().await.listings.get(&id).cloned())
    }

    async fn list(
        &self,
        query: &ListingQuery,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Listing>> {
        let inner = self.inner.read().await;
        let mut matched: Vec<Listing> = inner
            .listings
            .values()
            .filter(|l| matches_query(l, query))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.scraped_at.cmp(&a.scraped_at));
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }

    async fn search_semantic(
        &self,
        embedding: &[f32],
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<ScoredListing>> {
        let inner = self.inner.read().await;
        let mut scored: Vec<ScoredListing> = inner
            .listings
            .values()
            .filter_map(|l| {
                let vector = l.embedding.as_ref()?;
                let similarity = cosine_similarity(vector, embedding);
                (similarity >= threshold).then(|| ScoredListing {
                    listing: l.clone(),
                    similarity,
                })
            })
            .collect();
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn update_embedding(&self, id: Uuid, embedding: &[f32]) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(listing) = inner.listings.get_mut(&id) {
            listing.embedding = Some(embedding.to_vec());
        }
        Ok(())
    }

    async fn list_missing_embeddings(&self, limit: usize) -> Result<Vec<Listing>> {
        let inner = self.inner.read().await;
        let mut missing: Vec<Listing> = inner
            .listings
            .values()
            .filter(|l| l.embedding.is_none())
            .cloned()
            .collect();
        missing.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        missing.truncate(limit);
        Ok(missing)
    }

    async fn cleanup_stale(&self, days: u32) -> Result<u64> {
        let cutoff = Utc::now() - ChronoDuration::days(i64::from(days));
        let mut inner = self.inner.write().await;
        let stale: Vec<Uuid> = inner
            .listings
            .values()
            .filter(|l| l.updated_at < cutoff)
            .map(|l| l.id)
            .collect();
        for id in &stale {
            if let Some(listing) = inner.listings.remove(id) {
                inner
                    .by_external
                    .remove(&(listing.source, listing.external_id));
            }
        }
        Ok(stale.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::listing::{Amenities, ListingType, PropertyType};

    fn listing(source: &str, external_id: &str, price: i64) -> Listing {
        let now = Utc::now();
        Listing {
            id: Uuid::new_v4(),
            source: source.into(),
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
            embedding: None,
            scraped_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn insert_then_get() {
        let store = MemoryListingStore::new();
        let l = listing("njuskalo", "100", 600);
        let id = l.id;
        let outcome = store.insert(l).await.unwrap();
        assert!(matches!(outcome, UpsertOutcome::Inserted(_)));
        assert!(store.get_by_id(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn conflict_counts_duplicate_and_refreshes() {
        let store = MemoryListingStore::new();
        store.insert(listing("njuskalo", "100", 600)).await.unwrap();

        let mut updated = listing("njuskalo", "100", 650);
        updated.description = "novi opis".into();
        let outcome = store.insert(updated).await.unwrap();
        assert!(outcome.is_duplicate());

        let UpsertOutcome::Duplicate(stored) = outcome else {
            unreachable!()
        };
        assert_eq!(stored.price, 650);
        assert_eq!(stored.description, "novi opis");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn same_external_id_different_source_is_distinct() {
        let store = MemoryListingStore::new();
        store.insert(listing("njuskalo", "100", 600)).await.unwrap();
        store
            .insert(listing("index-oglasi", "100", 700))
            .await
            .unwrap();
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn batch_insert_counts_only_new() {
        let store = MemoryListingStore::new();
        store.insert(listing("njuskalo", "1", 500)).await.unwrap();
        let inserted = store
            .batch_insert(vec![
                listing("njuskalo", "1", 500),
                listing("njuskalo", "2", 550),
                listing("njuskalo", "3", 620),
            ])
            .await
            .unwrap();
        assert_eq!(inserted, 2);
    }

    #[tokio::test]
    async fn list_filters_and_orders_by_scraped_at_desc() {
        let store = MemoryListingStore::new();
        let mut old = listing("njuskalo", "1", 500);
        old.scraped_at = Utc::now() - ChronoDuration::hours(5);
        store.insert(old).await.unwrap();
        store.insert(listing("njuskalo", "2", 900)).await.unwrap();

        let query = ListingQuery::default();
        let all = store.list(&query, 10, 0).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].external_id, "2");

        let query = ListingQuery {
            price_max: Some(600),
            ..Default::default()
        };
        let cheap = store.list(&query, 10, 0).await.unwrap();
        assert_eq!(cheap.len(), 1);
        assert_eq!(cheap[0].external_id, "1");
    }

    #[tokio::test]
    async fn semantic_search_orders_by_similarity() {
        let store = MemoryListingStore::new();
        let mut a = listing("njuskalo", "1", 500);
        a.embedding = Some(vec![1.0, 0.0, 0.0]);
        let mut b = listing("njuskalo", "2", 500);
        b.embedding = Some(vec![0.7, 0.7, 0.0]);
        let mut c = listing("njuskalo", "3", 500);
        c.embedding = Some(vec![0.0, 1.0, 0.0]);
        store.insert(a).await.unwrap();
        store.insert(b).await.unwrap();
        store.insert(c).await.unwrap();

        let results = store
            .search_semantic(&[1.0, 0.0, 0.0], 0.1, 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 2); // orthogonal vector fell below threshold
        assert_eq!(results[0].listing.external_id, "1");
        assert!(results[0].similarity > results[1].similarity);
        for r in &results {
            assert!((0.0..=1.0).contains(&r.similarity));
        }
    }

    #[tokio::test]
    async fn listings_without_embedding_skipped_in_search() {
        let store = MemoryListingStore::new();
        store.insert(listing("njuskalo", "1", 500)).await.unwrap();
        let results = store
            .search_semantic(&[1.0, 0.0, 0.0], 0.0, 10)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn update_embedding_and_list_missing() {
        let store = MemoryListingStore::new();
        let l = listing("njuskalo", "1", 500);
        let id = l.id;
        store.insert(l).await.unwrap();
        store.insert(listing("njuskalo", "2", 600)).await.unwrap();

        assert_eq!(store.list_missing_embeddings(10).await.unwrap().len(), 2);
        store.update_embedding(id, &[0.1, 0.2]).await.unwrap();
        let missing = store.list_missing_embeddings(10).await.unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].external_id, "2");
    }

    #[tokio::test]
    async fn cleanup_removes_stale_rows_and_index() {
        let store = MemoryListingStore::new();
        let mut stale = listing("njuskalo", "1", 500);
        stale.updated_at = Utc::now() - ChronoDuration::days(40);
        store.insert(stale).await.unwrap();
        store.insert(listing("njuskalo", "2", 600)).await.unwrap();

        let removed = store.cleanup_stale(30).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len().await, 1);
        // The index slot is free again
        let outcome = store.insert(listing("njuskalo", "1", 500)).await.unwrap();
        assert!(matches!(outcome, UpsertOutcome::Inserted(_)));
    }
}
