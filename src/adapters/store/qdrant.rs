use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, GetPointsBuilder,
    PointId, PointStruct, PointsIdsList, QueryPointsBuilder, Range, ScrollPointsBuilder,
    UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::config::types::StoreConfig;
use crate::domain::listing::Listing;
use crate::error::{Error, Result};
use crate::ports::listing_store::{ListingQuery, ListingStore, ScoredListing, UpsertOutcome};

/// Cap for client-side sorted scans (list, cleanup sweeps). The store is a
/// per-country listing corpus, not an unbounded table.
const SCAN_LIMIT: u32 = 4096;

/// Qdrant-backed listing store. The full listing travels as a JSON payload
/// field; scalar copies of the filterable fields sit alongside it for
/// server-side conditions.
pub struct QdrantListingStore {
    client: Qdrant,
    collection: String,
    dims: usize,
}

impl QdrantListingStore {
    pub async fn connect(config: &StoreConfig, dims: usize) -> Result<Self> {
        let url = config
            .qdrant_url
            .as_ref()
            .ok_or_else(|| Error::Config("qdrant url not configured".into()))?;

        let mut builder = Qdrant::from_url(url).timeout(std::time::Duration::from_secs(10));
        if let Some(ref key) = config.qdrant_api_key {
            builder = builder.api_key(key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| Error::Store(format!("qdrant client: {e}")))?;

        let store = Self {
            client,
            collection: config.collection.clone(),
            dims,
        };
        store.ensure_collection().await?;
        Ok(store)
    }

    async fn ensure_collection(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| Error::Store(format!("qdrant collection check: {e}")))?;
        if !exists {
            info!("Creating Qdrant collection: {}", self.collection);
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection).vectors_config(
                        VectorParamsBuilder::new(self.dims as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| Error::Store(format!("qdrant create collection: {e}")))?;
        }
        Ok(())
    }

    fn point_for(&self, listing: &Listing) -> Result<PointStruct> {
        let vector = listing
            .embedding
            .clone()
            .unwrap_or_else(|| vec![0.0; self.dims]);
        let payload = listing_payload(listing)?;
        Ok(PointStruct::new(
            listing.id.to_string(),
            vector,
            payload,
        ))
    }

    async fn find_by_external(&self, source: &str, external_id: &str) -> Result<Option<Listing>> {
        let filter = Filter::must([
            Condition::matches("source", source.to_string()),
            Condition::matches("external_id", external_id.to_string()),
        ]);
        let response = self
            .client
            .scroll(
                ScrollPointsBuilder::new(&self.collection)
                    .filter(filter)
                    .limit(1)
                    .with_payload(true),
            )
            .await
            .map_err(|e| Error::Store(format!("qdrant scroll: {e}")))?;
        match response.result.first() {
            Some(point) => Ok(Some(listing_from_payload(&point.payload)?)),
            None => Ok(None),
        }
    }

    async fn scan(&self, filter: Option<Filter>) -> Result<Vec<Listing>> {
        let mut builder = ScrollPointsBuilder::new(&self.collection)
            .limit(SCAN_LIMIT)
            .with_payload(true);
        if let Some(filter) = filter {
            builder = builder.filter(filter);
        }
        let response = self
            .client
            .scroll(builder)
            .await
            .map_err(|e| Error::Store(format!("qdrant scroll: {e}")))?;
        response
            .result
            .iter()
            .map(|point| listing_from_payload(&point.payload))
            .collect()
    }

    async fn upsert(&self, listing: &Listing) -> Result<()> {
        let point = self.point_for(listing)?;
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]))
            .await
            .map_err(|e| Error::Store(format!("qdrant upsert: {e}")))?;
        Ok(())
    }
}

fn listing_payload(listing: &Listing) -> Result<Payload> {
    let data = serde_json::to_string(listing)?;
    let value = json!({
        "data": data,
        "source": listing.source,
        "external_id": listing.external_id,
        "city": listing.city,
        "listing_type": listing.listing_type.as_str(),
        "property_type": listing.property_type.as_str(),
        "price": listing.price,
        "scraped_at": listing.scraped_at.timestamp(),
        "updated_at": listing.updated_at.timestamp(),
        "has_embedding": listing.embedding.is_some(),
    });
    Payload::try_from(value).map_err(|e| Error::Store(format!("qdrant payload: {e}")))
}

fn payload_str(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.clone()),
        _ => None,
    }
}

fn listing_from_payload(payload: &HashMap<String, Value>) -> Result<Listing> {
    let data = payload_str(payload, "data")
        .ok_or_else(|| Error::Store("point payload missing 'data'".into()))?;
    Ok(serde_json::from_str(&data)?)
}

fn query_filter(query: &ListingQuery) -> Option<Filter> {
    let mut conditions = Vec::new();
    if let Some(lt) = query.listing_type {
        conditions.push(Condition::matches("listing_type", lt.as_str().to_string()));
    }
    if let Some(pt) = query.property_type {
        conditions.push(Condition::matches(
            "property_type",
            pt.as_str().to_string(),
        ));
    }
    if let Some(ref city) = query.city {
        conditions.push(Condition::matches("city", city.clone()));
    }
    if query.price_min.is_some() || query.price_max.is_some() {
        conditions.push(Condition::range(
            "price",
            Range {
                gte: query.price_min.map(|p| p as f64),
                lte: query.price_max.map(|p| p as f64),
                ..Default::default()
            },
        ));
    }
    if conditions.is_empty() {
        None
    } else {
        Some(Filter::must(conditions))
    }
}

#[async_trait]
impl ListingStore for QdrantListingStore {
    async fn insert(&self, listing: Listing) -> Result<UpsertOutcome> {
        if let Some(existing) = self
            .find_by_external(&listing.source, &listing.external_id)
            .await?
        {
            // Refresh the stored row in place, keep identity and created_at.
            let mut refreshed = existing;
            refreshed.title = listing.title;
            refreshed.description = listing.description;
            refreshed.images = listing.images;
            refreshed.price = listing.price;
            refreshed.amenities = listing.amenities;
            refreshed.scraped_at = listing.scraped_at;
            refreshed.updated_at = Utc::now();
            self.upsert(&refreshed).await?;
            return Ok(UpsertOutcome::Duplicate(refreshed));
        }

        self.upsert(&listing).await?;
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
        let response = self
            .client
            .get_points(
                GetPointsBuilder::new(
                    &self.collection,
                    vec![PointId::from(id.to_string())],
                )
                .with_payload(true),
            )
            .await
            .map_err(|e| Error::Store(format!("qdrant get: {e}")))?;
        match response.result.first() {
            Some(point) => Ok(Some(listing_from_payload(&point.payload)?)),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        query: &ListingQuery,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Listing>> {
        let mut listings = self.scan(query_filter(query)).await?;
        // rooms/amenity conditions have no payload copies; apply client-side
        listings.retain(|l| {
            query.rooms_min.is_none_or(|min| l.rooms.is_none_or(|r| r >= min))
                && query.rooms_max.is_none_or(|max| l.rooms.is_none_or(|r| r <= max))
                && query
                    .has_parking
                    .is_none_or(|want| l.amenities.has_parking == want)
                && query
                    .has_balcony
                    .is_none_or(|want| l.amenities.has_balcony == want)
                && query
                    .is_furnished
                    .is_none_or(|want| l.amenities.is_furnished == want)
        });
        listings.sort_by(|a, b| b.scraped_at.cmp(&a.scraped_at));
        Ok(listings.into_iter().skip(offset).take(limit).collect())
    }

    async fn search_semantic(
        &self,
        embedding: &[f32],
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<ScoredListing>> {
        let request = QueryPointsBuilder::new(&self.collection)
            .query(embedding.to_vec())
            .filter(Filter::must([Condition::matches("has_embedding", true)]))
            .score_threshold(threshold as f32)
            .limit(limit as u64)
            .with_payload(true);

        let response = self
            .client
            .query(request)
            .await
            .map_err(|e| Error::Store(format!("qdrant query: {e}")))?;

        response
            .result
            .iter()
            .map(|point| {
                let listing = listing_from_payload(&point.payload)?;
                Ok(ScoredListing {
                    listing,
                    similarity: f64::from(point.score).clamp(0.0, 1.0),
                })
            })
            .collect()
    }

    async fn update_embedding(&self, id: Uuid, embedding: &[f32]) -> Result<()> {
        let Some(mut listing) = self.get_by_id(id).await? else {
            return Err(Error::ListingNotFound { id: id.to_string() });
        };
        listing.embedding = Some(embedding.to_vec());
        self.upsert(&listing).await
    }

    async fn list_missing_embeddings(&self, limit: usize) -> Result<Vec<Listing>> {
        let filter = Filter::must([Condition::matches("has_embedding", false)]);
        let mut listings = self.scan(Some(filter)).await?;
        listings.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        listings.truncate(limit);
        Ok(listings)
    }

    async fn cleanup_stale(&self, days: u32) -> Result<u64> {
        let cutoff = (Utc::now() - ChronoDuration::days(i64::from(days))).timestamp();
        let filter = Filter::must([Condition::range(
            "updated_at",
            Range {
                lt: Some(cutoff as f64),
                ..Default::default()
            },
        )]);
        let stale = self.scan(Some(filter)).await?;
        if stale.is_empty() {
            return Ok(0);
        }
        let ids: Vec<PointId> = stale
            .iter()
            .map(|l| PointId::from(l.id.to_string()))
            .collect();
        let count = ids.len() as u64;
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(PointsIdsList { ids }),
            )
            .await
            .map_err(|e| Error::Store(format!("qdrant delete: {e}")))?;
        Ok(count)
    }
}
