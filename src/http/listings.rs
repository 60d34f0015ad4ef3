use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::listing::Listing;
use crate::error::Error;
use crate::http::{ApiError, AppState};
use crate::ports::listing_store::ListingQuery;

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;
const SIMILAR_K: usize = 3;

#[derive(Debug, Default, Deserialize)]
pub struct ListingsParams {
    #[serde(default)]
    pub listing_type: Option<crate::domain::listing::ListingType>,
    #[serde(default)]
    pub property_type: Option<crate::domain::listing::PropertyType>,
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
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ListingsParams {
    fn query(&self) -> ListingQuery {
        ListingQuery {
            listing_type: self.listing_type,
            property_type: self.property_type,
            city: self.city.clone(),
            price_min: self.price_min,
            price_max: self.price_max,
            rooms_min: self.rooms_min,
            rooms_max: self.rooms_max,
            has_parking: self.has_parking,
            has_balcony: self.has_balcony,
            is_furnished: self.is_furnished,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListingsResponse {
    pub listings: Vec<Listing>,
    pub page: usize,
    pub limit: usize,
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListingsParams>,
) -> Result<Json<ListingsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let page = params.page.unwrap_or(1).max(1);
    let offset = (page - 1) * limit;

    let listings = state.store.list(&params.query(), limit, offset).await?;
    Ok(Json(ListingsResponse {
        listings,
        page,
        limit,
    }))
}

#[derive(Debug, Serialize)]
pub struct SimilarListing {
    pub listing: Listing,
    pub similarity: f64,
}

#[derive(Debug, Serialize)]
pub struct ListingDetailResponse {
    pub listing: Listing,
    pub similar: Vec<SimilarListing>,
    pub saved: bool,
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ListingDetailResponse>, ApiError> {
    let listing = state
        .store
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::ListingNotFound { id: id.to_string() })?;

    // Listings without embeddings simply have no neighbours yet.
    let similar = match state.search.find_similar(id, SIMILAR_K).await {
        Ok(candidates) => candidates
            .into_iter()
            .map(|c| SimilarListing {
                listing: c.listing,
                similarity: c.similarity,
            })
            .collect(),
        Err(_) => Vec::new(),
    };

    Ok(Json(ListingDetailResponse {
        listing,
        similar,
        // Saved-items live in an external service; the flag is surfaced for
        // the UI contract.
        saved: false,
    }))
}
