use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::{JobType, ScrapeJob, TriggeredBy};
use crate::domain::listing::{ListingType, PropertyType};
use crate::http::{ApiError, AppState};
use crate::jobs::queue::{JobCounts, QueuedJob};
use crate::jobs::scheduler::ScheduleInfo;

const RECENT_JOBS: usize = 10;

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let expected = state.admin_token.as_deref().filter(|t| !t.is_empty());
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match (expected, provided) {
        (Some(expected), Some(provided)) if expected == provided => Ok(()),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "UNAUTHORIZED"})),
        )
            .into_response()),
    }
}

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, rename = "listingType")]
    pub listing_type: Option<ListingType>,
    #[serde(default, rename = "propertyType")]
    pub property_type: Option<PropertyType>,
    #[serde(default, rename = "maxPages")]
    pub max_pages: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub job_id: Uuid,
    pub status: &'static str,
}

pub async fn trigger(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TriggerRequest>,
) -> Result<Json<TriggerResponse>, Response> {
    authorize(&state, &headers)?;

    let mut job = ScrapeJob::new(request.job_type, TriggeredBy::Manual);
    job.source = request.source;
    job.listing_type = request.listing_type;
    job.property_type = request.property_type;
    job.max_pages = request.max_pages;

    let job_id = state
        .queue
        .add(job)
        .map_err(|e| ApiError(e).into_response())?;
    Ok(Json(TriggerResponse {
        job_id,
        status: "queued",
    }))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub counts: JobCounts,
    pub schedules: Vec<ScheduleInfo>,
    pub recent_jobs: Vec<QueuedJob>,
}

pub async fn status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, Response> {
    authorize(&state, &headers)?;

    Ok(Json(StatusResponse {
        counts: state.queue.counts(),
        schedules: state.scheduler.schedules(),
        recent_jobs: state.queue.recent(RECENT_JOBS),
    }))
}
