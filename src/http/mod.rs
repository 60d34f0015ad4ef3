pub mod admin;
pub mod chat;
pub mod listings;

use std::sync::Arc;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::chat::session::SessionManager;
use crate::error::{Error, ExtractionCode, SearchCode};
use crate::jobs::queue::JobQueue;
use crate::jobs::scheduler::Scheduler;
use crate::ports::cache::KeyValueCache;
use crate::ports::listing_store::ListingStore;
use crate::search::semantic::SemanticSearch;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub search: Arc<SemanticSearch>,
    pub store: Arc<dyn ListingStore>,
    pub queue: Arc<JobQueue>,
    pub scheduler: Arc<Scheduler>,
    pub cache: Arc<dyn KeyValueCache>,
    pub admin_token: Option<String>,
}

pub fn router(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat::handle))
        .route("/listings", get(listings::list))
        .route("/listings/{id}", get(listings::get_one))
        .route("/admin/scraping/trigger", post(admin::trigger))
        .route("/admin/scraping/status", get(admin::status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

/// HTTP-facing error wrapper. Maps the crate error taxonomy onto status
/// codes without leaking internals.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message): (StatusCode, &str, String) = match &self.0 {
            Error::InvalidParams { reason } => {
                (StatusCode::BAD_REQUEST, "INVALID_PARAMS", reason.clone())
            }
            Error::ListingNotFound { id } => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("listing {id} not found"),
            ),
            Error::RateLimited { .. }
            | Error::Extraction {
                code: ExtractionCode::RateLimited,
                ..
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Previše zahtjeva, pokušajte ponovno za koji trenutak.".into(),
            ),
            Error::Store(_)
            | Error::Search {
                code: SearchCode::DatabaseError,
                ..
            } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "DATABASE_ERROR",
                "Servis je trenutno nedostupan.".into(),
            ),
            Error::Search { code, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                code.as_str(),
                "Pretraga trenutno nije moguća.".into(),
            ),
            Error::Extraction { code, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                code.as_str(),
                "Obrada upita trenutno nije moguća.".into(),
            ),
            // Internals stay inside the boundary
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL",
                "Došlo je do pogreške.".into(),
            ),
        };
        tracing::debug!(status = %status, error = %self.0, "Request failed");
        (status, Json(json!({"error": code, "message": message}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: Error) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn invalid_params_is_400() {
        let status = status_of(Error::InvalidParams {
            reason: "query must not be empty".into(),
        });
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn rate_limits_are_429() {
        assert_eq!(
            status_of(Error::RateLimited {
                retry_after_secs: None
            }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_of(Error::Extraction {
                code: ExtractionCode::RateLimited,
                message: "429".into(),
                retryable: true,
            }),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn store_errors_are_503() {
        assert_eq!(
            status_of(Error::Store("qdrant down".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(Error::Search {
                code: SearchCode::DatabaseError,
                message: "down".into(),
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn not_found_is_404() {
        assert_eq!(
            status_of(Error::ListingNotFound { id: "x".into() }),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn internals_do_not_leak() {
        let response = ApiError(Error::Config("secret key abc123 missing".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
