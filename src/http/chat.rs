use axum::Json;
use axum::extract::State;
use serde::Deserialize;

use crate::chat::session::ChatResponse;
use crate::error::Error;
use crate::http::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

pub async fn handle(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError(Error::InvalidParams {
            reason: "query must not be empty".into(),
        }));
    }
    let response = state
        .sessions
        .handle_turn(request.session_id.as_deref(), &request.query)
        .await?;
    Ok(Json(response))
}
