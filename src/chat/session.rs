use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::types::CacheConfig;
use crate::domain::filters::ExtractedFilters;
use crate::domain::session::{ChatRole, ChatSession};
use crate::error::{Error, ExtractionCode, Result};
use crate::ports::cache::KeyValueCache;
use crate::search::extractor::FilterExtractor;
use crate::search::ranking::RankedListing;
use crate::search::semantic::{SearchOutcome, SemanticSearch};

/// Confidence gate below which a turn asks for clarification instead of
/// searching.
const CLARIFY_THRESHOLD: f64 = 0.6;
/// Looser gate applied only to the very first turn.
const FIRST_TURN_THRESHOLD: f64 = 0.5;
const MAX_FOLLOW_UPS: usize = 3;
const NARROW_SUGGESTION_ABOVE: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    New,
    Extracting,
    Clarifying,
    Searchable,
    Ended,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub extracted_filters: ExtractedFilters,
    pub listings: Vec<RankedListing>,
    pub follow_up_questions: Vec<String>,
    pub total_matches: u64,
    pub session_id: String,
    pub cached: bool,
    pub clarification_needed: bool,
    pub state: SessionState,
}

struct SessionSlot {
    session: Arc<tokio::sync::Mutex<ChatSession>>,
    last_activity: Instant,
}

/// Multi-turn conversation manager: one logical writer per session, filters
/// accumulated across turns, write-through to the session cache.
pub struct SessionManager {
    extractor: FilterExtractor,
    search: Arc<SemanticSearch>,
    cache: Arc<dyn KeyValueCache>,
    session_ttl: Duration,
    results_ttl: Duration,
    sessions: std::sync::Mutex<HashMap<String, SessionSlot>>,
}

impl SessionManager {
    pub fn new(
        extractor: FilterExtractor,
        search: Arc<SemanticSearch>,
        cache: Arc<dyn KeyValueCache>,
        cache_config: &CacheConfig,
    ) -> Self {
        Self {
            extractor,
            search,
            cache,
            session_ttl: Duration::from_secs(cache_config.session_ttl_secs),
            results_ttl: Duration::from_secs(cache_config.search_results_ttl_secs),
            sessions: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn session_cache_key(session_id: &str) -> String {
        format!("chat:session:{session_id}")
    }

    fn results_cache_key(query: &str, filters: &ExtractedFilters) -> String {
        // No authenticated users in this service; everyone is anonymous.
        let raw = format!("{}|{}|anon", query.to_lowercase(), filters.cache_fragment());
        format!("search:results:{:x}", md5::compute(raw))
    }

    /// Fetch the per-session lock, reviving from the cache after process
    /// restarts and expiring sessions idle past the TTL.
    async fn session_slot(&self, session_id: &str) -> Arc<tokio::sync::Mutex<ChatSession>> {
        {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(slot) = sessions.get_mut(session_id) {
                if slot.last_activity.elapsed() < self.session_ttl {
                    slot.last_activity = Instant::now();
                    return Arc::clone(&slot.session);
                }
                // ENDED: idle past the TTL, start over
                sessions.remove(session_id);
            }
        }

        let revived = match self.cache.get(&Self::session_cache_key(session_id)).await {
            Ok(Some(json)) => serde_json::from_str::<ChatSession>(&json).ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Session cache read failed");
                None
            }
        };

        let session = Arc::new(tokio::sync::Mutex::new(revived.unwrap_or_default()));
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.insert(
            session_id.to_string(),
            SessionSlot {
                session: Arc::clone(&session),
                last_activity: Instant::now(),
            },
        );
        session
    }

    async fn persist(&self, session_id: &str, session: &ChatSession) {
        match serde_json::to_string(session) {
            Ok(json) => {
                if let Err(e) = self
                    .cache
                    .set(&Self::session_cache_key(session_id), &json, self.session_ttl)
                    .await
                {
                    warn!(error = %e, "Session cache write failed");
                }
            }
            Err(e) => warn!(error = %e, "Session serialization failed"),
        }
    }

    /// Drop a session explicitly.
    pub async fn reset(&self, session_id: &str) {
        {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            sessions.remove(session_id);
        }
        if let Err(e) = self.cache.delete(&Self::session_cache_key(session_id)).await {
            warn!(error = %e, "Session cache delete failed");
        }
    }

    /// Process one user turn. Never surfaces provider failures to the user,
    /// except rate limits which the HTTP layer maps to 429.
    pub async fn handle_turn(
        &self,
        session_id: Option<&str>,
        query: &str,
    ) -> Result<ChatResponse> {
        if query.trim().is_empty() {
            return Err(Error::InvalidParams {
                reason: "query must not be empty".into(),
            });
        }

        let session_id = session_id
            .filter(|s| !s.is_empty())
            .map_or_else(|| Uuid::new_v4().to_string(), String::from);
        let slot = self.session_slot(&session_id).await;
        let mut session = slot.lock().await;

        session.push_turn(ChatRole::User, query);
        let first_turn = session.turn_count == 1;

        let extraction = match self.extractor.extract(query).await {
            Ok(extraction) => extraction,
            Err(
                e @ Error::Extraction {
                    code: ExtractionCode::RateLimited,
                    ..
                },
            ) => {
                self.persist(&session_id, &session).await;
                return Err(e);
            }
            Err(e) => {
                warn!(error = %e, "Extraction failed, acknowledging politely");
                let message =
                    "Ispričavam se, trenutno ne mogu obraditi upit. Pokušajte ponovno za koji trenutak.";
                session.push_turn(ChatRole::Assistant, message);
                self.persist(&session_id, &session).await;
                return Ok(ChatResponse {
                    message: message.into(),
                    extracted_filters: session.current_filters.clone(),
                    listings: Vec::new(),
                    follow_up_questions: Vec::new(),
                    total_matches: 0,
                    session_id,
                    cached: false,
                    clarification_needed: true,
                    state: SessionState::Extracting,
                });
            }
        };

        session.current_filters.merge(&extraction.filters);
        let merged = session.current_filters.clone();

        let clarification_needed = extraction.confidence.overall < CLARIFY_THRESHOLD
            || !extraction.confidence.ambiguous_fields.is_empty();
        let first_turn_gate = !first_turn || extraction.confidence.overall >= FIRST_TURN_THRESHOLD;
        let should_search =
            !clarification_needed && first_turn_gate && !merged.high_value_fields().is_empty();

        let response = if should_search {
            let (outcome, cached) = self.search_with_cache(query, &merged).await?;
            let message = summarize(&outcome);
            let follow_ups = follow_up_questions(&merged, Some(outcome.total_matches));
            session.push_turn(ChatRole::Assistant, message.as_str());
            ChatResponse {
                message,
                extracted_filters: merged,
                listings: outcome.listings,
                follow_up_questions: follow_ups,
                total_matches: outcome.total_matches,
                session_id: session_id.clone(),
                cached,
                clarification_needed: false,
                state: SessionState::Searchable,
            }
        } else {
            let follow_ups = follow_up_questions(&merged, None);
            let message = if follow_ups.is_empty() {
                "Možete li mi reći nešto više o tome što tražite?".to_string()
            } else {
                format!("Trebam još par detalja. {}", follow_ups.join(" "))
            };
            session.push_turn(ChatRole::Assistant, message.as_str());
            ChatResponse {
                message,
                extracted_filters: merged,
                listings: Vec::new(),
                follow_up_questions: follow_ups,
                total_matches: 0,
                session_id: session_id.clone(),
                cached: false,
                clarification_needed: true,
                state: SessionState::Clarifying,
            }
        };

        self.persist(&session_id, &session).await;
        Ok(response)
    }

    async fn search_with_cache(
        &self,
        query: &str,
        filters: &ExtractedFilters,
    ) -> Result<(SearchOutcome, bool)> {
        let key = Self::results_cache_key(query, filters);
        match self.cache.get(&key).await {
            Ok(Some(json)) => {
                if let Ok(outcome) = serde_json::from_str::<SearchOutcome>(&json) {
                    debug!("Search results cache hit");
                    return Ok((outcome, true));
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Results cache read failed"),
        }

        let outcome = self.search.search(query, filters).await?;
        if let Ok(json) = serde_json::to_string(&outcome)
            && let Err(e) = self.cache.set(&key, &json, self.results_ttl).await
        {
            warn!(error = %e, "Results cache write failed");
        }
        Ok((outcome, false))
    }
}

fn summarize(outcome: &SearchOutcome) -> String {
    if outcome.listings.is_empty() {
        return "Nažalost, nisam pronašao oglase koji odgovaraju traženim kriterijima.".into();
    }
    let mut message = format!(
        "Pronašao sam {} oglasa, prikazujem {} najboljih:",
        outcome.total_matches,
        outcome.listings.len()
    );
    for entry in outcome.listings.iter().take(3) {
        message.push_str(&format!("\n• {}", entry.listing));
    }
    message
}

/// Heuristic follow-ups, at most three. `result_count` is None when no
/// search ran this turn.
fn follow_up_questions(filters: &ExtractedFilters, result_count: Option<u64>) -> Vec<String> {
    let mut questions = Vec::new();

    if result_count == Some(0) {
        questions.push(
            "Nema rezultata za ove kriterije — želite li proširiti budžet ili lokaciju?".to_string(),
        );
    }
    if filters.listing_type.is_none() {
        questions.push("Tražite li najam ili kupnju?".to_string());
    }
    if filters.location.is_none() {
        questions.push("U kojem gradu ili kvartu tražite?".to_string());
    }
    if filters.price_max.is_none() {
        questions.push("Koji vam je okvirni budžet?".to_string());
    }
    if filters.rooms_min.is_none() && filters.rooms_max.is_none() {
        questions.push("Koliko soba trebate?".to_string());
    }
    if result_count.is_some_and(|n| n > NARROW_SUGGESTION_ABOVE) {
        questions.push(
            "Dosta je rezultata — želite li suziti pretragu, npr. po broju soba ili kvartu?"
                .to_string(),
        );
    }

    questions.truncate(MAX_FOLLOW_UPS);
    questions
}
