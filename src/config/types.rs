use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scraping: ScrapingConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Bearer token for the admin endpoints. Unset disables them.
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            admin_token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScrapingConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_session_idle_timeout")]
    pub session_idle_timeout_secs: u64,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_delay_between_requests")]
    pub delay_between_requests_ms: u64,
    #[serde(default = "default_delay_variance")]
    pub delay_variance_ms: u64,
    #[serde(default = "default_detail_delay")]
    pub detail_delay_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_initial_delay")]
    pub retry_initial_delay_ms: u64,
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "default_retry_multiplier")]
    pub retry_multiplier: f64,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: u32,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            locale: default_locale(),
            max_sessions: default_max_sessions(),
            session_idle_timeout_secs: default_session_idle_timeout(),
            requests_per_minute: default_requests_per_minute(),
            delay_between_requests_ms: default_delay_between_requests(),
            delay_variance_ms: default_delay_variance(),
            detail_delay_ms: default_detail_delay(),
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            retry_initial_delay_ms: default_retry_initial_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
            retry_multiplier: default_retry_multiplier(),
            max_pages: default_max_pages(),
            stale_after_days: default_stale_after_days(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// API key for the language-model provider. Required for extraction and
    /// embedding generation; validated when the client is constructed.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dims")]
    pub embedding_dims: usize,
    #[serde(default = "default_provider_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_provider_base_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            embedding_dims: default_embedding_dims(),
            request_timeout_secs: default_provider_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Redis endpoint for the session/embedding cache. Unset falls back to
    /// the in-process cache.
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    #[serde(default = "default_query_embedding_ttl")]
    pub query_embedding_ttl_secs: u64,
    #[serde(default = "default_listing_embedding_ttl")]
    pub listing_embedding_ttl_secs: u64,
    #[serde(default = "default_search_results_ttl")]
    pub search_results_ttl_secs: u64,
    #[serde(default = "default_scrape_status_ttl")]
    pub scrape_status_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            max_entries: default_cache_max_entries(),
            session_ttl_secs: default_session_ttl(),
            query_embedding_ttl_secs: default_query_embedding_ttl(),
            listing_embedding_ttl_secs: default_listing_embedding_ttl(),
            search_results_ttl_secs: default_search_results_ttl(),
            scrape_status_ttl_secs: default_scrape_status_ttl(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Qdrant endpoint. Unset falls back to the in-memory store.
    #[serde(default)]
    pub qdrant_url: Option<String>,
    #[serde(default)]
    pub qdrant_api_key: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            qdrant_url: None,
            qdrant_api_key: None,
            collection: default_collection(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    #[serde(default = "default_filter_weight")]
    pub filter_weight: f64,
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,
    #[serde(default = "default_freshness_weight")]
    pub freshness_weight: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            max_results: default_max_results(),
            semantic_weight: default_semantic_weight(),
            filter_weight: default_filter_weight(),
            recency_weight: default_recency_weight(),
            freshness_weight: default_freshness_weight(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobsConfig {
    #[serde(default = "default_full_scrape_cron")]
    pub full_scrape_cron: String,
    #[serde(default = "default_rental_scrape_cron")]
    pub rental_scrape_cron: String,
    #[serde(default = "default_job_attempts")]
    pub attempts: u32,
    #[serde(default = "default_job_backoff")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_min_job_interval")]
    pub min_job_interval_secs: u64,
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            full_scrape_cron: default_full_scrape_cron(),
            rental_scrape_cron: default_rental_scrape_cron(),
            attempts: default_job_attempts(),
            backoff_base_secs: default_job_backoff(),
            min_job_interval_secs: default_min_job_interval(),
            job_timeout_secs: default_job_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".into()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".into()
}

fn default_locale() -> String {
    "hr-HR".into()
}

fn default_max_sessions() -> usize {
    3
}

fn default_session_idle_timeout() -> u64 {
    300
}

fn default_requests_per_minute() -> u32 {
    30
}

fn default_delay_between_requests() -> u64 {
    2000
}

fn default_delay_variance() -> u64 {
    1000
}

fn default_detail_delay() -> u64 {
    500
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_initial_delay() -> u64 {
    1000
}

fn default_retry_max_delay() -> u64 {
    30_000
}

fn default_retry_multiplier() -> f64 {
    2.0
}

fn default_max_pages() -> u32 {
    10
}

fn default_stale_after_days() -> u32 {
    30
}

fn default_provider_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".into()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

fn default_embedding_dims() -> usize {
    1536
}

fn default_provider_timeout() -> u64 {
    30
}

fn default_cache_max_entries() -> usize {
    2000
}

fn default_session_ttl() -> u64 {
    3600
}

fn default_query_embedding_ttl() -> u64 {
    86_400 // 24 hours
}

fn default_listing_embedding_ttl() -> u64 {
    604_800 // 7 days
}

fn default_search_results_ttl() -> u64 {
    3600
}

fn default_scrape_status_ttl() -> u64 {
    604_800
}

fn default_collection() -> String {
    "listings".into()
}

fn default_similarity_threshold() -> f64 {
    0.3
}

fn default_max_results() -> usize {
    10
}

fn default_semantic_weight() -> f64 {
    0.4
}

fn default_filter_weight() -> f64 {
    0.4
}

fn default_recency_weight() -> f64 {
    0.1
}

fn default_freshness_weight() -> f64 {
    0.1
}

fn default_full_scrape_cron() -> String {
    "0 */6 * * *".into()
}

fn default_rental_scrape_cron() -> String {
    "0 */2 * * *".into()
}

fn default_job_attempts() -> u32 {
    3
}

fn default_job_backoff() -> u64 {
    60
}

fn default_min_job_interval() -> u64 {
    60
}

fn default_job_timeout() -> u64 {
    600
}

fn default_shutdown_grace() -> u64 {
    30
}
