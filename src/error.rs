use thiserror::Error;

/// Error codes surfaced when filter extraction fails outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionCode {
    RateLimited,
    Timeout,
    InvalidResponse,
    ApiError,
}

impl ExtractionCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "RATE_LIMITED",
            Self::Timeout => "TIMEOUT",
            Self::InvalidResponse => "INVALID_RESPONSE",
            Self::ApiError => "API_ERROR",
        }
    }
}

/// Error codes for the search path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchCode {
    NoEmbedding,
    DatabaseError,
    InvalidFilters,
    NoResults,
}

impl SearchCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoEmbedding => "NO_EMBEDDING",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::InvalidFilters => "INVALID_FILTERS",
            Self::NoResults => "NO_RESULTS",
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse page: {reason}")]
    Parse { reason: String },

    #[error("Selector error: {reason}")]
    Selector { reason: String },

    #[error("Navigation error: {reason}")]
    Navigation { reason: String },

    #[error("Rate limit exceeded, try again later")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Request timeout: {reason}")]
    Timeout { reason: String },

    #[error("Network error: {reason}")]
    Network { reason: String },

    #[error("Listing not found: {id}")]
    ListingNotFound { id: String },

    #[error("Invalid parameters: {reason}")]
    InvalidParams { reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Listing store error: {0}")]
    Store(String),

    #[error("Filter extraction failed ({code}): {message}", code = .code.as_str())]
    Extraction {
        code: ExtractionCode,
        message: String,
        retryable: bool,
    },

    #[error("Search failed ({code}): {message}", code = .code.as_str())]
    Search { code: SearchCode, message: String },

    #[error("Job error: {0}")]
    Job(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, Error>;
