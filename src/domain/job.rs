use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::listing::{ListingType, PropertyType, ScrapeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    FullScrape,
    SingleSource,
    ListingTypeScrape,
    UpdateCheck,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullScrape => "full_scrape",
            Self::SingleSource => "single_source",
            Self::ListingTypeScrape => "listing_type_scrape",
            Self::UpdateCheck => "update_check",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggeredBy {
    Scheduler,
    Manual,
    Webhook,
    System,
}

/// One unit of work on the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeJob {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub listing_type: Option<ListingType>,
    #[serde(default)]
    pub property_type: Option<PropertyType>,
    #[serde(default)]
    pub max_pages: Option<u32>,
    pub triggered_by: TriggeredBy,
    pub triggered_at: DateTime<Utc>,
}

impl ScrapeJob {
    pub fn new(job_type: JobType, triggered_by: TriggeredBy) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type,
            source: None,
            listing_type: None,
            property_type: None,
            max_pages: None,
            triggered_by,
            triggered_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

/// Progress report published after each scraper finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: Uuid,
    pub current_scraper: usize,
    pub total_scrapers: usize,
    pub source: String,
    pub page: u32,
    pub listings_processed: u64,
    pub status: JobStatus,
}

/// Aggregated outcome of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeJobResult {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub total_scraped: u64,
    pub total_saved: u64,
    pub total_duplicates: u64,
    pub sources: Vec<ScrapeResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ScrapeJobResult {
    pub fn aggregate(
        job_id: Uuid,
        sources: Vec<ScrapeResult>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let total_scraped = sources.iter().map(|s| s.listings_scraped).sum();
        let total_saved = sources.iter().map(|s| s.listings_saved).sum();
        let total_duplicates = sources.iter().map(|s| s.listings_duplicate).sum();
        Self {
            job_id,
            status: JobStatus::Completed,
            total_scraped,
            total_saved,
            total_duplicates,
            sources,
            started_at,
            finished_at: Utc::now(),
            error: None,
        }
    }
}
