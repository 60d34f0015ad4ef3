use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::types::JobsConfig;
use crate::domain::job::{JobProgress, JobStatus, JobType, ScrapeJob, ScrapeJobResult};
use crate::error::{Error, Result};
use crate::jobs::queue::JobQueue;
use crate::jobs::scheduler::Scheduler;
use crate::ports::cache::KeyValueCache;
use crate::ports::listing_store::ListingStore;
use crate::scrape::pool::FetchPool;
use crate::scrape::runner::ScrapeRunner;
use crate::scrape::{CancelToken, SourceScraper};
use crate::search::embeddings::EmbeddingService;

const IDLE_POLL: Duration = Duration::from_secs(1);
const EMBED_BACKFILL_LIMIT: usize = 500;
pub const SCRAPE_STATUS_KEY: &str = "scrape:status";

/// Single-concurrency scrape worker: pulls one job at a time, runs the
/// matching scrapers sequentially, publishes progress, and records the
/// aggregated result. Ordering within a process is guaranteed by design.
pub struct ScrapeWorker {
    queue: Arc<JobQueue>,
    scheduler: Arc<Scheduler>,
    runner: ScrapeRunner,
    pool: Arc<FetchPool>,
    fleet: Vec<Box<dyn SourceScraper>>,
    store: Arc<dyn ListingStore>,
    embeddings: Option<Arc<EmbeddingService>>,
    cache: Arc<dyn KeyValueCache>,
    config: JobsConfig,
    stale_after_days: u32,
    status_ttl: Duration,
}

impl ScrapeWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<JobQueue>,
        scheduler: Arc<Scheduler>,
        runner: ScrapeRunner,
        pool: Arc<FetchPool>,
        fleet: Vec<Box<dyn SourceScraper>>,
        store: Arc<dyn ListingStore>,
        embeddings: Option<Arc<EmbeddingService>>,
        cache: Arc<dyn KeyValueCache>,
        config: JobsConfig,
        stale_after_days: u32,
        status_ttl: Duration,
    ) -> Self {
        Self {
            queue,
            scheduler,
            runner,
            pool,
            fleet,
            store,
            embeddings,
            cache,
            config,
            stale_after_days,
            status_ttl,
        }
    }

    /// Worker main loop. Stops accepting new jobs once `shutdown` fires and
    /// lets the in-flight job finish within the grace period.
    pub async fn run(&self, shutdown: CancelToken) {
        info!("Scrape worker started");
        let min_interval = Duration::from_secs(self.config.min_job_interval_secs);
        let mut last_start: Option<Instant> = None;

        loop {
            if shutdown.is_cancelled() {
                info!("Scrape worker shutting down");
                break;
            }

            for job in self.scheduler.due_jobs(Utc::now()) {
                info!(job_type = job.job_type.as_str(), "Scheduler fired");
                if let Err(e) = self.queue.add(job) {
                    warn!(error = %e, "Failed to enqueue scheduled job");
                }
            }

            let Some(job) = self.queue.take_due() else {
                tokio::time::sleep(IDLE_POLL).await;
                continue;
            };

            // At most one job start per minute
            if let Some(last) = last_start {
                let since = last.elapsed();
                if since < min_interval {
                    tokio::time::sleep(min_interval - since).await;
                }
            }
            last_start = Some(Instant::now());

            self.execute(job, &shutdown).await;
        }
    }

    async fn execute(&self, job: ScrapeJob, shutdown: &CancelToken) {
        let job_id = job.id;
        info!(%job_id, job_type = job.job_type.as_str(), "Job started");

        // Cooperative cancellation: the watchdog trips the job token a
        // grace period after shutdown fires, hard-stopping the current
        // scraper between pages.
        let job_cancel = CancelToken::new();
        let watchdog = {
            let shutdown = shutdown.clone();
            let job_cancel = job_cancel.clone();
            let grace = Duration::from_secs(self.config.shutdown_grace_secs);
            tokio::spawn(async move {
                loop {
                    if shutdown.is_cancelled() {
                        tokio::time::sleep(grace).await;
                        job_cancel.cancel();
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            })
        };

        let timeout = Duration::from_secs(self.config.job_timeout_secs.max(1));
        let outcome = tokio::time::timeout(timeout, self.process(&job, &job_cancel)).await;
        watchdog.abort();

        match outcome {
            Ok(Ok(result)) => {
                self.publish_status(&result).await;
                self.queue.complete(job_id, result);
                info!(%job_id, "Job completed");
            }
            Ok(Err(e)) => {
                error!(%job_id, error = %e, "Job failed");
                self.queue.fail(job_id, &e.to_string());
            }
            Err(_) => {
                job_cancel.cancel();
                error!(%job_id, "Job exceeded its overall timeout");
                self.queue.fail(job_id, "job timed out");
            }
        }
    }

    /// Run one job: session acquired once per job, scrapers sequential,
    /// per-source failures recorded without failing the job.
    async fn process(&self, job: &ScrapeJob, cancel: &CancelToken) -> Result<ScrapeJobResult> {
        let scrapers = self.select_scrapers(job);
        if scrapers.is_empty() {
            return Err(Error::Job(format!(
                "no scrapers match job type {} (source {:?})",
                job.job_type.as_str(),
                job.source
            )));
        }

        let started = Utc::now();
        // Failing here is the one top-level failure mode: no scraper has
        // run yet, so the job itself fails and retries.
        let (handle, client) = self.pool.acquire().await?;

        let max_pages = match job.job_type {
            JobType::UpdateCheck => Some(1),
            _ => job.max_pages,
        };

        let total_scrapers = scrapers.len();
        let mut sources = Vec::new();
        let mut listings_processed: u64 = 0;

        for (index, scraper) in scrapers.into_iter().enumerate() {
            if cancel.is_cancelled() {
                warn!("Job cancelled, skipping remaining scrapers");
                break;
            }
            let result = self
                .runner
                .run_with_client(scraper, &client, max_pages, cancel)
                .await;
            listings_processed += result.listings_scraped;
            self.queue.update_progress(
                job.id,
                JobProgress {
                    job_id: job.id,
                    current_scraper: index + 1,
                    total_scrapers,
                    source: result.source.clone(),
                    page: result.pages_processed,
                    listings_processed,
                    status: JobStatus::Running,
                },
            );
            sources.push(result);
        }

        // Cleanup path: the session goes back even when cancelled early.
        self.pool.release(handle);

        if let Some(embeddings) = &self.embeddings {
            self.backfill_embeddings(embeddings).await;
        }

        if job.job_type == JobType::UpdateCheck {
            match self.store.cleanup_stale(self.stale_after_days).await {
                Ok(removed) if removed > 0 => info!(removed, "Stale listings removed"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Stale cleanup failed"),
            }
        }

        Ok(ScrapeJobResult::aggregate(job.id, sources, started))
    }

    /// Embed listings the scrape just created. Failures are per-listing and
    /// never fail the job.
    async fn backfill_embeddings(&self, embeddings: &Arc<EmbeddingService>) {
        let missing = match self.store.list_missing_embeddings(EMBED_BACKFILL_LIMIT).await {
            Ok(missing) => missing,
            Err(e) => {
                warn!(error = %e, "Could not list listings missing embeddings");
                return;
            }
        };
        if missing.is_empty() {
            return;
        }
        info!(count = missing.len(), "Backfilling listing embeddings");
        match embeddings.batch_generate(&missing).await {
            Ok(batch) => {
                for (id, vector) in &batch.embeddings {
                    if let Err(e) = self.store.update_embedding(*id, vector).await {
                        warn!(listing = %id, error = %e, "Embedding store write failed");
                    }
                }
                if !batch.failed_ids.is_empty() {
                    warn!(failed = batch.failed_ids.len(), "Some listings failed to embed");
                }
            }
            Err(e) => warn!(error = %e, "Embedding backfill failed"),
        }
    }

    fn select_scrapers(&self, job: &ScrapeJob) -> Vec<&dyn SourceScraper> {
        self.fleet
            .iter()
            .map(|scraper| scraper.as_ref())
            .filter(|scraper| match job.job_type {
                JobType::FullScrape | JobType::UpdateCheck => true,
                JobType::SingleSource => {
                    job.source.as_deref() == Some(scraper.source())
                        && job
                            .listing_type
                            .is_none_or(|lt| scraper.listing_type() == lt)
                }
                JobType::ListingTypeScrape => {
                    job.listing_type.is_none_or(|lt| scraper.listing_type() == lt)
                }
            })
            .filter(|scraper| {
                job.property_type
                    .is_none_or(|pt| scraper.property_type() == pt)
            })
            .collect()
    }

    async fn publish_status(&self, result: &ScrapeJobResult) {
        match serde_json::to_string(result) {
            Ok(json) => {
                if let Err(e) = self
                    .cache
                    .set(SCRAPE_STATUS_KEY, &json, self.status_ttl)
                    .await
                {
                    warn!(error = %e, "Failed to persist scrape status");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize scrape status"),
        }
    }
}
