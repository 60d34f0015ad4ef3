use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::types::JobsConfig;
use crate::domain::job::{JobProgress, ScrapeJob, ScrapeJobResult};
use crate::error::{Error, Result};

/// Retention: completed jobs kept 24 h or the newest 100; failed jobs kept
/// 7 d or the newest 500.
const COMPLETED_RETENTION_HOURS: i64 = 24;
const COMPLETED_RETENTION_COUNT: usize = 100;
const FAILED_RETENTION_DAYS: i64 = 7;
const FAILED_RETENTION_COUNT: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Delayed,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    pub job: ScrapeJob,
    pub state: JobState,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub next_run_at: DateTime<Utc>,
    #[serde(default)]
    pub progress: Option<JobProgress>,
    #[serde(default)]
    pub result: Option<ScrapeJobResult>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
}

#[derive(Default)]
struct QueueInner {
    jobs: HashMap<Uuid, QueuedJob>,
    /// FIFO order of enqueueing, for fair pop and "recent jobs" listings.
    order: Vec<Uuid>,
}

/// At-least-once job queue with exponential retry backoff, bounded
/// retention and state introspection. Single consumer by design.
pub struct JobQueue {
    inner: std::sync::Mutex<QueueInner>,
    attempts: u32,
    backoff_base: ChronoDuration,
}

impl JobQueue {
    pub fn new(config: &JobsConfig) -> Self {
        Self {
            inner: std::sync::Mutex::new(QueueInner::default()),
            attempts: config.attempts.max(1),
            backoff_base: ChronoDuration::seconds(config.backoff_base_secs.max(1) as i64),
        }
    }

    /// Enqueue a job; duplicates by id are rejected.
    pub fn add(&self, job: ScrapeJob) -> Result<Uuid> {
        let mut inner = self.lock();
        let id = job.id;
        if inner.jobs.contains_key(&id) {
            return Err(Error::Job(format!("job {id} already queued")));
        }
        let now = Utc::now();
        inner.jobs.insert(
            id,
            QueuedJob {
                job,
                state: JobState::Waiting,
                attempts_made: 0,
                max_attempts: self.attempts,
                enqueued_at: now,
                next_run_at: now,
                progress: None,
                result: None,
                error: None,
            },
        );
        inner.order.push(id);
        Ok(id)
    }

    /// Pop the oldest due job and mark it active. Delayed jobs whose
    /// backoff has elapsed are eligible again.
    pub fn take_due(&self) -> Option<ScrapeJob> {
        let mut inner = self.lock();
        let now = Utc::now();
        let id = inner.order.iter().copied().find(|id| {
            inner.jobs.get(id).is_some_and(|entry| {
                matches!(entry.state, JobState::Waiting | JobState::Delayed)
                    && entry.next_run_at <= now
            })
        })?;
        let entry = inner.jobs.get_mut(&id)?;
        entry.state = JobState::Active;
        entry.attempts_made += 1;
        Some(entry.job.clone())
    }

    pub fn complete(&self, id: Uuid, result: ScrapeJobResult) {
        let mut inner = self.lock();
        if let Some(entry) = inner.jobs.get_mut(&id) {
            entry.state = JobState::Completed;
            entry.result = Some(result);
            entry.error = None;
        }
        Self::apply_retention(&mut inner);
    }

    /// Record a failure. Remaining attempts push the job to the delayed
    /// state with exponential backoff; otherwise it fails for good.
    pub fn fail(&self, id: Uuid, error: &str) {
        let mut inner = self.lock();
        if let Some(entry) = inner.jobs.get_mut(&id) {
            entry.error = Some(error.to_string());
            if entry.attempts_made < entry.max_attempts {
                let exponent = entry.attempts_made.saturating_sub(1).min(16);
                let backoff = self.backoff_base * 2_i32.pow(exponent);
                entry.state = JobState::Delayed;
                entry.next_run_at = Utc::now() + backoff;
            } else {
                entry.state = JobState::Failed;
            }
        }
        Self::apply_retention(&mut inner);
    }

    pub fn update_progress(&self, id: Uuid, progress: JobProgress) {
        let mut inner = self.lock();
        if let Some(entry) = inner.jobs.get_mut(&id) {
            entry.progress = Some(progress);
        }
    }

    /// Cancel a job that is not currently running.
    pub fn cancel(&self, id: Uuid) -> Result<()> {
        let mut inner = self.lock();
        match inner.jobs.get(&id) {
            None => Err(Error::Job(format!("job {id} not found"))),
            Some(entry) if entry.state == JobState::Active => {
                Err(Error::Job(format!("job {id} is active and cannot be cancelled")))
            }
            Some(_) => {
                inner.jobs.remove(&id);
                inner.order.retain(|other| *other != id);
                Ok(())
            }
        }
    }

    pub fn counts(&self) -> JobCounts {
        let inner = self.lock();
        let mut counts = JobCounts::default();
        for entry in inner.jobs.values() {
            match entry.state {
                JobState::Waiting => counts.waiting += 1,
                JobState::Active => counts.active += 1,
                JobState::Delayed => counts.delayed += 1,
                JobState::Completed => counts.completed += 1,
                JobState::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Newest jobs first.
    pub fn recent(&self, limit: usize) -> Vec<QueuedJob> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.jobs.get(id).cloned())
            .take(limit)
            .collect()
    }

    pub fn get(&self, id: Uuid) -> Option<QueuedJob> {
        self.lock().jobs.get(&id).cloned()
    }

    fn apply_retention(inner: &mut QueueInner) {
        let now = Utc::now();
        let completed_cutoff = now - ChronoDuration::hours(COMPLETED_RETENTION_HOURS);
        let failed_cutoff = now - ChronoDuration::days(FAILED_RETENTION_DAYS);

        let mut completed_seen = 0usize;
        let mut failed_seen = 0usize;
        let mut drop: Vec<Uuid> = Vec::new();

        for id in inner.order.iter().rev() {
            let Some(entry) = inner.jobs.get(id) else {
                continue;
            };
            match entry.state {
                JobState::Completed => {
                    completed_seen += 1;
                    if completed_seen > COMPLETED_RETENTION_COUNT
                        || entry.enqueued_at < completed_cutoff
                    {
                        drop.push(*id);
                    }
                }
                JobState::Failed => {
                    failed_seen += 1;
                    if failed_seen > FAILED_RETENTION_COUNT || entry.enqueued_at < failed_cutoff {
                        drop.push(*id);
                    }
                }
                _ => {}
            }
        }

        for id in drop {
            inner.jobs.remove(&id);
            inner.order.retain(|other| *other != id);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::{JobType, TriggeredBy};

    fn queue() -> JobQueue {
        JobQueue::new(&JobsConfig::default())
    }

    fn job() -> ScrapeJob {
        ScrapeJob::new(JobType::FullScrape, TriggeredBy::Manual)
    }

    #[test]
    fn add_then_take_in_fifo_order() {
        let queue = queue();
        let first = queue.add(job()).unwrap();
        let second = queue.add(job()).unwrap();

        assert_eq!(queue.take_due().unwrap().id, first);
        assert_eq!(queue.take_due().unwrap().id, second);
        assert!(queue.take_due().is_none());
    }

    #[test]
    fn duplicate_id_rejected() {
        let queue = queue();
        let j = job();
        queue.add(j.clone()).unwrap();
        assert!(queue.add(j).is_err());
    }

    #[test]
    fn counts_track_states() {
        let queue = queue();
        let id = queue.add(job()).unwrap();
        queue.add(job()).unwrap();
        assert_eq!(queue.counts().waiting, 2);

        queue.take_due().unwrap();
        let counts = queue.counts();
        assert_eq!(counts.active, 1);
        assert_eq!(counts.waiting, 1);

        queue.complete(
            id,
            ScrapeJobResult::aggregate(id, vec![], Utc::now()),
        );
        assert_eq!(queue.counts().completed, 1);
    }

    #[test]
    fn failure_delays_with_backoff_then_fails_for_good() {
        let queue = queue();
        let id = queue.add(job()).unwrap();

        // Attempt 1
        queue.take_due().unwrap();
        queue.fail(id, "boom");
        let entry = queue.get(id).unwrap();
        assert_eq!(entry.state, JobState::Delayed);
        assert!(entry.next_run_at > Utc::now());
        // Exponential: first delay is the base (60 s)
        let delta = entry.next_run_at - Utc::now();
        assert!(delta <= ChronoDuration::seconds(61));
        assert!(delta >= ChronoDuration::seconds(55));

        // Not due yet
        assert!(queue.take_due().is_none());

        // Force due and burn the remaining attempts
        for attempt in 2..=3 {
            {
                let mut inner = queue.inner.lock().unwrap();
                inner.jobs.get_mut(&id).unwrap().next_run_at = Utc::now();
            }
            let taken = queue.take_due();
            assert!(taken.is_some(), "attempt {attempt} should run");
            queue.fail(id, "boom");
        }

        let entry = queue.get(id).unwrap();
        assert_eq!(entry.state, JobState::Failed);
        assert_eq!(entry.attempts_made, 3);
        assert_eq!(queue.counts().failed, 1);
    }

    #[test]
    fn second_failure_doubles_backoff() {
        let queue = queue();
        let id = queue.add(job()).unwrap();
        queue.take_due().unwrap();
        queue.fail(id, "x");
        {
            let mut inner = queue.inner.lock().unwrap();
            inner.jobs.get_mut(&id).unwrap().next_run_at = Utc::now();
        }
        queue.take_due().unwrap();
        queue.fail(id, "x");
        let entry = queue.get(id).unwrap();
        let delta = entry.next_run_at - Utc::now();
        assert!(delta >= ChronoDuration::seconds(115));
        assert!(delta <= ChronoDuration::seconds(121));
    }

    #[test]
    fn cancel_waiting_job() {
        let queue = queue();
        let id = queue.add(job()).unwrap();
        queue.cancel(id).unwrap();
        assert!(queue.get(id).is_none());
        assert_eq!(queue.counts().waiting, 0);
    }

    #[test]
    fn cancel_active_job_rejected() {
        let queue = queue();
        let id = queue.add(job()).unwrap();
        queue.take_due().unwrap();
        assert!(queue.cancel(id).is_err());
        // Still there
        assert!(queue.get(id).is_some());
    }

    #[test]
    fn cancel_unknown_job_errors() {
        let queue = queue();
        assert!(queue.cancel(Uuid::new_v4()).is_err());
    }

    #[test]
    fn progress_is_stored() {
        let queue = queue();
        let id = queue.add(job()).unwrap();
        let taken = queue.take_due().unwrap();
        queue.update_progress(
            id,
            JobProgress {
                job_id: taken.id,
                current_scraper: 1,
                total_scrapers: 3,
                source: "njuskalo".into(),
                page: 2,
                listings_processed: 40,
                status: crate::domain::job::JobStatus::Running,
            },
        );
        let entry = queue.get(id).unwrap();
        assert_eq!(entry.progress.unwrap().listings_processed, 40);
    }

    #[test]
    fn retention_caps_completed_jobs() {
        let queue = queue();
        let mut ids = Vec::new();
        for _ in 0..(COMPLETED_RETENTION_COUNT + 10) {
            let id = queue.add(job()).unwrap();
            ids.push(id);
            queue.take_due().unwrap();
            queue.complete(id, ScrapeJobResult::aggregate(id, vec![], Utc::now()));
        }
        let counts = queue.counts();
        assert_eq!(counts.completed as usize, COMPLETED_RETENTION_COUNT);
        // Oldest were dropped
        assert!(queue.get(ids[0]).is_none());
        assert!(queue.get(*ids.last().unwrap()).is_some());
    }

    #[test]
    fn recent_returns_newest_first() {
        let queue = queue();
        let first = queue.add(job()).unwrap();
        let second = queue.add(job()).unwrap();
        let recent = queue.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].job.id, second);
        assert_eq!(recent[1].job.id, first);
    }
}
