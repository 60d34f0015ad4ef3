use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::Serialize;

use crate::domain::job::{JobType, ScrapeJob, TriggeredBy};
use crate::domain::listing::ListingType;
use crate::error::{Error, Result};

/// A registered repeatable job.
struct Entry {
    name: String,
    expression: String,
    schedule: Schedule,
    job_type: JobType,
    listing_type: Option<ListingType>,
    next_fire: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleInfo {
    pub name: String,
    pub cron: String,
    pub next_fire: Option<DateTime<Utc>>,
}

/// Cron-driven repeatable registrations. Re-registering a name replaces the
/// previous definition, so schedules can be redefined at startup.
#[derive(Default)]
pub struct Scheduler {
    entries: std::sync::Mutex<Vec<Entry>>,
}

/// The `cron` crate wants a seconds column; standard 5-field expressions
/// get one prepended.
fn parse_cron(expression: &str) -> Result<Schedule> {
    let normalized = if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    };
    Schedule::from_str(&normalized).map_err(|e| {
        Error::Config(format!("invalid cron expression '{expression}': {e}"))
    })
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        name: &str,
        expression: &str,
        job_type: JobType,
        listing_type: Option<ListingType>,
    ) -> Result<()> {
        let schedule = parse_cron(expression)?;
        let next_fire = schedule.upcoming(Utc).next();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        // Replace any previous registration under the same name
        entries.retain(|entry| entry.name != name);
        entries.push(Entry {
            name: name.to_string(),
            expression: expression.to_string(),
            schedule,
            job_type,
            listing_type,
            next_fire,
        });
        Ok(())
    }

    pub fn unregister(&self, name: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|entry| entry.name != name);
    }

    /// Jobs whose fire time has passed; advances each entry to its next
    /// occurrence.
    pub fn due_jobs(&self, now: DateTime<Utc>) -> Vec<ScrapeJob> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut jobs = Vec::new();
        for entry in entries.iter_mut() {
            let Some(fire_at) = entry.next_fire else {
                continue;
            };
            if fire_at > now {
                continue;
            }
            let mut job = ScrapeJob::new(entry.job_type, TriggeredBy::Scheduler);
            job.listing_type = entry.listing_type;
            jobs.push(job);
            entry.next_fire = entry.schedule.after(&now).next();
        }
        jobs
    }

    pub fn schedules(&self) -> Vec<ScheduleInfo> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .map(|entry| ScheduleInfo {
                name: entry.name.clone(),
                cron: entry.expression.clone(),
                next_fire: entry.next_fire,
            })
            .collect()
    }
}
