use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::Client;
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use tracing::{debug, warn};

use crate::config::types::ScrapingConfig;
use crate::error::{Error, Result};

const ACQUIRE_POLL: Duration = Duration::from_millis(100);
const ACQUIRE_GIVE_UP: Duration = Duration::from_secs(30);

struct PooledSession {
    client: Client,
    last_used: Instant,
    in_use: bool,
}

/// Capped pool of fetch sessions. Each session keeps its own cookie store,
/// so sites see a consistent visitor across a scrape run.
pub struct FetchPool {
    config: ScrapingConfig,
    sessions: Mutex<Vec<PooledSession>>,
}

/// Index into the pool handed to the borrower; return it via `release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHandle(usize);

impl FetchPool {
    pub fn new(config: ScrapingConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(Vec::new()),
        }
    }

    fn build_client(&self) -> Result<Client> {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.config.locale) {
            headers.insert(ACCEPT_LANGUAGE, value);
        }
        Client::builder()
            .user_agent(&self.config.user_agent)
            .default_headers(headers)
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .cookie_store(true)
            .build()
            .map_err(Error::Http)
    }

    /// Borrow a session. Prefers a free one, creates below the cap, waits
    /// for a release otherwise, and creates over the cap after 30 s rather
    /// than deadlocking a job.
    pub async fn acquire(&self) -> Result<(SessionHandle, Client)> {
        let started = Instant::now();
        loop {
            {
                let Ok(mut sessions) = self.sessions.lock() else {
                    return Err(Error::Job("fetch pool lock poisoned".into()));
                };
                if let Some(index) = sessions.iter().position(|s| !s.in_use) {
                    let session = &mut sessions[index];
                    session.in_use = true;
                    session.last_used = Instant::now();
                    return Ok((SessionHandle(index), session.client.clone()));
                }
                if sessions.len() < self.config.max_sessions
                    || started.elapsed() >= ACQUIRE_GIVE_UP
                {
                    if sessions.len() >= self.config.max_sessions {
                        warn!(
                            cap = self.config.max_sessions,
                            "No session freed in 30s, creating over cap"
                        );
                    }
                    let client = self.build_client()?;
                    sessions.push(PooledSession {
                        client: client.clone(),
                        last_used: Instant::now(),
                        in_use: true,
                    });
                    return Ok((SessionHandle(sessions.len() - 1), client));
                }
            }
            tokio::time::sleep(ACQUIRE_POLL).await;
        }
    }

    pub fn release(&self, handle: SessionHandle) {
        if let Ok(mut sessions) = self.sessions.lock()
            && let Some(session) = sessions.get_mut(handle.0)
        {
            session.in_use = false;
            session.last_used = Instant::now();
        }
    }

    /// Drop sessions idle past the configured timeout, always keeping at
    /// least one around.
    pub fn sweep_idle(&self) {
        let idle_timeout = Duration::from_secs(self.config.session_idle_timeout_secs);
        let Ok(mut sessions) = self.sessions.lock() else {
            return;
        };
        let mut index = 0;
        while sessions.len() > 1 && index < sessions.len() {
            let session = &sessions[index];
            if !session.in_use && session.last_used.elapsed() > idle_timeout {
                debug!("Closing idle fetch session");
                sessions.remove(index);
            } else {
                index += 1;
            }
        }
    }

    /// Spawn the periodic idle sweep. Holds the pool lock only while
    /// inspecting timestamps.
    pub fn spawn_sweeper(self: &std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        let pool = std::sync::Arc::clone(self);
        let period = Duration::from_secs(pool.config.session_idle_timeout_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                pool.sweep_idle();
            }
        })
    }

    pub fn size(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }
}
