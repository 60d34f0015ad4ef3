use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;

const WINDOW: Duration = Duration::from_secs(60);
const POLL: Duration = Duration::from_millis(50);

struct State {
    window_start: Option<Instant>,
    requests_this_minute: u32,
    last_request: Option<Instant>,
}

/// Politeness limiter for one scraper: a sliding 60-second request budget
/// plus a jittered minimum delay between consecutive requests.
///
/// One instance per scraper. Sharing across sites would let one slow site
/// throttle the others.
pub struct RateLimiter {
    requests_per_minute: u32,
    delay_between: Duration,
    delay_variance: Duration,
    detail_delay: Duration,
    state: Mutex<State>,
}

impl RateLimiter {
    pub fn new(
        requests_per_minute: u32,
        delay_between: Duration,
        delay_variance: Duration,
        detail_delay: Duration,
    ) -> Self {
        if requests_per_minute == 0 {
            tracing::warn!("Rate limiter configured with 0 requests/minute, clamping to 1");
        }
        Self {
            requests_per_minute: requests_per_minute.max(1),
            delay_between,
            delay_variance,
            detail_delay,
            state: Mutex::new(State {
                window_start: None,
                requests_this_minute: 0,
                last_request: None,
            }),
        }
    }

    /// Block until a list-page request is allowed.
    pub async fn throttle(&self) {
        self.throttle_with(self.delay_between).await;
    }

    /// Detail fetches interleave with list pages and may use a smaller
    /// inter-request delay. They still count against the minute budget.
    pub async fn throttle_detail(&self) {
        self.throttle_with(self.detail_delay).await;
    }

    pub fn reset(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.window_start = None;
            state.requests_this_minute = 0;
            state.last_request = None;
        }
    }

    async fn throttle_with(&self, base_delay: Duration) {
        let required_gap = base_delay + self.jitter();
        loop {
            let wait = {
                let Ok(mut state) = self.state.lock() else {
                    tracing::error!("Rate limiter lock poisoned, proceeding unthrottled");
                    return;
                };
                let now = Instant::now();

                // New minute window
                match state.window_start {
                    Some(start) if now.duration_since(start) >= WINDOW => {
                        state.window_start = Some(now);
                        state.requests_this_minute = 0;
                    }
                    None => {
                        state.window_start = Some(now);
                        state.requests_this_minute = 0;
                    }
                    _ => {}
                }

                let gap_remaining = state.last_request.and_then(|last| {
                    required_gap.checked_sub(now.duration_since(last))
                });

                if state.requests_this_minute < self.requests_per_minute {
                    match gap_remaining {
                        None => {
                            state.requests_this_minute += 1;
                            state.last_request = Some(now);
                            return;
                        }
                        Some(remaining) => remaining,
                    }
                } else {
                    // Budget exhausted: wait out the window
                    let until_reset = state
                        .window_start
                        .map_or(POLL, |start| WINDOW.saturating_sub(now.duration_since(start)));
                    until_reset.max(POLL)
                }
            };
            tokio::time::sleep(wait.min(WINDOW)).await;
        }
    }

    fn jitter(&self) -> Duration {
        let variance_ms = self.delay_variance.as_millis() as u64;
        if variance_ms == 0 {
            return Duration::ZERO;
        }
        let ms = rand::rng().random_range(0..=variance_ms);
        Duration::from_millis(ms)
    }
}
