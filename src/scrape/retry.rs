use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Error kinds for retry classification. Classification is keyword-based
/// over the rendered error message, so wrapped and transported errors
/// classify the same as their originals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    NetworkError,
    RateLimited,
    NavigationError,
    SelectorError,
    ParseError,
    Unknown,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::NetworkError | Self::RateLimited)
    }
}

pub fn classify(err: &Error) -> ErrorKind {
    let message = err.to_string().to_lowercase();
    if message.contains("timeout") || message.contains("timed out") {
        ErrorKind::Timeout
    } else if message.contains("rate limit")
        || message.contains("too many requests")
        || message.contains("429")
    {
        ErrorKind::RateLimited
    } else if message.contains("connection")
        || message.contains("network")
        || message.contains("dns")
        || message.contains("refused")
        || message.contains("reset by peer")
    {
        ErrorKind::NetworkError
    } else if message.contains("navigation")
        || message.contains("404")
        || message.contains("not found")
    {
        ErrorKind::NavigationError
    } else if message.contains("selector") {
        ErrorKind::SelectorError
    } else if message.contains("parse") {
        ErrorKind::ParseError
    } else {
        ErrorKind::Unknown
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff, capped: `initial * multiplier^attempt`.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        let delay = self.initial_delay.as_millis() as f64 * factor;
        Duration::from_millis(delay as u64).min(self.max_delay)
    }
}

/// Run `op` with retries. Only transient kinds (timeout, network, rate
/// limit) retry; everything else rethrows immediately. A rate-limit error
/// carrying an explicit Retry-After overrides the computed backoff.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, context: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let kind = classify(&err);
                if !kind.is_retryable() || attempt + 1 >= policy.max_attempts {
                    if attempt > 0 {
                        warn!(context, attempts = attempt + 1, error = %err, "Giving up after retries");
                    }
                    return Err(err);
                }

                let delay = match &err {
                    Error::RateLimited {
                        retry_after_secs: Some(secs),
                    } => Duration::from_secs(*secs),
                    _ => policy.backoff(attempt),
                };
                debug!(
                    context,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    kind = ?kind,
                    "Retrying after transient error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts: attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            multiplier: 2.0,
        }
    }

    #[test]
    fn classify_timeout() {
        let err = Error::Timeout {
            reason: "page load".into(),
        };
        assert_eq!(classify(&err), ErrorKind::Timeout);
    }

    #[test]
    fn classify_network() {
        let err = Error::Network {
            reason: "connection refused".into(),
        };
        assert_eq!(classify(&err), ErrorKind::NetworkError);
    }

    #[test]
    fn classify_rate_limited() {
        let err = Error::RateLimited {
            retry_after_secs: None,
        };
        assert_eq!(classify(&err), ErrorKind::RateLimited);
    }

    #[test]
    fn classify_navigation() {
        let err = Error::Navigation {
            reason: "HTTP 404 for page".into(),
        };
        assert_eq!(classify(&err), ErrorKind::NavigationError);
    }

    #[test]
    fn classify_selector_and_parse() {
        assert_eq!(
            classify(&Error::Selector {
                reason: "bad css".into()
            }),
            ErrorKind::SelectorError
        );
        assert_eq!(
            classify(&Error::Parse {
                reason: "missing title".into()
            }),
            ErrorKind::ParseError
        );
    }

    #[test]
    fn classify_unknown() {
        assert_eq!(classify(&Error::Job("boom".into())), ErrorKind::Unknown);
    }

    #[test]
    fn retryable_set_is_transient_only() {
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::NetworkError.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(!ErrorKind::ParseError.is_retryable());
        assert!(!ErrorKind::SelectorError.is_retryable());
        assert!(!ErrorKind::NavigationError.is_retryable());
        assert!(!ErrorKind::Unknown.is_retryable());
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            multiplier: 2.0,
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        // 400 capped to 350
        assert_eq!(policy.backoff(2), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn transient_error_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let result = with_retry(&fast_policy(5), "test", move || {
            let calls = Arc::clone(&calls_clone);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::Network {
                        reason: "connection reset by peer".into(),
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_fails_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let result: Result<u32> = with_retry(&fast_policy(5), "test", move || {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Parse {
                    reason: "broken markup".into(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_attempts_surface_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let result: Result<u32> = with_retry(&fast_policy(3), "test", move || {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Timeout {
                    reason: "slow page".into(),
                })
            }
        })
        .await;
        assert!(matches!(result.unwrap_err(), Error::Timeout { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_after_overrides_backoff() {
        // Retry-After of 0 seconds completes instantly even with a large
        // configured initial delay
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        };
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let start = std::time::Instant::now();
        let result = with_retry(&policy, "test", move || {
            let calls = Arc::clone(&calls_clone);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::RateLimited {
                        retry_after_secs: Some(0),
                    })
                } else {
                    Ok(1)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 1);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
