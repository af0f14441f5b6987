//! Retry with Exponential Backoff
//!
//! Shared retry loop for transient upstream failures. Delay grows
//! exponentially per attempt with random jitter added on top; an explicit
//! server hint (Retry-After) takes precedence over the computed backoff.
//! Every delay is capped at the policy maximum.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Classification hooks errors must provide to participate in retries.
pub trait Retryable {
    /// Whether another attempt could plausibly succeed.
    fn is_retryable(&self) -> bool;

    /// Server-provided wait hint, when one came back with the failure.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Backoff parameters for one retry loop.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Executes an async operation under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run `op` until it succeeds, exhausts the attempt budget, or fails
    /// with a non-retryable error. The closure receives the 1-based attempt
    /// number.
    pub async fn retry<F, Fut, T, E>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts && err.is_retryable() => {
                    let delay = self.delay_for(attempt, err.retry_after());
                    warn!(
                        "{label}: attempt {attempt}/{attempts} failed ({err}), \
                         retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    debug!("{label}: giving up after attempt {attempt} ({err})");
                    return Err(err);
                }
            }
        }
    }

    /// Delay before the attempt following `attempt`. An explicit hint wins
    /// over the exponential schedule; both paths get jitter and the cap.
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let jitter = self.policy.base_delay.mul_f64(rand::random::<f64>());
        let raw = match hint {
            Some(hinted) => hinted,
            None => {
                let shift = attempt.saturating_sub(1).min(20);
                let exp = self
                    .policy
                    .base_delay
                    .saturating_mul(1u32 << shift);
                exp.min(self.policy.max_delay)
            }
        };
        raw.saturating_add(jitter).min(self.policy.max_delay)
    }
}

/// Parse an HTTP `Retry-After` header value: integer seconds, fractional
/// seconds, or an HTTP-date. Dates in the past collapse to zero.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if let Ok(secs) = value.parse::<f64>() {
        if secs.is_finite() && secs >= 0.0 {
            return Some(Duration::from_secs_f64(secs));
        }
        return None;
    }
    let when = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let wait = (when.with_timezone(&chrono::Utc) - chrono::Utc::now())
        .num_milliseconds()
        .max(0) as u64;
    Some(Duration::from_millis(wait))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct TestError {
        retryable: bool,
        hint: Option<Duration>,
    }

    impl TestError {
        fn transient() -> Self {
            Self {
                retryable: true,
                hint: None,
            }
        }

        fn fatal() -> Self {
            Self {
                retryable: false,
                hint: None,
            }
        }
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test error")
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }

        fn retry_after(&self) -> Option<Duration> {
            self.hint
        }
    }

    fn executor() -> RetryExecutor {
        RetryExecutor::new(RetryPolicy::default())
    }

    #[test]
    fn test_delay_grows_exponentially_within_cap() {
        let exec = executor();
        let base = Duration::from_millis(250);
        for attempt in 1..=6 {
            let delay = exec.delay_for(attempt, None);
            let shift = (attempt - 1).min(20);
            let floor = base.saturating_mul(1u32 << shift).min(Duration::from_secs(10));
            assert!(delay >= floor, "attempt {attempt}: {delay:?} < {floor:?}");
            assert!(delay <= Duration::from_secs(10));
        }
    }

    #[test]
    fn test_hint_takes_precedence_and_is_capped() {
        let exec = executor();
        let hinted = exec.delay_for(1, Some(Duration::from_secs(5)));
        assert!(hinted >= Duration::from_secs(5));
        assert!(hinted <= Duration::from_secs(10));

        // A huge hint still respects the policy cap.
        let capped = exec.delay_for(1, Some(Duration::from_secs(3600)));
        assert_eq!(capped, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<u32, TestError> = executor()
            .retry("test", move |_| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(TestError::transient())
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_budget_is_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<u32, TestError> = executor()
            .retry("test", move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::transient())
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<u32, TestError> = executor()
            .retry("test", move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::fatal())
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_delays_next_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let started = tokio::time::Instant::now();
        let result: Result<u32, TestError> = executor()
            .retry("test", move |attempt| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if attempt == 1 {
                        Err(TestError {
                            retryable: true,
                            hint: Some(Duration::from_secs(5)),
                        })
                    } else {
                        Ok(1)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 1);
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[test]
    fn test_parse_retry_after_formats() {
        assert_eq!(parse_retry_after("7"), Some(Duration::from_secs(7)));
        assert_eq!(
            parse_retry_after("1.5"),
            Some(Duration::from_secs_f64(1.5))
        );
        assert_eq!(parse_retry_after("nonsense"), None);
        // Dates in the past clamp to zero wait.
        let past = parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT").unwrap();
        assert_eq!(past, Duration::ZERO);
    }
}
