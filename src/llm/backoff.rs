//! Exponential backoff with jitter for rate-limited embedding APIs.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::error::{RelevanceError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Growth factor applied per retry
    pub multiplier: f64,
    /// Fractional jitter band, 0.2 means ±20%
    pub jitter: f64,
    /// Added to the backoff to form each attempt's timeout
    pub attempt_headroom: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: 0.2,
            attempt_headroom: Duration::from_secs(30),
        }
    }
}

impl BackoffConfig {
    /// No waiting between attempts. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
            attempt_headroom: Duration::from_secs(5),
        }
    }

    /// Nominal delay before retry `retry` (1-based), without jitter.
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.powi(retry as i32 - 1);
        self.base_delay.mul_f64(factor)
    }

    /// Nominal delay scaled by a random factor in `[1 - jitter, 1 + jitter]`.
    pub fn jittered_delay(&self, retry: u32) -> Duration {
        let nominal = self.nominal_delay(retry);
        if self.jitter <= 0.0 || nominal.is_zero() {
            return nominal;
        }
        let factor = rand::rng().random_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        nominal.mul_f64(factor.max(0.0))
    }

    /// Timeout for one attempt that followed a wait of `backoff`.
    pub fn attempt_timeout(&self, backoff: Duration) -> Duration {
        backoff + self.attempt_headroom
    }
}

/// Outcome of one attempt against a rate-limited backend.
#[derive(Debug)]
pub enum Attempt<T> {
    Done(T),
    /// Rate limited or otherwise transient; try again after backoff
    Retry(RelevanceError),
}

/// Run `op` until it succeeds, fails permanently or exhausts the budget.
///
/// `op` receives the timeout for that attempt. Errors returned as `Err` are
/// treated as permanent and surface immediately.
pub async fn with_backoff<T, F, Fut>(config: &BackoffConfig, label: &str, mut op: F) -> Result<T>
where
    F: FnMut(Duration) -> Fut,
    Fut: Future<Output = Result<Attempt<T>>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut last_err = None;

    for attempt in 0..max_attempts {
        let mut wait = Duration::ZERO;
        if attempt > 0 {
            wait = config.jittered_delay(attempt);
            tracing::info!(
                "Rate limit hit. Retrying {label} (attempt {}/{max_attempts}) after {:.1}s",
                attempt + 1,
                wait.as_secs_f64()
            );
            tokio::time::sleep(wait).await;
        }

        match op(config.attempt_timeout(wait)).await? {
            Attempt::Done(value) => {
                if attempt > 0 {
                    tracing::info!("{label} succeeded after {attempt} retries");
                }
                return Ok(value);
            }
            Attempt::Retry(e) => {
                tracing::warn!("{label} rate limited: {e}");
                last_err = Some(e);
            }
        }
    }

    Err(RelevanceError::RateLimitExhausted {
        attempts: max_attempts,
        source: Box::new(last_err.unwrap_or_else(|| {
            RelevanceError::BackendUnavailable(format!("{label}: no attempts made"))
        })),
    })
}

/// Whether a status/body pair looks like a quota or rate-limit rejection.
pub fn is_rate_limited(status: u16, body: &str) -> bool {
    if status == 429 {
        return true;
    }
    let lower = body.to_lowercase();
    lower.contains("resource_exhausted")
        || lower.contains("resource has been exhausted")
        || lower.contains("rate limit")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_nominal_schedule_doubles() {
        let cfg = BackoffConfig::default();
        let secs: Vec<u64> = (1..=5).map(|r| cfg.nominal_delay(r).as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16]);
        assert_eq!(cfg.nominal_delay(0), Duration::ZERO);
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let cfg = BackoffConfig::default();
        for retry in 1..=4 {
            let nominal = cfg.nominal_delay(retry).as_secs_f64();
            for _ in 0..50 {
                let d = cfg.jittered_delay(retry).as_secs_f64();
                assert!(d >= nominal * 0.8 - 1e-9, "{d} below band for retry {retry}");
                assert!(d <= nominal * 1.2 + 1e-9, "{d} above band for retry {retry}");
            }
        }
    }

    #[test]
    fn test_attempt_timeout_adds_headroom() {
        let cfg = BackoffConfig::default();
        assert_eq!(
            cfg.attempt_timeout(Duration::from_secs(4)),
            Duration::from_secs(34)
        );
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(is_rate_limited(429, ""));
        assert!(is_rate_limited(503, "{\"status\": \"RESOURCE_EXHAUSTED\"}"));
        assert!(is_rate_limited(400, "Resource has been exhausted (e.g. check quota)"));
        assert!(!is_rate_limited(400, "invalid model"));
        assert!(!is_rate_limited(500, "internal"));
    }

    #[tokio::test]
    async fn test_retries_until_done() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&BackoffConfig::immediate(5), "test", |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Ok(Attempt::Retry(RelevanceError::BackendUnavailable("429".into())))
                } else {
                    Ok(Attempt::Done(n))
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_wraps_last_error() {
        let calls = AtomicU32::new(0);
        let err = with_backoff(&BackoffConfig::immediate(3), "test", |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok::<Attempt<()>, _>(Attempt::Retry(RelevanceError::BackendUnavailable(
                    format!("429 #{n}"),
                )))
            }
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            RelevanceError::RateLimitExhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(source.to_string().contains("429 #2"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let err = with_backoff(&BackoffConfig::immediate(5), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<Attempt<()>, _>(RelevanceError::BackendUnavailable("400".into())) }
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, RelevanceError::BackendUnavailable(_)));
    }
}
