//! Retry-with-backoff for calls to external services.
//!
//! Every AI and storage call goes through [`NetworkRetry::run`]. Errors are
//! classified by [`ServiceError::is_retryable`]: client errors fail fast,
//! transient ones are retried with exponential backoff plus random jitter.
//! Only idempotent operations are wrapped.

use crate::config_loader::Settings;
use crate::error::ServiceError;
use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first call included.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random extra delay added to each backoff.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            jitter: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_retries: settings.retry_max_retries.max(1),
            base_delay: Duration::from_millis(settings.retry_base_delay_ms),
            max_delay: Duration::from_millis(settings.retry_max_delay_ms),
            jitter: Duration::from_millis(settings.retry_jitter_ms),
        }
    }

    /// `min(base * 2^attempt + jitter, max_delay)`
    pub fn delay_for(&self, attempt: u32, jitter: Duration) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .saturating_mul(factor)
            .saturating_add(jitter)
            .min(self.max_delay)
    }

    fn sample_jitter(&self) -> Duration {
        let max_ms = self.jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Clone)]
pub struct NetworkRetry {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl NetworkRetry {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_sleeper(policy, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. The last error is returned unchanged.
    pub async fn run<F, Fut, T>(&self, operation: &str, mut op: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let attempts = self.policy.max_retries.max(1);
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(operation, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() => {
                    tracing::warn!(operation, error = %err, "Non-retryable failure");
                    return Err(err);
                }
                Err(err) if attempt + 1 >= attempts => {
                    tracing::warn!(
                        operation,
                        attempts,
                        error = %err,
                        "Giving up after exhausting retries"
                    );
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.policy.delay_for(attempt, self.policy.sample_jitter());
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, will retry after backoff"
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Race `fut` against a hard deadline.
pub async fn with_timeout<T, Fut>(limit: Duration, fut: Fut) -> Result<T, ServiceError>
where
    Fut: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::Timeout(limit)),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct RecordingSleeper {
        pub delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter: Duration::ZERO,
            ..RetryPolicy::default()
        }
    }

    fn server_error() -> ServiceError {
        ServiceError::Http {
            status: 500,
            message: "boom".into(),
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_two_server_errors() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let retry = NetworkRetry::with_sleeper(no_jitter(), sleeper.clone());
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result = retry
            .run("test_op", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(server_error())
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.delays.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_client_error_fails_immediately() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let retry = NetworkRetry::with_sleeper(no_jitter(), sleeper.clone());
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result: Result<(), _> = retry
            .run("test_op", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::Http {
                    status: 400,
                    message: "bad request".into(),
                })
            })
            .await;

        assert!(matches!(result, Err(ServiceError::Http { status: 400, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_last_error() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let retry = NetworkRetry::with_sleeper(no_jitter(), sleeper.clone());
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result: Result<(), _> = retry
            .run("test_op", move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::Network(format!("attempt {}", n)))
            })
            .await;

        assert_eq!(result, Err(ServiceError::Network("attempt 2".into())));
        assert_eq!(
            *sleeper.delays.lock().unwrap(),
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = no_jitter();
        assert_eq!(policy.delay_for(2, Duration::ZERO), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(5, Duration::ZERO), Duration::from_millis(10_000));
        assert_eq!(policy.delay_for(40, Duration::from_millis(999)), policy.max_delay);
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let jitter = policy.sample_jitter();
            assert!(jitter <= Duration::from_millis(1000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_service_timeout() {
        let result: Result<(), _> = with_timeout(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(ServiceError::Timeout(Duration::from_millis(50))));
    }
}
