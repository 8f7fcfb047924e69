//! Retry policy implementation
//!
//! Configurable retry logic with exponential, linear, or fixed backoff and
//! optional jitter, composed with a named circuit breaker.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::KafkaOpsError;
use crate::resilience::circuit_breaker::CircuitBreaker;

/// Growth strategy for the delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    Exponential,
    Linear,
    Fixed,
}

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
    pub strategy: BackoffStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: true,
            strategy: BackoffStrategy::Exponential,
        }
    }
}

/// A configured retry policy, optionally wrapping a named circuit breaker.
///
/// Per spec: the breaker sits inside the retry loop, so each attempt is one
/// breaker call and a non-retryable error never counts as a breaker failure.
pub struct RetryPolicy {
    config: RetryConfig,
    breaker: Option<CircuitBreaker>,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            breaker: None,
        }
    }

    pub fn with_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = Some(breaker);
        self
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.config.base_delay.as_millis() as f64;
        let raw_ms = match self.config.strategy {
            BackoffStrategy::Exponential => {
                base_ms * self.config.exponential_base.powi(attempt as i32 - 1)
            }
            BackoffStrategy::Linear => base_ms * attempt as f64,
            BackoffStrategy::Fixed => base_ms,
        };
        let capped_ms = raw_ms.min(self.config.max_delay.as_millis() as f64);

        let final_ms = if self.config.jitter {
            let jitter_range = capped_ms * 0.1;
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped_ms + jitter).max(0.0)
        } else {
            capped_ms
        };

        Duration::from_millis(final_ms as u64)
    }

    fn should_retry(&self, attempt: u32, error: &KafkaOpsError) -> bool {
        attempt < self.config.max_attempts && error.is_retryable()
    }

    /// Execute `operation`, retrying on retryable `KafkaOpsError`s until the
    /// attempt budget is exhausted or a non-retryable error is returned.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T, KafkaOpsError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, KafkaOpsError>>,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            if let Some(breaker) = &self.breaker {
                if !breaker.is_available().await {
                    return Err(KafkaOpsError::new(
                        format!("Circuit breaker '{}' is open", breaker.name()),
                        crate::error::ErrorCode::InternalError,
                    )
                    .with_detail("circuit_state", "open"));
                }
            }

            let result = operation().await;

            if let Some(breaker) = &self.breaker {
                match &result {
                    Ok(_) => breaker.record_success().await,
                    Err(e) if e.is_retryable() => breaker.record_failure().await,
                    Err(_) => {}
                }
            }

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation_name, attempt, "operation succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if !self.should_retry(attempt, &err) {
                        if attempt >= self.config.max_attempts {
                            warn!(
                                operation_name,
                                attempts = attempt,
                                error = %err,
                                "all retry attempts exhausted"
                            );
                        } else {
                            warn!(operation_name, %err, "non-retryable error, giving up");
                        }
                        return Err(err);
                    }

                    let delay = self.calculate_delay(attempt);
                    warn!(
                        operation_name,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after failure"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn retries_until_success() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            jitter: false,
            ..Default::default()
        });
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result: Result<&str, KafkaOpsError> = policy
            .execute("test-op", || {
                let counter = counter_clone.clone();
                async move {
                    let count = counter.fetch_add(1, Ordering::SeqCst);
                    if count < 2 {
                        Err(KafkaOpsError::new("temporary", ErrorCode::KafkaTimeoutError))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn single_attempt_on_max_attempts_one() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            ..Default::default()
        });
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result: Result<(), KafkaOpsError> = policy
            .execute("test-op", || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(KafkaOpsError::new("always fails", ErrorCode::KafkaTimeoutError))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            ..Default::default()
        });
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result: Result<(), KafkaOpsError> = policy
            .execute("test-op", || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(KafkaOpsError::new("bad input", ErrorCode::ValidationError))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
