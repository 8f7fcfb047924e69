//! Resilience patterns
//!
//! Retry with configurable backoff, composed with a named circuit breaker
//! held inside the retry loop (one breaker call per attempt).

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::{BackoffStrategy, RetryConfig, RetryPolicy};

/// Retry tuning matching the original's Kafka-operation defaults.
pub fn kafka_retry_config() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        base_delay: std::time::Duration::from_secs(1),
        max_delay: std::time::Duration::from_secs(30),
        exponential_base: 2.0,
        jitter: true,
        strategy: BackoffStrategy::Exponential,
    }
}

/// Circuit breaker tuning matching the original's Kafka-operation defaults.
pub fn kafka_breaker_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: 3,
        recovery_timeout: std::time::Duration::from_secs(30),
        success_threshold: 2,
        call_timeout: std::time::Duration::from_secs(15),
    }
}

/// Circuit breaker tuning matching the original's storage-operation defaults.
pub fn storage_breaker_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: 5,
        recovery_timeout: std::time::Duration::from_secs(60),
        success_threshold: 3,
        call_timeout: std::time::Duration::from_secs(10),
    }
}
