use std::future::Future;
use std::time::Duration;

use ai_client::AiError;
use firecrawl_client::FirecrawlError;
use pagewatch_common::file_config::RetryConfig;
use rand::Rng;
use tracing::warn;

use crate::error::{FetchError, OracleError};

/// Classifies errors for [`RetryPolicy`]: only transient failures are retried.
pub trait Retryable {
    fn is_transient(&self) -> bool;

    /// Server-provided wait hint, e.g. from a Retry-After header.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for AiError {
    fn is_transient(&self) -> bool {
        AiError::is_transient(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            AiError::RateLimited {
                retry_after_secs: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

impl Retryable for FirecrawlError {
    fn is_transient(&self) -> bool {
        FirecrawlError::is_transient(self)
    }
}

impl Retryable for OracleError {
    fn is_transient(&self) -> bool {
        match self {
            OracleError::Ai(e) => e.is_transient(),
            OracleError::Other { transient, .. } => *transient,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            OracleError::Ai(e) => Retryable::retry_after(e),
            OracleError::Other { .. } => None,
        }
    }
}

impl Retryable for FetchError {
    fn is_transient(&self) -> bool {
        match self {
            FetchError::Network { .. } | FetchError::Timeout { .. } => true,
            FetchError::Http { status, .. } => *status >= 500 || *status == 408,
            _ => false,
        }
    }
}

/// The last error seen once a [`RetryPolicy`] gives up.
#[derive(Debug)]
pub struct RetryError<E> {
    pub error: E,
    pub attempts: u32,
}

/// Bounded retry with exponential backoff: the delay after attempt `n`
/// (0-based) is `min(base * multiplier^n, max) + jitter`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    multiplier: u32,
    max_delay: Duration,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: u32, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier: multiplier.max(1),
            max_delay,
            jitter: true,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            config.multiplier,
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// Retries without sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            multiplier: 1,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff after the given 0-based attempt, before jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryError<E>>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    attempt += 1;
                    if !error.is_transient() || attempt >= self.max_attempts {
                        return Err(RetryError {
                            error,
                            attempts: attempt,
                        });
                    }

                    let mut delay = self.delay_for(attempt - 1);
                    if let Some(hint) = error.retry_after() {
                        delay = delay.max(hint.min(self.max_delay));
                    }
                    if self.jitter && !delay.is_zero() {
                        delay += Duration::from_millis(rand::rng().random_range(0..1000));
                    }

                    warn!(
                        label,
                        attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient failure, retrying after backoff"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}
