// Resilient call policy shared by both upstream providers

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::UpstreamError;

// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// Retries transient upstream faults with exponential backoff, bounded by an
/// overall deadline that includes every attempt and every backoff sleep.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    timeout: Duration,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `f` until it succeeds, fails terminally, exhausts its retries or
    /// runs past the deadline.
    pub async fn execute<F, Fut, T>(&self, operation: &str, f: F) -> Result<T, UpstreamError>
    where
        F: Fn() -> Fut + Send,
        Fut: Future<Output = Result<T, UpstreamError>> + Send,
        T: Send,
    {
        let attempts = async {
            let mut attempt = 0;
            loop {
                match f().await {
                    Ok(result) => return Ok(result),
                    Err(error) if error.is_retryable() && attempt < self.config.max_retries => {
                        let delay = Self::calculate_backoff(attempt, &self.config);
                        attempt += 1;
                        warn!(
                            operation,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "Transient upstream failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(error) => return Err(error),
                }
            }
        };

        match tokio::time::timeout(self.timeout, attempts).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout_ms = self.timeout.as_millis() as u64, "Upstream call timed out");
                Err(UpstreamError::Timeout(self.timeout.as_millis() as u64))
            }
        }
    }

    // Exponential backoff with jitter
    pub fn calculate_backoff(retry_attempt: u32, config: &RetryConfig) -> Duration {
        let base_backoff_ms = (config.initial_backoff_ms as f64
            * config.backoff_multiplier.powf(retry_attempt as f64))
        .min(config.max_backoff_ms as f64);

        let jitter = rand::random::<f64>() * config.jitter_factor * base_backoff_ms;
        let backoff_ms = base_backoff_ms * (1.0 - config.jitter_factor / 2.0) + jitter;

        Duration::from_millis(backoff_ms as u64)
    }
}
