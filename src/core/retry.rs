/*!
 * Retry with exponential backoff and jitter
 */

use std::time::Duration;

use rand::Rng;

use crate::cancel::CancelToken;
use crate::config::RetryConfig;
use crate::error::{Result, SyncError};

/// Backoff schedule applied around each sync action
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fraction of each delay randomly shaved off, in [0, 1]
    pub jitter: f64,
    /// When set, errors classified non-retryable fail immediately
    pub only_retryable_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
            jitter: config.jitter.clamp(0.0, 1.0),
            only_retryable_errors: config.only_retryable_errors,
        }
    }

    /// Policy that never retries, for tests and dry runs
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
            only_retryable_errors: true,
        }
    }

    /// Delay before retry `n` (1-based): `min(initial * multiplier^(n-1),
    /// max)` minus a random amount in `[0, jitter * delay)`
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        let exponent = retry_index.saturating_sub(1) as i32;
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        let shaved = if self.jitter > 0.0 {
            let fraction: f64 = rand::rng().random_range(0.0..self.jitter);
            capped * (1.0 - fraction)
        } else {
            capped
        };
        Duration::from_secs_f64(shaved.max(0.0))
    }

    /// Run `operation`, retrying per this schedule
    ///
    /// Waits are cancellable: a cancellation mid-wait abandons the retry
    /// and surfaces `SyncError::Cancelled`.
    pub fn run<T, F>(&self, cancel: &CancelToken, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut last_error: Option<SyncError> = None;

        for attempt in 0..=self.max_retries {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            if attempt > 0 {
                let delay = self.delay_for(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying");
                if !cancel.sleep(delay) {
                    return Err(SyncError::Cancelled);
                }
            }

            match operation() {
                Ok(value) => return Ok(value),
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(err) => {
                    if self.only_retryable_errors && !err.is_retryable() {
                        return Err(err);
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or(SyncError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last: "no error recorded".into(),
        }))
    }
}
