//! Exponential backoff with jitter bounded by a total time budget.

use std::time::Duration;

use hazelcast_wire::{HazelcastError, Result};
use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;

/// Try-wait-retry helper.
///
/// Every [`wait`](Self::wait) sleeps for the current backoff, scaled by a
/// random jitter factor and clamped to the time left in the budget, then
/// grows the backoff by the multiplier up to the maximum. Once the budget
/// is spent `wait` returns `false` without sleeping.
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
    jitter: f64,
    timeout: Duration,
    current_backoff: Duration,
    started_at: Instant,
    attempts: u32,
}

impl RetryStrategy {
    /// Creates a retry strategy whose budget starts now.
    pub fn new(
        initial_backoff: Duration,
        max_backoff: Duration,
        multiplier: f64,
        jitter: f64,
        timeout: Duration,
    ) -> Self {
        Self {
            initial_backoff,
            max_backoff,
            multiplier,
            jitter: jitter.clamp(0.0, 1.0),
            timeout,
            current_backoff: initial_backoff,
            started_at: Instant::now(),
            attempts: 0,
        }
    }

    /// Creates a retry strategy from the cluster connect retry configuration.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.initial_backoff(),
            config.max_backoff(),
            config.multiplier(),
            config.jitter(),
            config.cluster_connect_timeout(),
        )
    }

    /// Returns how many waits have completed.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns the time spent since the budget started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Waits before the next try.
    ///
    /// Returns `Ok(false)` once the time budget is exhausted, and
    /// [`HazelcastError::Cancelled`] if `cancel` fires during the wait.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> Result<bool> {
        let elapsed = self.elapsed();
        if elapsed >= self.timeout {
            tracing::debug!(
                attempts = self.attempts,
                elapsed = ?elapsed,
                "retry budget exhausted"
            );
            return Ok(false);
        }

        let delay = self.jittered(self.current_backoff).min(self.timeout - elapsed);
        tracing::trace!(attempt = self.attempts + 1, delay = ?delay, "waiting before retry");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {
                return Err(HazelcastError::Cancelled("retry wait cancelled".to_string()));
            }
        }

        self.attempts += 1;
        self.current_backoff = Duration::from_secs_f64(
            (self.current_backoff.as_secs_f64() * self.multiplier)
                .min(self.max_backoff.as_secs_f64()),
        );
        Ok(true)
    }

    fn jittered(&self, backoff: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return backoff;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        Duration::from_secs_f64(backoff.as_secs_f64() * factor)
    }
}
