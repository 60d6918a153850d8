//! Retry delays with exponential backoff
//!
//! One policy type serves both the REST retry loop (20 s growing by 10% per
//! failure, no cap) and the supervisor's fixed restart delay.

use kucoin_types::{FeedError, FeedResult};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Delay schedule for repeated attempts
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound on any single delay (None = unbounded)
    pub max_delay: Option<Duration>,
    /// Growth factor applied after each failure
    pub multiplier: f64,
    /// Random jitter factor (0.0 to 1.0)
    pub jitter: f64,
    /// Maximum number of attempts (None = unlimited)
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::rest_default()
    }
}

impl BackoffPolicy {
    /// REST retry schedule: 20 s, then 22 s, 24.2 s, ... forever
    pub fn rest_default() -> Self {
        Self {
            initial_delay: Duration::from_secs(20),
            max_delay: None,
            multiplier: 1.1,
            jitter: 0.0,
            max_attempts: None,
        }
    }

    /// Same delay every time
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: Some(delay),
            multiplier: 1.0,
            jitter: 0.0,
            max_attempts: None,
        }
    }

    /// Set initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set backoff multiplier
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Set jitter factor
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Set maximum attempts
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }

    /// Calculate delay for a given failure number (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return self.cap(self.initial_delay);
        }

        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);

        self.cap(delay)
    }

    fn cap(&self, delay: Duration) -> Duration {
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    /// Apply jitter to a base delay
    pub fn apply_jitter(&self, base: Duration) -> Duration {
        if self.jitter == 0.0 {
            return base;
        }

        let jitter_range = base.as_millis() as f64 * self.jitter;
        let jitter = rand::random::<f64>() * 2.0 * jitter_range - jitter_range;
        let adjusted_ms = (base.as_millis() as f64 + jitter).max(0.0) as u64;

        Duration::from_millis(adjusted_ms)
    }

    /// Get delay with jitter applied for a given failure number
    pub fn delay_with_jitter(&self, attempt: u32) -> Duration {
        self.apply_jitter(self.delay_for_attempt(attempt))
    }

    /// Check if another attempt is allowed after `attempt` failures
    pub fn should_retry(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt < max,
            None => true,
        }
    }
}

/// Run `op` until it succeeds, sleeping per `policy` between failures
///
/// Errors that are not retryable are returned immediately.
pub async fn retry<T, F, Fut>(policy: &BackoffPolicy, what: &str, mut op: F) -> FeedResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FeedError>>,
{
    let mut failures = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                failures = failures.saturating_add(1);
                if !policy.should_retry(failures) {
                    return Err(e);
                }
                let delay = policy.delay_with_jitter(failures);
                warn!(
                    attempt = failures,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "{} failed, retrying",
                    what
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
