//! Request pacing and retry backoff for the remote API.
//!
//! Two cooperating mechanisms keep the client polite:
//! - Pacing: every wait between requests lasts at least a minimum delay,
//!   plus a small random jitter so repeated runs do not fire on a fixed
//!   cadence.
//! - Backoff: failed attempts are retried with an exponentially growing
//!   delay, capped at a maximum. Backoff delays carry no jitter so retry
//!   timing stays predictable in logs.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Configuration for pacing and retry behavior.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Maximum number of attempts (including the first one).
    pub max_attempts: u32,
    /// Base delay: the pause between items and the starting retry delay.
    pub base_delay: Duration,
    /// Cap applied to backoff delays.
    pub max_delay: Duration,
    /// Multiplier applied per retry attempt (typically 2.0 for doubling).
    pub backoff_factor: f64,
    /// Floor under every paced wait.
    pub min_delay: Duration,
    /// Upper bound of the random jitter added to paced waits.
    pub jitter_max: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            min_delay: Duration::from_secs(3),
            jitter_max: Duration::from_secs(2),
        }
    }
}

impl ThrottleConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the backoff cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the floor under paced waits.
    pub fn with_min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self
    }

    /// Set the jitter bound for paced waits.
    pub fn with_jitter_max(mut self, jitter: Duration) -> Self {
        self.jitter_max = jitter;
        self
    }

    /// Calculate the backoff delay for a given attempt number (0-indexed).
    ///
    /// Exponential growth capped at `max_delay`, no jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_factor.powi(attempt as i32);
        let delay_secs = self.base_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped_secs)
    }

    /// Calculate a paced wait: at least `min_delay`, plus random jitter.
    pub fn paced_delay(&self, delay: Duration) -> Duration {
        delay.max(self.min_delay) + random_jitter(self.jitter_max)
    }
}

/// Uniform random duration in `[0, max)`, or zero when `max` is zero.
fn random_jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let mut rng = rand::rng();
    Duration::from_secs_f64(rng.random_range(0.0..max.as_secs_f64()))
}

/// Sleep for a paced wait derived from `delay`.
pub async fn throttled_sleep(config: &ThrottleConfig, delay: Duration) {
    tokio::time::sleep(config.paced_delay(delay)).await;
}

/// Enforces a minimum gap between consecutive requests.
///
/// The first call passes through immediately. Later calls sleep for
/// whatever remains of the minimum gap, plus jitter. Callers are
/// serialized, so concurrent tasks cannot slip through the gap together.
#[derive(Debug)]
pub struct Pacer {
    min_delay: Duration,
    jitter_max: Duration,
    last: tokio::sync::Mutex<Option<Instant>>,
}

impl Pacer {
    /// Create a pacer with an explicit gap and jitter bound.
    pub fn new(min_delay: Duration, jitter_max: Duration) -> Self {
        Self {
            min_delay,
            jitter_max,
            last: tokio::sync::Mutex::new(None),
        }
    }

    /// Create a pacer from a throttle config.
    pub fn from_config(config: &ThrottleConfig) -> Self {
        Self::new(config.min_delay, config.jitter_max)
    }

    /// Wait until the minimum gap since the previous call has passed.
    pub async fn pace(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_delay {
                let wait = (self.min_delay - elapsed) + random_jitter(self.jitter_max);
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Statistics about a retried operation.
#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    /// Number of attempts made.
    pub attempts: u32,
    /// Total backoff delay accumulated.
    pub total_delay: Duration,
    /// Whether the operation ultimately succeeded.
    pub success: bool,
    /// Last error message if failed.
    pub last_error: Option<String>,
}

/// Retry an async operation with exponential backoff.
///
/// # Arguments
///
/// * `config` - Throttle configuration
/// * `operation` - Async function that returns a Result
/// * `should_retry` - Predicate to determine if an error is retryable
///
/// # Returns
///
/// A tuple of (Result, RetryStats)
pub async fn retry_async<F, Fut, T, E>(
    config: &ThrottleConfig,
    mut operation: F,
    should_retry: impl Fn(&E) -> bool,
) -> (Result<T, E>, RetryStats)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut stats = RetryStats::default();

    for attempt in 0..config.max_attempts {
        stats.attempts = attempt + 1;

        match operation().await {
            Ok(value) => {
                stats.success = true;
                if attempt > 0 {
                    debug!("Operation succeeded after {} attempts", attempt + 1);
                }
                return (Ok(value), stats);
            }
            Err(e) => {
                stats.last_error = Some(e.to_string());

                if !should_retry(&e) {
                    debug!("Error is not retryable: {}", e);
                    return (Err(e), stats);
                }

                if attempt + 1 >= config.max_attempts {
                    warn!(
                        "All {} retry attempts exhausted. Last error: {}",
                        config.max_attempts, e
                    );
                    return (Err(e), stats);
                }

                let delay = config.backoff_delay(attempt);
                stats.total_delay += delay;

                warn!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt + 1,
                    config.max_attempts,
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;
            }
        }
    }

    unreachable!("Retry loop should have returned")
}
