//! Retry with exponential backoff and jitter.
//!
//! Callers must ensure the retried operation is safe to repeat; the helper
//! only decides whether and when to try again.

use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Number of retries after the initial attempt.
    pub max_retries: usize,

    /// Base delay in seconds; delay for attempt n is `backoff_base ^ (n + 1)`.
    pub backoff_base: f64,

    /// Maximum delay between attempts (in seconds).
    pub max_delay_secs: u64,

    /// Add random jitter to each delay to avoid thundering herds.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: 2.0,
            max_delay_secs: 60,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Configuration with a single retry, used for in-call transient retries.
    pub fn single() -> Self {
        Self {
            max_retries: 1,
            ..Self::default()
        }
    }

    /// Calculate the delay before retry attempt `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let mut secs = self.backoff_base.powi(attempt as i32 + 1);
        if self.jitter {
            secs *= 0.5 + rand::thread_rng().gen::<f64>();
        }
        let capped = secs.min(self.max_delay_secs as f64);
        Duration::from_secs_f64(capped)
    }
}

/// Execute an async operation with retry.
///
/// `retriable` decides whether a given error is worth retrying; errors it
/// rejects are returned immediately. The last error is returned once retries
/// are exhausted.
pub async fn with_retry<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
    retriable: P,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let delay = config.delay_for_attempt(attempt - 1);
            debug!(
                operation = %operation_name,
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying after delay"
            );
            sleep(delay).await;
        }

        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(operation = %operation_name, attempt = attempt, "Retry succeeded");
                }
                return Ok(result);
            }
            Err(e) => {
                if attempt < config.max_retries && retriable(&e) {
                    warn!(
                        operation = %operation_name,
                        attempt = attempt + 1,
                        max_retries = config.max_retries,
                        error = %e,
                        "Operation failed, will retry"
                    );
                    last_error = Some(e);
                } else {
                    warn!(
                        operation = %operation_name,
                        attempt = attempt + 1,
                        error = %e,
                        "Operation failed, not retrying"
                    );
                    return Err(e);
                }
            }
        }
    }

    Err(last_error.expect("retry loop exited without error"))
}

/// Heuristic for transient failures worth retrying: timeouts, connection
/// drops, and 5xx-style upstream errors.
pub fn is_transient_message(message: &str) -> bool {
    let msg = message.to_lowercase();
    msg.contains("timeout")
        || msg.contains("timed out")
        || msg.contains("connection")
        || msg.contains("disconnected")
        || msg.contains("502")
        || msg.contains("503")
        || msg.contains("504")
}
