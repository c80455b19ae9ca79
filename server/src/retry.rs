use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Distinguishes failures worth another attempt from final ones.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Lost a race (conditional write conflict); re-reading may succeed.
    Retryable(E),
    /// Anything else; returned immediately.
    NonRetryable(E),
}

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Total attempts, the first one included.
    max_attempts: u32,
    /// Base delay for exponential backoff.
    base_delay_ms: u64,
    /// Maximum jitter to add to backoff delay (as fraction of delay, e.g., 0.25 = ±25%).
    jitter_factor: f64,
    /// Upper bound on any single delay, jitter included.
    max_delay_ms: u64,
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        RetryConfig {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            ..Default::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 4,
            base_delay_ms: 100,
            jitter_factor: 0.25,
            max_delay_ms: 5_000,
        }
    }
}

/// Run `func` until it succeeds, fails for good, or attempts run out.
///
/// On exhaustion the last retryable error is returned as-is.
pub async fn with_retry<F, Fut, T, E>(func: F, config: &RetryConfig) -> Result<T, RetryError<E>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, RetryError<E>>>,
    E: Display,
{
    let mut attempt = 0;
    loop {
        match func().await {
            Ok(result) => return Ok(result),
            Err(RetryError::Retryable(err)) if attempt + 1 < config.max_attempts => {
                let delay = backoff_with_jitter(attempt, config);
                log::warn!(
                    "{}; retry attempt {}/{} after {:?}",
                    err,
                    attempt + 1,
                    config.max_attempts - 1,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Calculate backoff delay with jitter for a given attempt.
///
/// Uses exponential backoff: base_delay * 2^attempt
/// Adds random jitter of ±jitter_factor so racing writers drift apart.
/// Never exceeds max_delay_ms.
fn backoff_with_jitter(attempt: u32, config: &RetryConfig) -> Duration {
    let base_delay = config
        .base_delay_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_delay_ms);
    let jitter_range = (base_delay as f64 * config.jitter_factor) as u64;
    let jitter = rand::rng().random_range(0..=jitter_range * 2) as i64 - jitter_range as i64;
    let delay_ms = ((base_delay as i64 + jitter).max(0) as u64).min(config.max_delay_ms);
    Duration::from_millis(delay_ms)
}
