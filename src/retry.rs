use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one). Zero is treated as one.
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (2.0 doubles the delay each time)
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Preset: provider calls (3 attempts).
    /// Delays: 1s, 2s
    pub fn api_call() -> Self {
        Self::new(3, Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(2.0)
    }

    /// Preset: one attempt, no retry.
    pub fn single_attempt() -> Self {
        Self::new(1, Duration::ZERO)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before the given attempt (0-indexed); the first attempt never waits.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay_ms = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        Duration::from_millis(delay_ms as u64).min(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::api_call()
    }
}

/// Run `operation` until `should_retry` rejects its outcome or the attempts
/// run out, and return the last outcome either way.
///
/// Unlike [`with_retry_if`], the predicate sees successes too, so a call that
/// "succeeded" with a retryable payload (an HTTP 503 body, say) can be
/// repeated and, on exhaustion, still handed back to the caller.
pub async fn with_retry_until<T, E, F, Fut, P>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&Result<T, E>) -> bool,
{
    let attempts = config.attempts();
    let mut attempt = 0;

    loop {
        let delay = config.delay_for_attempt(attempt);
        if !delay.is_zero() {
            debug!(
                "{}: Retry attempt {}/{} after {:?}",
                operation_name,
                attempt + 1,
                attempts,
                delay
            );
            sleep(delay).await;
        }

        let outcome = operation().await;
        let remaining = attempts - attempt - 1;

        if !should_retry(&outcome) {
            if attempt > 0 {
                debug!(
                    "{}: Settled on attempt {}/{}",
                    operation_name,
                    attempt + 1,
                    attempts
                );
            }
            return outcome;
        }

        if remaining == 0 {
            warn!(
                "{}: All {} attempts exhausted, using last outcome",
                operation_name, attempts
            );
            return outcome;
        }

        warn!(
            "{}: Attempt {}/{} needs a retry, {} retries remaining",
            operation_name,
            attempt + 1,
            attempts,
            remaining
        );
        attempt += 1;
    }
}

/// Retry on every error.
pub async fn with_retry<T, E, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    with_retry_if(config, operation_name, operation, |_| true).await
}

/// Retry on errors accepted by `should_retry`; other errors fail immediately.
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    with_retry_until(config, operation_name, operation, |outcome| match outcome {
        Ok(_) => false,
        Err(e) => {
            let retry = should_retry(e);
            if retry {
                debug!("{}: Retryable error: {}", operation_name, e);
            } else {
                debug!(
                    "{}: Error is not retryable, failing immediately: {}",
                    operation_name, e
                );
            }
            retry
        }
    })
    .await
}
