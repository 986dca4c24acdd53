use std::future::Future;
use std::time::Duration;

use serde::Serialize;

use crate::error::FetchError;

/// Result of one attempt inside a retry sequence.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "error", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    RetryableFailure(String),
    TerminalFailure(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchAttempt {
    pub attempt_number: u32,
    pub delay_before_ms: u64,
    pub outcome: AttemptOutcome,
}

/// Raised once a request has used up its retries or hit a non-retryable error.
#[derive(Debug, Clone, thiserror::Error)]
#[error("gave up after {attempts} attempt(s): {last_error}")]
pub struct TerminalFailure {
    pub attempts: u32,
    pub last_error: FetchError,
    pub history: Vec<FetchAttempt>,
}

/// Bounded retry with exponential backoff.
///
/// After the `n`th failed attempt the fetcher sleeps
/// `initial_delay * backoff_multiplier^(n-1)`, scaled by
/// `rate_limit_multiplier` when the upstream answered 429, and clamped to
/// `max_delay` when one is set. A policy holds no state between calls, so
/// one instance can drive any number of independent requests concurrently.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Option<Duration>,
    pub rate_limit_multiplier: f64,
}

impl RetryPolicy {
    /// Chain-indexing endpoints: pure exponential growth, no cap.
    pub fn indexer() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            backoff_multiplier: 1.5,
            max_delay: None,
            rate_limit_multiplier: 2.0,
        }
    }

    /// Portfolio history endpoint: doubles, capped at 5s.
    pub fn history() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            max_delay: Some(Duration::from_millis(5000)),
            rate_limit_multiplier: 2.0,
        }
    }

    /// Fixed-interval polling: ten polls one second apart.
    pub fn poll() -> Self {
        Self {
            max_retries: 9,
            initial_delay: Duration::from_millis(1000),
            backoff_multiplier: 1.0,
            max_delay: None,
            rate_limit_multiplier: 1.0,
        }
    }

    /// Delay to wait after `failed_attempts` consecutive failures.
    pub fn delay_for(&self, failed_attempts: u32, error: &FetchError) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let mut millis =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);

        if let FetchError::RateLimited { retry_after } = error {
            millis *= self.rate_limit_multiplier;
            if let Some(hint) = retry_after {
                millis = millis.max(hint.as_millis() as f64);
            }
        }

        let delay = if millis.is_finite() && millis > 0.0 {
            Duration::from_millis(millis.min(u64::MAX as f64).round() as u64)
        } else if millis.is_finite() {
            Duration::ZERO
        } else {
            Duration::MAX
        };

        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Runs `op` until it succeeds, fails terminally, or retries run out.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, TerminalFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut history = Vec::new();
        let mut delay_before = Duration::ZERO;
        let mut attempt: u32 = 1;

        loop {
            match op(attempt).await {
                Ok(value) => {
                    history.push(FetchAttempt {
                        attempt_number: attempt,
                        delay_before_ms: delay_before.as_millis() as u64,
                        outcome: AttemptOutcome::Success,
                    });
                    if attempt > 1 {
                        tracing::debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if !err.is_retryable() || attempt > self.max_retries {
                        tracing::warn!(
                            "{} failed terminally after {} attempt(s): {}",
                            label,
                            attempt,
                            err
                        );
                        history.push(FetchAttempt {
                            attempt_number: attempt,
                            delay_before_ms: delay_before.as_millis() as u64,
                            outcome: AttemptOutcome::TerminalFailure(err.to_string()),
                        });
                        return Err(TerminalFailure {
                            attempts: attempt,
                            last_error: err,
                            history,
                        });
                    }

                    let delay = self.delay_for(attempt, &err);
                    tracing::debug!(
                        "{} attempt {} failed ({}), retrying in {}ms ({} retries left)",
                        label,
                        attempt,
                        err,
                        delay.as_millis(),
                        self.max_retries + 1 - attempt
                    );
                    history.push(FetchAttempt {
                        attempt_number: attempt,
                        delay_before_ms: delay_before.as_millis() as u64,
                        outcome: AttemptOutcome::RetryableFailure(err.to_string()),
                    });

                    tokio::time::sleep(delay).await;
                    delay_before = delay;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::indexer()
    }
}
