use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::services::retry::RetryPolicy;

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub inch_api_url: String,
    pub inch_api_key: String,
    pub backend_url: String,
    pub nodit_api_url: String,
    pub nodit_api_key: String,
    pub cmc_api_url: String,
    pub cmc_api_key: String,
    pub server_host: String,
    pub server_port: u16,
    pub queue_delay: Duration,
    pub index_queue_delay: Duration,
    pub market_queue_delay: Duration,
    pub inter_chain_delay: Duration,
    pub indexer_retry: RetryPolicy,
    pub history_retry: RetryPolicy,
    pub poll_retry: RetryPolicy,
}

impl AppConfig {
    pub fn from_env() -> AppResult<Self> {
        let rate_limit_multiplier: f64 = parse_var("RATE_LIMIT_MULTIPLIER", 2.0)?;

        let indexer = RetryPolicy::indexer();
        let indexer_retry = RetryPolicy {
            max_retries: parse_var("INDEXER_MAX_RETRIES", indexer.max_retries)?,
            initial_delay: millis_var(
                "INDEXER_INITIAL_DELAY_MS",
                indexer.initial_delay.as_millis() as u64,
            )?,
            backoff_multiplier: parse_var(
                "INDEXER_BACKOFF_MULTIPLIER",
                indexer.backoff_multiplier,
            )?,
            rate_limit_multiplier,
            ..indexer
        };

        let history = RetryPolicy::history();
        let history_retry = RetryPolicy {
            max_retries: parse_var("HISTORY_MAX_RETRIES", history.max_retries)?,
            initial_delay: millis_var(
                "HISTORY_INITIAL_DELAY_MS",
                history.initial_delay.as_millis() as u64,
            )?,
            backoff_multiplier: parse_var(
                "HISTORY_BACKOFF_MULTIPLIER",
                history.backoff_multiplier,
            )?,
            max_delay: Some(millis_var("HISTORY_MAX_DELAY_MS", 5000)?),
            rate_limit_multiplier,
        };

        // POLL_MAX_RETRIES counts total polls, not retries
        let poll = RetryPolicy::poll();
        let poll_attempts: u32 = parse_var("POLL_MAX_RETRIES", poll.max_retries + 1)?;
        let poll_retry = RetryPolicy {
            max_retries: poll_attempts.saturating_sub(1),
            initial_delay: millis_var("POLL_INTERVAL_MS", poll.initial_delay.as_millis() as u64)?,
            ..poll
        };

        Ok(Self {
            inch_api_url: env::var("INCH_API_URL")
                .unwrap_or_else(|_| "https://api.1inch.dev".to_string()),
            inch_api_key: env::var("INCH_API_KEY").unwrap_or_default(),
            backend_url: env::var("BACKEND_URL").unwrap_or_else(|_| {
                "https://treasury-management-backend.calpa.workers.dev".to_string()
            }),
            nodit_api_url: env::var("NODIT_API_URL")
                .unwrap_or_else(|_| "https://web3.nodit.io/v1".to_string()),
            nodit_api_key: env::var("NODIT_API_KEY").unwrap_or_default(),
            cmc_api_url: env::var("CMC_API_URL")
                .unwrap_or_else(|_| "https://pro-api.coinmarketcap.com".to_string()),
            cmc_api_key: env::var("CMC_API_KEY").unwrap_or_default(),
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: parse_var("SERVER_PORT", 8081)?,
            queue_delay: millis_var("QUEUE_DELAY_MS", 1000)?,
            index_queue_delay: millis_var("NODIT_QUEUE_DELAY_MS", 200)?,
            market_queue_delay: millis_var("CMC_QUEUE_DELAY_MS", 1000)?,
            inter_chain_delay: millis_var("INTER_CHAIN_DELAY_MS", 1000)?,
            indexer_retry,
            history_retry,
            poll_retry,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse_var<T>(key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_value(key, env::var(key).ok().as_deref(), default)
}

/// Blank or absent means `default`; anything else must parse.
fn parse_value<T>(key: &str, raw: Option<&str>, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw.map(str::trim) {
        Some(value) if !value.is_empty() => value.parse::<T>().map_err(|e| {
            AppError::ValidationError(format!("{} has invalid value {:?}: {}", key, value, e))
        }),
        _ => Ok(default),
    }
}

fn millis_var(key: &str, default_ms: u64) -> AppResult<Duration> {
    parse_var(key, default_ms).map(Duration::from_millis)
}
