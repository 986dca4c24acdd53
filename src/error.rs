use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::services::retry::TerminalFailure;

/// Failure of a single upstream call, before any retry decision.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited by upstream")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Unexpected response body: {0}")]
    Decode(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not ready: {completed}/{total} chains completed")]
    Pending { completed: usize, total: usize },

    #[error("Cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_)
            | FetchError::RateLimited { .. }
            | FetchError::Upstream { .. }
            | FetchError::Pending { .. } => true,
            FetchError::Decode(_) | FetchError::Validation(_) | FetchError::Cancelled => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Upstream {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("External API error: {0}")]
    ExternalApiError(String),

    #[error("Upstream fetch failed: {0}")]
    Fetch(#[from] TerminalFailure),

    #[error("No chain returned data for {0}")]
    AllChainsFailed(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<FetchError> for AppError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Validation(msg) => AppError::ValidationError(msg),
            other => AppError::ExternalApiError(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut retryable = false;
        let (status, error_message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::ExternalApiError(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::Fetch(failure) => {
                tracing::error!("Upstream fetch failed: {}", failure);
                tracing::debug!("Attempt history: {:?}", failure.history);
                if let FetchError::Validation(msg) = &failure.last_error {
                    (StatusCode::BAD_REQUEST, msg.clone())
                } else {
                    (StatusCode::BAD_GATEWAY, failure.to_string())
                }
            }
            AppError::AllChainsFailed(address) => {
                retryable = true;
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    format!("No chain returned portfolio data for {}", address),
                )
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
            "retryable": retryable,
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
