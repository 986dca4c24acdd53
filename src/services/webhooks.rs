use std::sync::Arc;

use reqwest::Url;

use crate::address::WalletAddress;
use crate::datasource::types::{WebhookRequest, WebhookResponse};
use crate::datasource::BackendSource;
use crate::error::{AppError, AppResult};

/// Registers address-activity webhooks on the backend.
pub struct WebhookService {
    backend: Arc<dyn BackendSource>,
}

impl WebhookService {
    pub fn new(backend: Arc<dyn BackendSource>) -> Self {
        Self { backend }
    }

    /// Validates and normalizes the request, then creates the webhook in a
    /// single unretried call.
    pub async fn create(
        &self,
        addresses: &[String],
        webhook_url: &str,
    ) -> AppResult<WebhookResponse> {
        if addresses.is_empty() {
            return Err(AppError::ValidationError(
                "At least one address is required".to_string(),
            ));
        }
        let addresses = addresses
            .iter()
            .map(|a| WalletAddress::parse(a).map(|a| a.to_string()))
            .collect::<Result<Vec<_>, _>>()?;

        let url = Url::parse(webhook_url.trim())
            .map_err(|e| AppError::ValidationError(format!("Invalid webhook URL: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::ValidationError(format!(
                "Webhook URL must be http(s): {}",
                url
            )));
        }

        let request = WebhookRequest {
            addresses,
            webhook_url: url.to_string(),
        };
        let created = self.backend.create_webhook(&request).await?;
        tracing::info!(
            "Created webhook {} for {} address(es)",
            created.id,
            created.addresses.len()
        );
        Ok(created)
    }
}
