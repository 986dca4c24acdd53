use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::address::WalletAddress;
use crate::datasource::types::{
    BackendPortfolio, TransactionsResponse, WebhookRequest, WebhookResponse,
};
use crate::datasource::{check_response, BackendSource};
use crate::error::FetchError;

/// Client for the treasury backend that aggregates chains server-side.
#[derive(Clone)]
pub struct BackendGatewayClient {
    client: Client,
    base_url: String,
}

impl BackendGatewayClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await?;
        let result: T = check_response(response).await?.json().await?;
        Ok(result)
    }
}

#[async_trait]
impl BackendSource for BackendGatewayClient {
    async fn trigger_fetch_all(&self, address: &WalletAddress) -> Result<(), FetchError> {
        let response = self
            .client
            .post(format!("{}/portfolio/fetch/all", self.base_url))
            .json(&json!({ "address": address }))
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }

    async fn get_portfolio(&self, address: &WalletAddress) -> Result<BackendPortfolio, FetchError> {
        self.get(&format!("/portfolio/{}", address)).await
    }

    async fn get_transactions(&self, address: &WalletAddress) -> Result<Vec<Value>, FetchError> {
        let response: TransactionsResponse =
            self.get(&format!("/portfolio/{}/history", address)).await?;
        tracing::debug!(
            "Fetched {} transactions (cache counter {:?})",
            response.items.len(),
            response.cache_counter
        );
        Ok(response.items)
    }

    async fn create_webhook(
        &self,
        request: &WebhookRequest,
    ) -> Result<WebhookResponse, FetchError> {
        let response = self
            .client
            .post(format!("{}/webhook", self.base_url))
            .json(request)
            .send()
            .await?;
        let created: WebhookResponse = check_response(response).await?.json().await?;
        Ok(created)
    }
}
