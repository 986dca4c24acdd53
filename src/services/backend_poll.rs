use std::sync::Arc;

use serde_json::Value;

use crate::address::WalletAddress;
use crate::datasource::types::BackendPortfolio;
use crate::datasource::BackendSource;
use crate::error::{AppResult, FetchError};
use crate::services::retry::RetryPolicy;

/// Drives the server-side aggregation: trigger once, then poll until every
/// chain reports completed or the poll policy runs out.
pub struct BackendPoller {
    backend: Arc<dyn BackendSource>,
    trigger_retry: RetryPolicy,
    poll_retry: RetryPolicy,
}

impl BackendPoller {
    pub fn new(
        backend: Arc<dyn BackendSource>,
        trigger_retry: RetryPolicy,
        poll_retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            trigger_retry,
            poll_retry,
        }
    }

    pub async fn fetch_portfolio(&self, address: &WalletAddress) -> AppResult<BackendPortfolio> {
        tracing::info!("Triggering backend aggregation for {}", address.short());
        let backend = &self.backend;
        self.trigger_retry
            .run("backend trigger", |_| backend.trigger_fetch_all(address))
            .await?;

        let portfolio = self
            .poll_retry
            .run("backend poll", |_| async move {
                let portfolio = backend.get_portfolio(address).await?;
                if portfolio.is_complete() {
                    Ok(portfolio)
                } else {
                    Err(FetchError::Pending {
                        completed: portfolio.completed_chains(),
                        total: portfolio.chains.len(),
                    })
                }
            })
            .await?;

        tracing::info!(
            "Backend aggregation for {} complete across {} chains",
            address.short(),
            portfolio.chains.len()
        );
        Ok(portfolio)
    }

    pub async fn transactions(&self, address: &WalletAddress) -> AppResult<Vec<Value>> {
        let backend = &self.backend;
        let items = self
            .trigger_retry
            .run("backend history", |_| backend.get_transactions(address))
            .await?;
        Ok(items)
    }
}
