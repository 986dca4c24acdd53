pub mod backend;
pub mod coinmarketcap;
pub mod nodit;
pub mod oneinch;
pub mod types;

#[cfg(test)]
pub mod testing;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Response, StatusCode};
use serde_json::Value;

use crate::address::WalletAddress;
use crate::error::FetchError;
use types::{
    BackendPortfolio, MarketListing, NativeBalance, OwnedToken, Page, ProtocolList, TimeRange,
    TokenDetails, TokenTransfer, ValuePoint, WebhookRequest, WebhookResponse,
};

/// Chain-scoped portfolio analytics API.
///
/// Each call is one HTTP request; callers decide on queueing and retries.
#[async_trait]
pub trait PortfolioSource: Send + Sync {
    /// Protocol positions (lending, LP, staking) held on one chain
    async fn get_protocols(
        &self,
        chain_id: u64,
        address: &WalletAddress,
    ) -> Result<ProtocolList, FetchError>;

    /// ERC-20 balances held on one chain
    async fn get_tokens(
        &self,
        chain_id: u64,
        address: &WalletAddress,
    ) -> Result<Vec<TokenDetails>, FetchError>;

    /// Portfolio value over time on one chain
    async fn get_value_chart(
        &self,
        chain_id: u64,
        address: &WalletAddress,
        timerange: TimeRange,
    ) -> Result<Vec<ValuePoint>, FetchError>;
}

/// Server-side aggregation backend.
#[async_trait]
pub trait BackendSource: Send + Sync {
    /// Kicks off server-side aggregation for every chain
    async fn trigger_fetch_all(&self, address: &WalletAddress) -> Result<(), FetchError>;

    /// Current consolidated state, possibly with chains still in progress
    async fn get_portfolio(&self, address: &WalletAddress) -> Result<BackendPortfolio, FetchError>;

    async fn get_transactions(&self, address: &WalletAddress) -> Result<Vec<Value>, FetchError>;

    async fn create_webhook(
        &self,
        request: &WebhookRequest,
    ) -> Result<WebhookResponse, FetchError>;
}

/// Chain indexer addressed by network name (`ethereum`, `base`, ...).
#[async_trait]
pub trait ChainIndexSource: Send + Sync {
    async fn native_balance(
        &self,
        network: &str,
        address: &WalletAddress,
    ) -> Result<NativeBalance, FetchError>;

    async fn tokens_owned(
        &self,
        network: &str,
        address: &WalletAddress,
    ) -> Result<Page<OwnedToken>, FetchError>;

    /// Transfers of the given token contracts in or out of `address`,
    /// genesis to latest, zero-value transfers excluded
    async fn token_transfers(
        &self,
        network: &str,
        address: &WalletAddress,
        contracts: &[String],
    ) -> Result<Page<TokenTransfer>, FetchError>;
}

/// Token metadata and quotes.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Listing for a token contract; `None` when the API knows no such token
    async fn token_info(
        &self,
        contract_address: &str,
    ) -> Result<Option<MarketListing>, FetchError>;

    /// Latest USD quote for a listing id
    async fn latest_quote(&self, id: u64) -> Result<Option<MarketListing>, FetchError>;
}

/// Every upstream the service talks to.
#[derive(Clone)]
pub struct Upstreams {
    pub portfolio: Arc<dyn PortfolioSource>,
    pub backend: Arc<dyn BackendSource>,
    pub index: Arc<dyn ChainIndexSource>,
    pub market: Arc<dyn MarketDataSource>,
}

/// Maps 429 to `RateLimited` (honouring `Retry-After` seconds) and any other
/// non-success status to `Upstream` with the body text.
pub(crate) async fn check_response(response: Response) -> Result<Response, FetchError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(FetchError::RateLimited { retry_after });
    }

    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(FetchError::Upstream {
            status: status.as_u16(),
            body: error_text,
        });
    }

    Ok(response)
}
