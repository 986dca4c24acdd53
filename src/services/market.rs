use std::sync::Arc;

use serde::Serialize;

use crate::datasource::types::UsdQuote;
use crate::datasource::MarketDataSource;
use crate::error::{AppError, AppResult};
use crate::services::queue::RateLimitedQueue;
use crate::services::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenMarketData {
    pub id: u64,
    pub name: String,
    pub symbol: String,
    pub description: Option<String>,
    pub logo: Option<String>,
    pub quote: UsdQuote,
}

pub struct MarketService {
    source: Arc<dyn MarketDataSource>,
    queue: Arc<RateLimitedQueue>,
    retry: RetryPolicy,
}

impl MarketService {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        queue: Arc<RateLimitedQueue>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            queue,
            retry,
        }
    }

    /// Resolves the contract to a listing, then fetches that listing's
    /// latest USD quote. Metadata comes from the first lookup, the quote
    /// from the second.
    pub async fn token_market_data(&self, contract_address: &str) -> AppResult<TokenMarketData> {
        let (queue, source) = (&self.queue, &self.source);

        let listing = self
            .retry
            .run("market info", |_| {
                queue.enqueue(move || source.token_info(contract_address))
            })
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Token not found: {}", contract_address))
            })?;

        let id = listing.id;
        let quote = self
            .retry
            .run("market quote", |_| queue.enqueue(move || source.latest_quote(id)))
            .await?
            .and_then(|mut quoted| quoted.quote.remove("USD"))
            .ok_or_else(|| {
                AppError::NotFound(format!("Market data not found for {}", listing.symbol))
            })?;

        tracing::debug!("{} quoted at {} USD", listing.symbol, quote.price);
        Ok(TokenMarketData {
            id,
            name: listing.name,
            symbol: listing.symbol,
            description: listing.description,
            logo: listing.logo,
            quote,
        })
    }
}
