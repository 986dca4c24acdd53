use std::sync::Arc;

use serde::Serialize;

use crate::address::WalletAddress;
use crate::chains::chain_name;
use crate::datasource::types::TokenDetails;
use crate::datasource::PortfolioSource;
use crate::error::AppResult;
use crate::services::queue::RateLimitedQueue;
use crate::services::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize)]
pub struct ChainToken {
    pub chain_name: String,
    #[serde(flatten)]
    pub details: TokenDetails,
}

pub struct TokenService {
    source: Arc<dyn PortfolioSource>,
    queue: Arc<RateLimitedQueue>,
    retry: RetryPolicy,
}

impl TokenService {
    pub fn new(
        source: Arc<dyn PortfolioSource>,
        queue: Arc<RateLimitedQueue>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            queue,
            retry,
        }
    }

    /// ERC-20 balances on one chain, each tagged with the chain's name
    pub async fn chain_tokens(
        &self,
        chain_id: u64,
        address: &WalletAddress,
    ) -> AppResult<Vec<ChainToken>> {
        let name = chain_name(chain_id);
        tracing::info!("Fetching tokens on {} for {}", name, address.short());

        let (queue, source) = (&self.queue, &self.source);
        let tokens = self
            .retry
            .run(&format!("erc20[{}]", name), |_| {
                queue.enqueue(move || source.get_tokens(chain_id, address))
            })
            .await?;

        tracing::info!("Fetched {} tokens on {}", tokens.len(), name);
        Ok(tokens
            .into_iter()
            .map(|mut details| {
                details.chain_id = Some(chain_id);
                ChainToken {
                    chain_name: name.clone(),
                    details,
                }
            })
            .collect())
    }
}
