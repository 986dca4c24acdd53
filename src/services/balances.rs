use std::sync::Arc;

use serde::Serialize;

use crate::address::WalletAddress;
use crate::chains::{find_network, IndexedNetwork};
use crate::datasource::types::{NativeBalance, OwnedToken, Page, TokenTransfer};
use crate::datasource::ChainIndexSource;
use crate::error::{AppError, AppResult};
use crate::services::queue::RateLimitedQueue;
use crate::services::retry::RetryPolicy;

/// Native balance on one network. `fetched` is false when every attempt
/// failed and the zero placeholder was substituted.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkBalance {
    pub network: &'static str,
    pub chain_id: u64,
    #[serde(flatten)]
    pub balance: NativeBalance,
    pub fetched: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkTokens {
    pub network: &'static str,
    pub chain_id: u64,
    pub tokens: Vec<OwnedToken>,
    pub fetched: bool,
}

fn placeholder_balance(network: &IndexedNetwork) -> NativeBalance {
    NativeBalance {
        balance: "0".to_string(),
        symbol: network.native_symbol.to_string(),
        decimals: 18,
    }
}

/// Balance and transfer lookups on the chain indexer.
///
/// Multichain lookups walk the networks one at a time through the queue;
/// a network that keeps failing yields an empty placeholder instead of
/// failing the whole lookup.
pub struct BalanceService {
    source: Arc<dyn ChainIndexSource>,
    queue: Arc<RateLimitedQueue>,
    retry: RetryPolicy,
    networks: Vec<IndexedNetwork>,
}

impl BalanceService {
    pub fn new(
        source: Arc<dyn ChainIndexSource>,
        queue: Arc<RateLimitedQueue>,
        retry: RetryPolicy,
        networks: Vec<IndexedNetwork>,
    ) -> Self {
        Self {
            source,
            queue,
            retry,
            networks,
        }
    }

    pub async fn native_balances(&self, address: &WalletAddress) -> Vec<NetworkBalance> {
        tracing::info!(
            "Fetching native balances for {} on {} networks",
            address.short(),
            self.networks.len()
        );

        let mut balances = Vec::with_capacity(self.networks.len());
        for network in &self.networks {
            let (queue, source, name) = (&self.queue, &self.source, network.name);
            let outcome = self
                .retry
                .run(&format!("native[{}]", name), |_| {
                    queue.enqueue(move || source.native_balance(name, address))
                })
                .await;

            let (balance, fetched) = match outcome {
                Ok(mut balance) => {
                    if balance.symbol.is_empty() {
                        balance.symbol = network.native_symbol.to_string();
                    }
                    (balance, true)
                }
                Err(failure) => {
                    tracing::warn!("Native balance on {} unavailable: {}", name, failure);
                    (placeholder_balance(network), false)
                }
            };
            balances.push(NetworkBalance {
                network: name,
                chain_id: network.chain_id,
                balance,
                fetched,
            });
        }
        balances
    }

    pub async fn token_balances(&self, address: &WalletAddress) -> Vec<NetworkTokens> {
        tracing::info!("Fetching token balances for {}", address.short());

        let mut results = Vec::with_capacity(self.networks.len());
        for network in &self.networks {
            let (queue, source, name) = (&self.queue, &self.source, network.name);
            let outcome = self
                .retry
                .run(&format!("tokens_owned[{}]", name), |_| {
                    queue.enqueue(move || source.tokens_owned(name, address))
                })
                .await;

            let (tokens, fetched) = match outcome {
                Ok(page) => (page.items, true),
                Err(failure) => {
                    tracing::warn!("Token balances on {} unavailable: {}", name, failure);
                    (Vec::new(), false)
                }
            };
            results.push(NetworkTokens {
                network: name,
                chain_id: network.chain_id,
                tokens,
                fetched,
            });
        }
        results
    }

    /// Transfer history of specific token contracts on one network.
    pub async fn token_transfers(
        &self,
        network: &str,
        address: &WalletAddress,
        contracts: &[String],
    ) -> AppResult<Page<TokenTransfer>> {
        let network = find_network(network)
            .filter(|n| self.networks.iter().any(|known| known.name == n.name))
            .ok_or_else(|| {
                AppError::ValidationError(format!("Unsupported network: {}", network))
            })?;
        if contracts.is_empty() {
            return Err(AppError::ValidationError(
                "At least one token contract is required".to_string(),
            ));
        }
        let contracts = contracts
            .iter()
            .map(|c| WalletAddress::parse(c).map(|a| a.to_string()))
            .collect::<Result<Vec<_>, _>>()?;

        let (queue, source, name) = (&self.queue, &self.source, network.name);
        let contracts = &contracts;
        let page = self
            .retry
            .run(&format!("transfers[{}]", name), |_| {
                queue.enqueue(move || source.token_transfers(name, address, contracts))
            })
            .await?;

        tracing::debug!(
            "{} transfers on {} for {}",
            page.items.len(),
            name,
            address.short()
        );
        Ok(page)
    }
}
