//! In-memory sources for exercising the pipeline without HTTP.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::address::WalletAddress;
use crate::datasource::types::{
    BackendChain, BackendChainStatus, BackendPortfolio, MarketListing, NativeBalance, OwnedToken,
    Page, ProtocolList, ProtocolRecord, TimeRange, TokenContract, TokenDetails, TokenTransfer,
    ValuePoint, WebhookRequest, WebhookResponse,
};
use crate::datasource::{BackendSource, ChainIndexSource, MarketDataSource, PortfolioSource};
use crate::error::FetchError;

pub fn wallet() -> WalletAddress {
    WalletAddress::parse("0xABCDEF0000000000000000000000000000000001").unwrap()
}

pub fn record(chain_id: u64, name: &str, value_usd: f64) -> ProtocolRecord {
    ProtocolRecord {
        chain_id: Some(chain_id),
        contract_address: format!("0x{}", name.to_lowercase()),
        name: Some(name.to_string()),
        protocol_name: Some(name.to_string()),
        value_usd: Some(value_usd),
        ..Default::default()
    }
}

#[derive(Clone)]
pub enum ChainScript {
    Ok(ProtocolList),
    FailAlways(FetchError),
    /// Fails `n` times, then returns the list
    FailTimes(u32, ProtocolList),
}

#[derive(Default)]
pub struct ScriptedSource {
    scripts: HashMap<u64, ChainScript>,
    tokens: HashMap<u64, Vec<TokenDetails>>,
    charts: HashMap<u64, Vec<ValuePoint>>,
    attempts: Mutex<HashMap<u64, u32>>,
    calls: Mutex<Vec<(u64, Instant)>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chain(mut self, chain_id: u64, script: ChainScript) -> Self {
        self.scripts.insert(chain_id, script);
        self
    }

    pub fn with_tokens(mut self, chain_id: u64, tokens: Vec<TokenDetails>) -> Self {
        self.tokens.insert(chain_id, tokens);
        self
    }

    pub fn with_chart(mut self, chain_id: u64, points: Vec<ValuePoint>) -> Self {
        self.charts.insert(chain_id, points);
        self
    }

    /// Every call in order, with the (virtual) time it was made.
    pub fn calls(&self) -> Vec<(u64, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn attempts(&self, chain_id: u64) -> u32 {
        self.attempts.lock().unwrap().get(&chain_id).copied().unwrap_or(0)
    }

    fn note_call(&self, chain_id: u64) -> u32 {
        self.calls.lock().unwrap().push((chain_id, Instant::now()));
        let mut attempts = self.attempts.lock().unwrap();
        let count = attempts.entry(chain_id).or_insert(0);
        *count += 1;
        *count
    }
}

#[async_trait]
impl PortfolioSource for ScriptedSource {
    async fn get_protocols(
        &self,
        chain_id: u64,
        _address: &WalletAddress,
    ) -> Result<ProtocolList, FetchError> {
        let attempt = self.note_call(chain_id);
        match self.scripts.get(&chain_id) {
            None => Ok(Vec::new()),
            Some(ChainScript::Ok(list)) => Ok(list.clone()),
            Some(ChainScript::FailAlways(err)) => Err(err.clone()),
            Some(ChainScript::FailTimes(n, list)) => {
                if attempt <= *n {
                    Err(FetchError::Network("connection reset".into()))
                } else {
                    Ok(list.clone())
                }
            }
        }
    }

    async fn get_tokens(
        &self,
        chain_id: u64,
        _address: &WalletAddress,
    ) -> Result<Vec<TokenDetails>, FetchError> {
        self.note_call(chain_id);
        self.tokens.get(&chain_id).cloned().ok_or(FetchError::Upstream {
            status: 500,
            body: "no tokens scripted".into(),
        })
    }

    async fn get_value_chart(
        &self,
        chain_id: u64,
        _address: &WalletAddress,
        _timerange: TimeRange,
    ) -> Result<Vec<ValuePoint>, FetchError> {
        self.note_call(chain_id);
        self.charts.get(&chain_id).cloned().ok_or(FetchError::Upstream {
            status: 500,
            body: "no chart scripted".into(),
        })
    }
}

/// Backend whose chains complete one poll at a time.
pub struct ScriptedBackend {
    pub chain_ids: Vec<u64>,
    /// Polls needed before every chain reports completed; `None` never completes
    pub completes_after: Option<u32>,
    pub triggers: Mutex<u32>,
    pub polls: Mutex<u32>,
    pub webhooks: Mutex<Vec<WebhookRequest>>,
}

impl ScriptedBackend {
    pub fn new(chain_ids: Vec<u64>, completes_after: Option<u32>) -> Self {
        Self {
            chain_ids,
            completes_after,
            triggers: Mutex::new(0),
            polls: Mutex::new(0),
            webhooks: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl BackendSource for ScriptedBackend {
    async fn trigger_fetch_all(&self, _address: &WalletAddress) -> Result<(), FetchError> {
        *self.triggers.lock().unwrap() += 1;
        Ok(())
    }

    async fn get_portfolio(&self, address: &WalletAddress) -> Result<BackendPortfolio, FetchError> {
        let poll = {
            let mut polls = self.polls.lock().unwrap();
            *polls += 1;
            *polls
        };
        let done = self.completes_after.is_some_and(|n| poll >= n);
        let chains = self
            .chain_ids
            .iter()
            .enumerate()
            .map(|(i, id)| BackendChain {
                chain_id: Some(*id),
                status: if done || i == 0 {
                    BackendChainStatus::Completed
                } else {
                    BackendChainStatus::InProgress
                },
                extra: Default::default(),
            })
            .collect();

        let mut extra = serde_json::Map::new();
        extra.insert("address".into(), json!(address));
        Ok(BackendPortfolio { chains, extra })
    }

    async fn get_transactions(&self, _address: &WalletAddress) -> Result<Vec<Value>, FetchError> {
        Ok(vec![json!({ "hash": "0xfeed" })])
    }

    async fn create_webhook(
        &self,
        request: &WebhookRequest,
    ) -> Result<WebhookResponse, FetchError> {
        let mut sent = self.webhooks.lock().unwrap();
        sent.push(request.clone());
        Ok(WebhookResponse {
            id: format!("wh_{}", sent.len()),
            addresses: request.addresses.clone(),
            webhook_url: request.webhook_url.clone(),
            created_at: "2025-01-01T00:00:00Z".into(),
        })
    }
}

pub fn token_contract(symbol: &str) -> TokenContract {
    TokenContract {
        address: format!("0x{}", symbol.to_lowercase()),
        deployed_transaction_hash: None,
        deployed_at: None,
        deployer_address: None,
        logo_url: None,
        kind: Some("ERC20".into()),
        name: symbol.to_string(),
        symbol: symbol.to_string(),
        total_supply: None,
        decimals: Some(18),
    }
}

/// Chain indexer answering from fixed per-network data. Networks without a
/// scripted balance or token list fail with a 500.
#[derive(Default)]
pub struct ScriptedIndex {
    balances: HashMap<String, String>,
    tokens: HashMap<String, usize>,
    attempts: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<(String, Instant)>>,
    transfer_queries: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(mut self, network: &str, balance: &str) -> Self {
        self.balances.insert(network.to_string(), balance.to_string());
        self
    }

    /// `count` tokens owned on `network`
    pub fn with_tokens(mut self, network: &str, count: usize) -> Self {
        self.tokens.insert(network.to_string(), count);
        self
    }

    pub fn attempts(&self, network: &str) -> u32 {
        self.attempts.lock().unwrap().get(network).copied().unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_transfer_query(&self) -> Option<(String, Vec<String>)> {
        self.transfer_queries.lock().unwrap().last().cloned()
    }

    fn note_call(&self, network: &str) {
        self.calls.lock().unwrap().push((network.to_string(), Instant::now()));
        *self.attempts.lock().unwrap().entry(network.to_string()).or_insert(0) += 1;
    }

    fn unscripted(what: &str) -> FetchError {
        FetchError::Upstream {
            status: 500,
            body: format!("no {} scripted", what),
        }
    }
}

#[async_trait]
impl ChainIndexSource for ScriptedIndex {
    async fn native_balance(
        &self,
        network: &str,
        _address: &WalletAddress,
    ) -> Result<NativeBalance, FetchError> {
        self.note_call(network);
        let balance = self
            .balances
            .get(network)
            .ok_or_else(|| Self::unscripted("balance"))?;
        Ok(NativeBalance {
            balance: balance.clone(),
            symbol: String::new(),
            decimals: 18,
        })
    }

    async fn tokens_owned(
        &self,
        network: &str,
        address: &WalletAddress,
    ) -> Result<Page<OwnedToken>, FetchError> {
        self.note_call(network);
        let count = *self.tokens.get(network).ok_or_else(|| Self::unscripted("tokens"))?;
        Ok(Page {
            rpp: 1000,
            cursor: None,
            items: (0..count)
                .map(|i| OwnedToken {
                    owner_address: address.to_string(),
                    balance: (i + 1).to_string(),
                    contract: token_contract(&format!("TK{}", i)),
                })
                .collect(),
        })
    }

    async fn token_transfers(
        &self,
        network: &str,
        address: &WalletAddress,
        contracts: &[String],
    ) -> Result<Page<TokenTransfer>, FetchError> {
        self.note_call(network);
        self.transfer_queries
            .lock()
            .unwrap()
            .push((network.to_string(), contracts.to_vec()));
        Ok(Page {
            rpp: 20,
            cursor: None,
            items: vec![TokenTransfer {
                from: "0x0000000000000000000000000000000000000000".into(),
                to: address.to_string(),
                value: "1000".into(),
                timestamp: 1_700_000_000,
                block_number: "1".into(),
                transaction_hash: "0xtx".into(),
                log_index: 0,
                contract: token_contract("USDC"),
            }],
        })
    }
}

/// Market data keyed by contract (info) and listing id (quotes).
#[derive(Default)]
pub struct ScriptedMarket {
    info: HashMap<String, MarketListing>,
    quotes: HashMap<u64, MarketListing>,
}

impl ScriptedMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_info(mut self, contract: &str, listing: MarketListing) -> Self {
        self.info.insert(contract.to_string(), listing);
        self
    }

    pub fn with_quote(mut self, id: u64, listing: MarketListing) -> Self {
        self.quotes.insert(id, listing);
        self
    }
}

#[async_trait]
impl MarketDataSource for ScriptedMarket {
    async fn token_info(
        &self,
        contract_address: &str,
    ) -> Result<Option<MarketListing>, FetchError> {
        Ok(self.info.get(contract_address).cloned())
    }

    async fn latest_quote(&self, id: u64) -> Result<Option<MarketListing>, FetchError> {
        Ok(self.quotes.get(&id).cloned())
    }
}
