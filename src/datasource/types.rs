use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{result, meta}` wrapper every portfolio API response arrives in.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub result: T,
    #[serde(default)]
    pub meta: Option<EnvelopeMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvelopeMeta {
    pub cached_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenAmount {
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub decimals: Option<u8>,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub price_to_usd: f64,
    #[serde(default)]
    pub value_usd: f64,
}

/// Yield figures some upstream records nest under `info`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolInfo {
    #[serde(default)]
    pub weighted_apr: Option<f64>,
    #[serde(default)]
    pub roi: Option<f64>,
    #[serde(default)]
    pub holding_time_days: Option<f64>,
    #[serde(default)]
    pub profit_abs_usd: Option<f64>,
}

/// One protocol holding as returned by the protocols-details endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolRecord {
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub contract_address: String,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub protocol_name: Option<String>,
    #[serde(default)]
    pub value_usd: Option<f64>,
    #[serde(default)]
    pub underlying_tokens: Vec<TokenAmount>,
    #[serde(default, alias = "reward_tokens")]
    pub rewards_tokens: Vec<TokenAmount>,
    #[serde(default)]
    pub profit_abs_usd: Option<f64>,
    #[serde(default)]
    pub roi: Option<f64>,
    #[serde(default)]
    pub weighted_apr: Option<f64>,
    #[serde(default)]
    pub holding_time_days: Option<f64>,
    #[serde(default)]
    pub info: Option<ProtocolInfo>,
}

pub type ProtocolList = Vec<ProtocolRecord>;

/// One ERC-20 balance from the erc20-details endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenDetails {
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub contract_address: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub price_to_usd: f64,
    #[serde(default)]
    pub value_usd: f64,
    #[serde(default)]
    pub abs_profit_usd: Option<f64>,
    #[serde(default)]
    pub roi: Option<f64>,
    #[serde(default)]
    pub status: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuePoint {
    pub timestamp: i64,
    pub value_usd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "1day")]
    OneDay,
    #[serde(rename = "1week")]
    OneWeek,
    #[default]
    #[serde(rename = "1month")]
    OneMonth,
    #[serde(rename = "1year")]
    OneYear,
    #[serde(rename = "3years")]
    ThreeYears,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::OneDay => "1day",
            TimeRange::OneWeek => "1week",
            TimeRange::OneMonth => "1month",
            TimeRange::OneYear => "1year",
            TimeRange::ThreeYears => "3years",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendChainStatus {
    Completed,
    InProgress,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendChain {
    #[serde(default)]
    pub chain_id: Option<u64>,
    pub status: BackendChainStatus,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Consolidated result served by the aggregation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendPortfolio {
    pub chains: Vec<BackendChain>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl BackendPortfolio {
    pub fn completed_chains(&self) -> usize {
        self.chains
            .iter()
            .filter(|c| c.status == BackendChainStatus::Completed)
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.completed_chains() == self.chains.len()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionsResponse {
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub cache_counter: Option<i64>,
}

/// Native coin balance on one indexed network, as a raw integer string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeBalance {
    pub balance: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

fn default_decimals() -> u8 {
    18
}

/// Token contract metadata the chain indexer attaches to balances and transfers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenContract {
    pub address: String,
    #[serde(default)]
    pub deployed_transaction_hash: Option<String>,
    #[serde(default)]
    pub deployed_at: Option<String>,
    #[serde(default)]
    pub deployer_address: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub total_supply: Option<String>,
    #[serde(default)]
    pub decimals: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedToken {
    pub owner_address: String,
    pub balance: String,
    pub contract: TokenContract,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    pub from: String,
    pub to: String,
    /// Raw amount in the token's smallest unit
    pub value: String,
    pub timestamp: i64,
    pub block_number: String,
    pub transaction_hash: String,
    #[serde(default)]
    pub log_index: u32,
    pub contract: TokenContract,
}

/// Cursor-paged list as returned by the chain indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub rpp: u32,
    #[serde(default)]
    pub cursor: Option<String>,
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsdQuote {
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub percent_change_24h: f64,
    #[serde(default)]
    pub market_cap: f64,
    #[serde(default)]
    pub volume_24h: f64,
}

/// One cryptocurrency entry from the market data API. `quote` is only
/// present on quote lookups, keyed by convert currency.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MarketListing {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub quote: BTreeMap<String, UsdQuote>,
}

/// `{data: {<key>: listing}}` wrapper of the market data API.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketResponse {
    #[serde(default)]
    pub data: BTreeMap<String, MarketListing>,
}

impl MarketResponse {
    /// First listing by key, or `None` when the lookup matched nothing.
    pub fn into_first(self) -> Option<MarketListing> {
        self.data.into_values().next()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    pub addresses: Vec<String>,
    pub webhook_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub id: String,
    pub addresses: Vec<String>,
    pub webhook_url: String,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn protocol_record_tolerates_nulls_and_nested_info() {
        let raw = json!({
            "chain_id": 1,
            "contract_address": "0xpool",
            "name": "Aave V3 USDC",
            "protocol_name": "Aave",
            "value_usd": 150.5,
            "roi": null,
            "info": { "weighted_apr": 0.04, "roi": 0.12, "holding_time_days": 30.0 },
            "reward_tokens": [{ "symbol": "AAVE", "amount": 1.0, "value_usd": 90.0 }]
        });
        let record: ProtocolRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(record.roi, None);
        assert_eq!(record.info.as_ref().and_then(|i| i.roi), Some(0.12));
        assert_eq!(record.rewards_tokens.len(), 1);
        assert!(record.underlying_tokens.is_empty());
    }

    #[test]
    fn backend_portfolio_completion() {
        let raw = json!({
            "address": "0xabc",
            "chains": [
                { "chain_id": 1, "status": "completed" },
                { "chain_id": 137, "status": "in_progress" }
            ]
        });
        let portfolio: BackendPortfolio = serde_json::from_value(raw).unwrap();
        assert_eq!(portfolio.completed_chains(), 1);
        assert!(!portfolio.is_complete());
        assert_eq!(portfolio.extra.get("address"), Some(&json!("0xabc")));
    }

    #[test]
    fn owned_tokens_decode_camel_case() {
        let raw = json!({
            "rpp": 100,
            "cursor": null,
            "items": [{
                "ownerAddress": "0xowner",
                "balance": "2500000",
                "contract": {
                    "address": "0xusdc",
                    "deployedTransactionHash": "0xdeploy",
                    "type": "ERC20",
                    "name": "USD Coin",
                    "symbol": "USDC",
                    "totalSupply": "1000000000",
                    "decimals": 6
                }
            }]
        });
        let page: Page<OwnedToken> = serde_json::from_value(raw).unwrap();
        assert_eq!(page.items[0].contract.kind.as_deref(), Some("ERC20"));
        assert_eq!(page.items[0].contract.decimals, Some(6));
        assert_eq!(page.items[0].balance, "2500000");
    }

    #[test]
    fn market_response_takes_first_listing() {
        let raw = json!({
            "data": {
                "3408": {
                    "id": 3408,
                    "name": "USDC",
                    "symbol": "USDC",
                    "quote": { "USD": { "price": 1.0, "percent_change_24h": 0.01 } }
                }
            }
        });
        let listing = serde_json::from_value::<MarketResponse>(raw)
            .unwrap()
            .into_first()
            .unwrap();
        assert_eq!(listing.id, 3408);
        assert_eq!(listing.quote["USD"].price, 1.0);
        assert_eq!(listing.quote["USD"].market_cap, 0.0);

        let empty: MarketResponse = serde_json::from_value(json!({ "data": {} })).unwrap();
        assert!(empty.into_first().is_none());
    }

    #[test]
    fn native_balance_defaults_to_eighteen_decimals() {
        let balance: NativeBalance = serde_json::from_value(json!({ "balance": "42" })).unwrap();
        assert_eq!(balance.decimals, 18);
        assert!(balance.symbol.is_empty());
    }

    #[test]
    fn time_range_wire_names() {
        let range: TimeRange = serde_json::from_str("\"3years\"").unwrap();
        assert_eq!(range, TimeRange::ThreeYears);
        assert_eq!(TimeRange::OneWeek.as_str(), "1week");
    }
}
