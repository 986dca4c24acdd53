use serde::{Deserialize, Serialize};

use crate::datasource::types::{ProtocolList, ProtocolRecord, TokenAmount};

/// A protocol holding on one chain.
///
/// `value_usd` is the upstream figure, never recomputed from the tokens.
/// Optional yield figures stay `None` when upstream did not report them;
/// use the `*_sort` accessors for arithmetic and `display_*` for output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub chain_id: u64,
    pub name: Option<String>,
    pub protocol_name: String,
    pub contract_address: String,
    pub value_usd: f64,
    pub underlying_tokens: Vec<TokenAmount>,
    pub reward_tokens: Vec<TokenAmount>,
    pub roi: Option<f64>,
    pub weighted_apr: Option<f64>,
    pub holding_time_days: Option<f64>,
    pub profit_abs_usd: Option<f64>,
}

/// Missing figures count as zero when sorting or summing.
pub fn sort_value(value: Option<f64>) -> f64 {
    value.unwrap_or(0.0)
}

fn display_ratio(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}%", v * 100.0),
        None => "N/A".to_string(),
    }
}

impl Position {
    pub fn from_record(chain_id: u64, record: ProtocolRecord) -> Self {
        let info = record.info.unwrap_or_default();
        let protocol_name = record
            .protocol_name
            .clone()
            .or_else(|| record.protocol.clone())
            .or_else(|| record.name.clone())
            .unwrap_or_default();

        Self {
            chain_id,
            name: record.name,
            protocol_name,
            contract_address: record.contract_address,
            value_usd: record.value_usd.unwrap_or(0.0),
            underlying_tokens: record.underlying_tokens,
            reward_tokens: record.rewards_tokens,
            roi: record.roi.or(info.roi),
            weighted_apr: record.weighted_apr.or(info.weighted_apr),
            holding_time_days: record.holding_time_days.or(info.holding_time_days),
            profit_abs_usd: record.profit_abs_usd.or(info.profit_abs_usd),
        }
    }

    /// Name used for ordering; missing sorts as empty.
    pub fn sort_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Combined `weighted_apr + roi` score the "ROI" orderings use.
    pub fn yield_score(&self) -> f64 {
        sort_value(self.weighted_apr) + sort_value(self.roi)
    }

    pub fn holding_time_sort(&self) -> f64 {
        sort_value(self.holding_time_days)
    }

    pub fn display_roi(&self) -> String {
        display_ratio(self.roi)
    }

    pub fn display_apr(&self) -> String {
        display_ratio(self.weighted_apr)
    }

    pub fn display_holding_time(&self) -> String {
        match self.holding_time_days {
            Some(days) => format!("{:.0} days", days),
            None => "N/A".to_string(),
        }
    }
}

/// Flattens per-chain protocol lists into one collection of positions.
pub struct PortfolioMerger;

impl PortfolioMerger {
    pub fn new() -> Self {
        Self
    }

    /// Output follows the order chains are given in; records keep their
    /// upstream order within a chain. The chain a list was fetched for is
    /// the position's chain, whatever the record itself claims. Nothing is
    /// deduplicated.
    pub fn merge<I>(&self, chain_results: I) -> Vec<Position>
    where
        I: IntoIterator<Item = (u64, ProtocolList)>,
    {
        chain_results
            .into_iter()
            .flat_map(|(chain_id, records)| {
                records
                    .into_iter()
                    .map(move |record| Position::from_record(chain_id, record))
            })
            .collect()
    }
}

impl Default for PortfolioMerger {
    fn default() -> Self {
        Self::new()
    }
}
