use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::address::WalletAddress;
use crate::chains::ChainRequestSpec;
use crate::datasource::types::{TimeRange, ValuePoint};
use crate::datasource::PortfolioSource;
use crate::services::queue::RateLimitedQueue;
use crate::services::retry::RetryPolicy;

/// Value series of one chain over the requested range.
#[derive(Debug, Clone, Serialize)]
pub struct ChainSeries {
    pub chain_id: u64,
    pub display_name: String,
    pub points: Vec<ValuePoint>,
}

/// Values of every chain that reported one at `timestamp` (unix seconds).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRow {
    pub timestamp: i64,
    pub values: BTreeMap<u64, f64>,
    pub total_usd: f64,
}

impl HistoryRow {
    pub fn date(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValueHistory {
    pub address: WalletAddress,
    pub timerange: TimeRange,
    pub series: Vec<ChainSeries>,
    pub rows: Vec<HistoryRow>,
    pub failed_chains: Vec<u64>,
}

/// Joins per-chain series on the union of their timestamps, ascending.
pub fn merge_series(series: &[ChainSeries]) -> Vec<HistoryRow> {
    let mut rows: BTreeMap<i64, BTreeMap<u64, f64>> = BTreeMap::new();
    for chain in series {
        for point in &chain.points {
            rows.entry(point.timestamp)
                .or_default()
                .insert(chain.chain_id, point.value_usd);
        }
    }

    rows.into_iter()
        .map(|(timestamp, values)| HistoryRow {
            timestamp,
            total_usd: values.values().sum(),
            values,
        })
        .collect()
}

pub struct HistoryService {
    source: Arc<dyn PortfolioSource>,
    queue: Arc<RateLimitedQueue>,
    retry: RetryPolicy,
    chains: Vec<ChainRequestSpec>,
}

impl HistoryService {
    pub fn new(
        source: Arc<dyn PortfolioSource>,
        queue: Arc<RateLimitedQueue>,
        retry: RetryPolicy,
        chains: Vec<ChainRequestSpec>,
    ) -> Self {
        Self {
            source,
            queue,
            retry,
            chains,
        }
    }

    /// Fetches the value chart chain by chain. A chain that keeps failing
    /// is left out of the series and listed in `failed_chains`.
    pub async fn value_history(
        &self,
        address: &WalletAddress,
        timerange: TimeRange,
    ) -> ValueHistory {
        tracing::info!(
            "Fetching {} value history for {}",
            timerange.as_str(),
            address.short()
        );

        let mut series = Vec::new();
        let mut failed_chains = Vec::new();

        for chain in &self.chains {
            let label = format!("value_chart[{}]", chain.display_name);
            let (queue, source, chain_id) = (&self.queue, &self.source, chain.chain_id);
            let outcome = self
                .retry
                .run(&label, |_| {
                    queue.enqueue(move || source.get_value_chart(chain_id, address, timerange))
                })
                .await;

            match outcome {
                Ok(points) => series.push(ChainSeries {
                    chain_id,
                    display_name: chain.display_name.to_string(),
                    points,
                }),
                Err(failure) => {
                    tracing::warn!("Skipping {} in value history: {}", chain.display_name, failure);
                    failed_chains.push(chain_id);
                }
            }
        }

        let rows = merge_series(&series);
        ValueHistory {
            address: address.clone(),
            timerange,
            series,
            rows,
            failed_chains,
        }
    }
}
