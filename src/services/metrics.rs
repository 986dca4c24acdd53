use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::services::merger::Position;

/// Groups beyond this many are left out of the allocation breakdown.
pub const MAX_ALLOCATION_GROUPS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolAllocation {
    pub protocol_name: String,
    pub value_usd: BigDecimal,
    pub percent_of_total: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub total_value_usd: BigDecimal,
    pub count_positions: usize,
    /// Largest groups first, at most `MAX_ALLOCATION_GROUPS`
    pub allocation_by_protocol_name: Vec<ProtocolAllocation>,
    /// Groups cut from the breakdown; their value is not bucketed anywhere
    pub omitted_groups: usize,
    pub total_profit_usd: BigDecimal,
    pub weighted_roi: Option<BigDecimal>,
}

/// Exact decimal for an upstream float, via its shortest decimal form.
pub fn usd(value: f64) -> BigDecimal {
    if !value.is_finite() {
        return BigDecimal::from(0);
    }
    BigDecimal::from_str(&value.to_string()).unwrap_or_default()
}

pub struct PortfolioMetrics;

impl PortfolioMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Summarizes exactly the positions given; no filtering happens here.
    pub fn summarize(&self, positions: &[Position]) -> PortfolioSummary {
        let mut total_value_usd = BigDecimal::from(0);
        let mut total_profit_usd = BigDecimal::from(0);
        let mut roi_weighted_sum = BigDecimal::from(0);
        let mut roi_weight = BigDecimal::from(0);
        let mut roi_known = false;

        let mut group_order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, BigDecimal> = HashMap::new();

        for position in positions {
            let value = usd(position.value_usd);
            total_value_usd = &total_value_usd + &value;

            if let Some(profit) = position.profit_abs_usd {
                total_profit_usd = &total_profit_usd + usd(profit);
            }

            if let Some(roi) = position.roi {
                roi_known = true;
                roi_weighted_sum = &roi_weighted_sum + usd(roi) * &value;
                roi_weight = &roi_weight + &value;
            }

            let entry = groups
                .entry(position.protocol_name.clone())
                .or_insert_with(|| {
                    group_order.push(position.protocol_name.clone());
                    BigDecimal::from(0)
                });
            *entry = &*entry + &value;
        }

        let mut allocation: Vec<ProtocolAllocation> = group_order
            .into_iter()
            .map(|name| {
                let value_usd = groups.remove(&name).unwrap_or_default();
                let percent_of_total = if total_value_usd.is_zero() {
                    BigDecimal::from(0)
                } else {
                    (&value_usd * BigDecimal::from(100) / &total_value_usd).round(4)
                };
                ProtocolAllocation {
                    protocol_name: name,
                    value_usd,
                    percent_of_total,
                }
            })
            .collect();

        // stable: equal groups stay in first-seen order
        allocation.sort_by(|a, b| b.value_usd.cmp(&a.value_usd));
        let omitted_groups = allocation.len().saturating_sub(MAX_ALLOCATION_GROUPS);
        allocation.truncate(MAX_ALLOCATION_GROUPS);

        let weighted_roi = if roi_known && !roi_weight.is_zero() {
            Some((roi_weighted_sum / roi_weight).round(6))
        } else {
            None
        };

        PortfolioSummary {
            total_value_usd,
            count_positions: positions.len(),
            allocation_by_protocol_name: allocation,
            omitted_groups,
            total_profit_usd,
            weighted_roi,
        }
    }
}

impl Default for PortfolioMetrics {
    fn default() -> Self {
        Self::new()
    }
}
