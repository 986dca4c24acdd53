use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::services::merger::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortPolicy {
    #[default]
    ValueDesc,
    ValueAsc,
    /// Orders by `weighted_apr + roi`, not ROI alone
    RoiDesc,
    RoiAsc,
    TimeDesc,
    TimeAsc,
    NameDesc,
    NameAsc,
}

/// Case-insensitive ordering with lower case ahead of upper case on ties,
/// approximating a locale-aware string comparison.
pub fn locale_cmp(a: &str, b: &str) -> Ordering {
    let folded = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    if folded != Ordering::Equal {
        return folded;
    }
    a.chars()
        .map(|c| c.is_uppercase())
        .cmp(b.chars().map(|c| c.is_uppercase()))
}

/// Numeric key comparison where `0.0` and `-0.0` tie.
fn cmp_value(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

pub struct ProtocolProcessor;

impl ProtocolProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn compare(&self, a: &Position, b: &Position, policy: SortPolicy) -> Ordering {
        match policy {
            SortPolicy::ValueDesc => cmp_value(b.value_usd, a.value_usd),
            SortPolicy::ValueAsc => cmp_value(a.value_usd, b.value_usd),
            SortPolicy::RoiDesc => cmp_value(b.yield_score(), a.yield_score()),
            SortPolicy::RoiAsc => cmp_value(a.yield_score(), b.yield_score()),
            SortPolicy::TimeDesc => cmp_value(b.holding_time_sort(), a.holding_time_sort()),
            SortPolicy::TimeAsc => cmp_value(a.holding_time_sort(), b.holding_time_sort()),
            SortPolicy::NameDesc => locale_cmp(b.sort_name(), a.sort_name()),
            SortPolicy::NameAsc => locale_cmp(a.sort_name(), b.sort_name()),
        }
    }

    /// Filters by chain, then drops non-positive values when asked, then
    /// sorts stably so ties keep their merge order.
    pub fn process(
        &self,
        positions: &[Position],
        policy: SortPolicy,
        chain_filter: Option<u64>,
        hide_zero_value: bool,
    ) -> Vec<Position> {
        let mut filtered: Vec<Position> = positions
            .iter()
            .filter(|p| chain_filter.is_none_or(|chain_id| p.chain_id == chain_id))
            .filter(|p| !hide_zero_value || p.value_usd > 0.0)
            .cloned()
            .collect();

        filtered.sort_by(|a, b| self.compare(a, b, policy));
        filtered
    }
}

impl Default for ProtocolProcessor {
    fn default() -> Self {
        Self::new()
    }
}
