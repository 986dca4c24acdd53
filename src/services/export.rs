//! Plain CSV rendering for downloads.
//!
//! Fields are joined with commas as-is: a value containing a comma or a
//! quote breaks the row. Protocol and chain names in practice do not.

use crate::chains::find_chain;
use crate::services::history::ValueHistory;
use crate::services::merger::{sort_value, Position};

pub const PROTOCOL_HEADERS: [&str; 5] = ["Protocol", "Chain", "Value (USD)", "ROI", "APR"];

/// Renders `rows` under `headers`. No rows means no document.
pub fn to_csv<T, F>(headers: &[&str], rows: &[T], transform: F) -> Option<String>
where
    F: Fn(&T) -> Vec<String>,
{
    if rows.is_empty() {
        return None;
    }

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(headers.join(","));
    lines.extend(rows.iter().map(|row| transform(row).join(",")));
    Some(lines.join("\n"))
}

fn chain_label(chain_id: u64) -> String {
    find_chain(chain_id)
        .map(|c| c.display_name.to_string())
        .unwrap_or_else(|| chain_id.to_string())
}

/// The `Protocol` column carries the position's own name (e.g. the pool),
/// not the protocol family it belongs to.
pub fn positions_csv(positions: &[Position]) -> Option<String> {
    to_csv(&PROTOCOL_HEADERS, positions, |p| {
        vec![
            p.sort_name().to_string(),
            chain_label(p.chain_id),
            p.value_usd.to_string(),
            sort_value(p.roi).to_string(),
            sort_value(p.weighted_apr).to_string(),
        ]
    })
}

/// One `Date` column, then one column per chain that returned a series.
pub fn history_csv(history: &ValueHistory) -> Option<String> {
    let mut headers = vec!["Date".to_string()];
    headers.extend(history.series.iter().map(|s| s.display_name.clone()));
    let headers: Vec<&str> = headers.iter().map(String::as_str).collect();

    to_csv(&headers, &history.rows, |row| {
        let mut fields = vec![row
            .date()
            .map(|d| d.to_rfc3339())
            .unwrap_or_else(|| row.timestamp.to_string())];
        fields.extend(history.series.iter().map(|s| {
            row.values
                .get(&s.chain_id)
                .map(|v| v.to_string())
                .unwrap_or_default()
        }));
        fields
    })
}
