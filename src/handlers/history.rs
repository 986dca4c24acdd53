use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::address::WalletAddress;
use crate::datasource::types::TimeRange;
use crate::error::{AppError, AppResult};
use crate::services::export::history_csv;
use crate::services::history::ValueHistory;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub address: String,
    #[serde(default)]
    pub timerange: TimeRange,
}

pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<ValueHistory>> {
    let address = WalletAddress::parse(&query.address)?;
    let history = state
        .history_service
        .value_history(&address, query.timerange)
        .await;

    Ok(Json(history))
}

pub async fn export_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<impl IntoResponse> {
    let address = WalletAddress::parse(&query.address)?;
    let history = state
        .history_service
        .value_history(&address, query.timerange)
        .await;

    let csv = history_csv(&history)
        .ok_or_else(|| AppError::NotFound("No value history to export".to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"history.csv\""),
        ],
        csv,
    ))
}
