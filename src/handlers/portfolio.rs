use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::address::WalletAddress;
use crate::error::{AppError, AppResult};
use crate::services::aggregator::{AggregatedPortfolio, AggregationProgress, ChainResult};
use crate::services::export::positions_csv;
use crate::services::merger::Position;
use crate::services::metrics::PortfolioSummary;
use crate::services::processor::SortPolicy;
use crate::AppState;

fn default_hide_zero() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct PortfolioQuery {
    pub address: String,
    #[serde(default)]
    pub sort: SortPolicy,
    pub chain_id: Option<u64>,
    #[serde(default = "default_hide_zero")]
    pub hide_zero: bool,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    pub address: String,
}

/// A position plus its yield figures formatted for display.
#[derive(Debug, Serialize)]
pub struct PositionView {
    #[serde(flatten)]
    pub position: Position,
    pub roi_display: String,
    pub apr_display: String,
    pub holding_time_display: String,
}

impl From<Position> for PositionView {
    fn from(position: Position) -> Self {
        Self {
            roi_display: position.display_roi(),
            apr_display: position.display_apr(),
            holding_time_display: position.display_holding_time(),
            position,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PortfolioResponse {
    pub run_id: Uuid,
    pub address: WalletAddress,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub positions: Vec<PositionView>,
    pub chains: Vec<ChainResult>,
    pub summary: PortfolioSummary,
}

/// Applies the requested view and summarizes exactly what is shown.
fn present(
    state: &AppState,
    portfolio: &AggregatedPortfolio,
    query: &PortfolioQuery,
) -> PortfolioResponse {
    let positions = state.processor.process(
        &portfolio.positions,
        query.sort,
        query.chain_id,
        query.hide_zero,
    );
    let summary = state.metrics.summarize(&positions);

    PortfolioResponse {
        run_id: portfolio.run_id,
        address: portfolio.address.clone(),
        started_at: portfolio.started_at,
        completed_at: portfolio.completed_at,
        positions: positions.into_iter().map(PositionView::from).collect(),
        chains: portfolio.chains.clone(),
        summary,
    }
}

async fn latest_for(
    state: &AppState,
    address: &WalletAddress,
) -> AppResult<Arc<AggregatedPortfolio>> {
    state
        .aggregator
        .latest(address)
        .await
        .ok_or_else(|| AppError::NotFound(format!("No completed portfolio run for {}", address)))
}

/// Runs one aggregation and answers with the processed view.
///
/// The run is spawned so it still settles every chain if the client goes
/// away mid-request.
pub async fn get_portfolio(
    State(state): State<AppState>,
    Query(query): Query<PortfolioQuery>,
) -> AppResult<Json<PortfolioResponse>> {
    let address = WalletAddress::parse(&query.address)?;

    let aggregator = state.aggregator.clone();
    let run_address = address.clone();
    let portfolio = tokio::spawn(async move { aggregator.aggregate(&run_address).await })
        .await
        .map_err(|e| AppError::InternalError(format!("Aggregation task failed: {}", e)))?;
    if portfolio.all_failed() {
        return Err(AppError::AllChainsFailed(address.to_string()));
    }

    Ok(Json(present(&state, &portfolio, &query)))
}

/// Starts a background run, cancelling the previous one for the same
/// address if still going. Runs for other addresses are left alone.
pub async fn refresh_portfolio(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let address = WalletAddress::parse(&request.address)?;
    let run_id = Uuid::new_v4();
    let cancel = CancellationToken::new();

    let previous = state
        .refresh
        .lock()
        .await
        .insert(address.clone(), (run_id, cancel.clone()));
    if let Some((previous_run, previous_cancel)) = previous {
        tracing::info!(
            "Cancelling background run {} for {}",
            previous_run,
            address.short()
        );
        previous_cancel.cancel();
    }

    let aggregator = state.aggregator.clone();
    let refresh = state.refresh.clone();
    let spawned_address = address.clone();
    tokio::spawn(async move {
        aggregator
            .aggregate_run(run_id, &spawned_address, &cancel)
            .await;

        let mut running = refresh.lock().await;
        if running
            .get(&spawned_address)
            .is_some_and(|(id, _)| *id == run_id)
        {
            running.remove(&spawned_address);
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "run_id": run_id, "address": address })),
    ))
}

pub async fn get_progress(
    State(state): State<AppState>,
    Query(query): Query<ProgressQuery>,
) -> AppResult<Json<AggregationProgress>> {
    let address = WalletAddress::parse(&query.address)?;
    state
        .aggregator
        .progress(&address)
        .await
        .map(Json)
        .ok_or_else(|| {
            AppError::NotFound(format!("No aggregation run has started for {}", address))
        })
}

pub async fn get_latest(
    State(state): State<AppState>,
    Query(query): Query<PortfolioQuery>,
) -> AppResult<Json<PortfolioResponse>> {
    let address = WalletAddress::parse(&query.address)?;
    let portfolio = latest_for(&state, &address).await?;
    Ok(Json(present(&state, &portfolio, &query)))
}

pub async fn export_portfolio(
    State(state): State<AppState>,
    Query(query): Query<PortfolioQuery>,
) -> AppResult<impl IntoResponse> {
    let address = WalletAddress::parse(&query.address)?;
    let portfolio = latest_for(&state, &address).await?;
    let positions = state.processor.process(
        &portfolio.positions,
        query.sort,
        query.chain_id,
        query.hide_zero,
    );

    let csv = positions_csv(&positions)
        .ok_or_else(|| AppError::NotFound("No positions to export".to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"portfolio.csv\""),
        ],
        csv,
    ))
}
