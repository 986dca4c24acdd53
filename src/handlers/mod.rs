pub mod backend;
pub mod balances;
pub mod history;
pub mod market;
pub mod portfolio;
pub mod tokens;
pub mod webhooks;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

use crate::chains::ChainRequestSpec;
use crate::AppState;

pub async fn get_chains(State(state): State<AppState>) -> Json<Vec<ChainRequestSpec>> {
    Json(state.aggregator.chains().to_vec())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/chains", get(get_chains))
        .route("/portfolio", get(portfolio::get_portfolio))
        .route("/portfolio/refresh", post(portfolio::refresh_portfolio))
        .route("/portfolio/progress", get(portfolio::get_progress))
        .route("/portfolio/latest", get(portfolio::get_latest))
        .route("/portfolio/export", get(portfolio::export_portfolio))
        .route("/tokens", get(tokens::get_tokens))
        .route("/history", get(history::get_history))
        .route("/history/export", get(history::export_history))
        .route("/backend/portfolio", get(backend::get_backend_portfolio))
        .route("/transactions", get(backend::get_transactions))
        .route("/balances/native", get(balances::get_native_balances))
        .route("/balances/tokens", get(balances::get_token_balances))
        .route("/transfers", get(balances::get_transfers))
        .route("/market", get(market::get_market_data))
        .route("/webhooks", post(webhooks::create_webhook))
        .with_state(state)
}
