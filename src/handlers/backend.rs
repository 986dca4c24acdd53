use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use crate::address::WalletAddress;
use crate::datasource::types::BackendPortfolio;
use crate::error::AppResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AddressQuery {
    pub address: String,
}

pub async fn get_backend_portfolio(
    State(state): State<AppState>,
    Query(query): Query<AddressQuery>,
) -> AppResult<Json<BackendPortfolio>> {
    let address = WalletAddress::parse(&query.address)?;
    let portfolio = state.backend_poller.fetch_portfolio(&address).await?;
    Ok(Json(portfolio))
}

pub async fn get_transactions(
    State(state): State<AppState>,
    Query(query): Query<AddressQuery>,
) -> AppResult<Json<Vec<Value>>> {
    let address = WalletAddress::parse(&query.address)?;
    let items = state.backend_poller.transactions(&address).await?;
    Ok(Json(items))
}
