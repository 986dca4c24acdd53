use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::address::WalletAddress;
use crate::datasource::types::{Page, TokenTransfer};
use crate::error::AppResult;
use crate::handlers::backend::AddressQuery;
use crate::services::balances::{NetworkBalance, NetworkTokens};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TransfersQuery {
    pub address: String,
    /// Indexer network name, chain id or registry name
    pub network: String,
    /// Comma-separated token contract addresses
    pub contracts: String,
}

pub async fn get_native_balances(
    State(state): State<AppState>,
    Query(query): Query<AddressQuery>,
) -> AppResult<Json<Vec<NetworkBalance>>> {
    let address = WalletAddress::parse(&query.address)?;
    Ok(Json(state.balance_service.native_balances(&address).await))
}

pub async fn get_token_balances(
    State(state): State<AppState>,
    Query(query): Query<AddressQuery>,
) -> AppResult<Json<Vec<NetworkTokens>>> {
    let address = WalletAddress::parse(&query.address)?;
    Ok(Json(state.balance_service.token_balances(&address).await))
}

pub async fn get_transfers(
    State(state): State<AppState>,
    Query(query): Query<TransfersQuery>,
) -> AppResult<Json<Page<TokenTransfer>>> {
    let address = WalletAddress::parse(&query.address)?;
    let contracts: Vec<String> = query
        .contracts
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect();

    let page = state
        .balance_service
        .token_transfers(&query.network, &address, &contracts)
        .await?;
    Ok(Json(page))
}
