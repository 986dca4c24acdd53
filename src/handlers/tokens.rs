use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::address::WalletAddress;
use crate::chains::find_chain_id;
use crate::error::{AppError, AppResult};
use crate::services::tokens::ChainToken;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TokensQuery {
    pub address: String,
    /// Numeric chain id or a registry name such as `polygon`
    pub chain: String,
}

fn resolve_chain(raw: &str) -> AppResult<u64> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .or_else(|| find_chain_id(raw))
        .ok_or_else(|| AppError::ValidationError(format!("Unknown chain: {}", raw)))
}

pub async fn get_tokens(
    State(state): State<AppState>,
    Query(query): Query<TokensQuery>,
) -> AppResult<Json<Vec<ChainToken>>> {
    let address = WalletAddress::parse(&query.address)?;
    let chain_id = resolve_chain(&query.chain)?;
    let tokens = state.token_service.chain_tokens(chain_id, &address).await?;

    Ok(Json(tokens))
}
