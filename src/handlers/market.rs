use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::services::market::TokenMarketData;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct MarketQuery {
    pub contract: String,
}

pub async fn get_market_data(
    State(state): State<AppState>,
    Query(query): Query<MarketQuery>,
) -> AppResult<Json<TokenMarketData>> {
    let contract = query.contract.trim();
    if contract.is_empty() {
        return Err(AppError::ValidationError("contract is required".to_string()));
    }
    let data = state.market_service.token_market_data(contract).await?;
    Ok(Json(data))
}
