use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

use crate::datasource::types::WebhookResponse;
use crate::error::AppResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWebhook {
    pub addresses: Vec<String>,
    pub webhook_url: String,
}

pub async fn create_webhook(
    State(state): State<AppState>,
    Json(request): Json<CreateWebhook>,
) -> AppResult<(StatusCode, Json<WebhookResponse>)> {
    let created = state
        .webhook_service
        .create(&request.addresses, &request.webhook_url)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}
