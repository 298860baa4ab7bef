use axum::{Json, extract::State};
use std::sync::Arc;

use super::auth::BearerToken;
use super::validation::validate_token_id;
use super::{ApiError, ApiResponse, AppState, MessageResponse, RevokeTokenRequest};
use crate::gateway::tokens::TokenSummary;

/// GET /tokens/current
pub async fn current_token(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
) -> Result<Json<ApiResponse<TokenSummary>>, ApiError> {
    let summary = state.auth().current_token(token.as_deref()).await?;
    Ok(Json(ApiResponse::success(summary)))
}

/// GET /tokens
/// Every token of the caller, newest first
pub async fn list_tokens(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
) -> Result<Json<ApiResponse<Vec<TokenSummary>>>, ApiError> {
    let tokens = state.auth().list_tokens(token.as_deref()).await?;
    Ok(Json(ApiResponse::success(tokens)))
}

/// POST /tokens/revoke
pub async fn revoke_token(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
    Json(payload): Json<RevokeTokenRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let target = validate_token_id(payload.id)?;

    state.auth().revoke_token(token.as_deref(), target).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Access token revoked",
    ))))
}
