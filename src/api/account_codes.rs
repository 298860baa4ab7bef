use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;

use super::auth::BearerToken;
use super::validation::validate_code_id;
use super::{ApiError, ApiResponse, AppState, MessageResponse};
use crate::gateway::account_codes::{AccountCodeSummary, IssueAccountCode, IssuedCode};

/// POST /account-codes
pub async fn issue_code(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
    Json(payload): Json<IssueAccountCode>,
) -> Result<(StatusCode, Json<ApiResponse<IssuedCode>>), ApiError> {
    let issued = state
        .auth()
        .issue_account_code(token.as_deref(), payload)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(issued))))
}

/// GET /account-codes
/// Codes issued by the caller
pub async fn list_codes(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
) -> Result<Json<ApiResponse<Vec<AccountCodeSummary>>>, ApiError> {
    let codes = state.auth().list_account_codes(token.as_deref()).await?;
    Ok(Json(ApiResponse::success(codes)))
}

/// POST /account-codes/{id}/revoke
pub async fn revoke_code(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let code_id = validate_code_id(id)?;
    state
        .auth()
        .revoke_account_code(token.as_deref(), code_id)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Account code revoked",
    ))))
}
