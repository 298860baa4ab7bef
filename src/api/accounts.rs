use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use std::sync::Arc;

use super::validation::validate_code;
use super::{
    ApiError, ApiResponse, AppState, CodeQuery, CreateAccountRequest, CreatedAccountResponse,
    MessageResponse,
};
use crate::gateway::preauth::NewAccount;

/// POST /accounts
/// Redeem an account-creation code
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedAccountResponse>>), ApiError> {
    let code = validate_code(&payload.code)?.to_string();

    let user_id = state
        .auth()
        .create_account(NewAccount {
            username: payload.username,
            password: payload.password,
            email: payload.email,
            code,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(CreatedAccountResponse {
            user_id: user_id.value(),
        })),
    ))
}

/// GET /account-codes/validate?code=
/// Pre-check a code without redeeming it
pub async fn validate_account_code(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CodeQuery>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let code = validate_code(&query.code)?;
    state.auth().validate_account_code(code).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Account code is valid",
    ))))
}
