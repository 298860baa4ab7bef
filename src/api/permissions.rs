use axum::{
    Json,
    extract::{Path, State},
};
use std::sync::Arc;

use super::auth::BearerToken;
use super::validation::validate_user_id;
use super::{ApiError, ApiResponse, AppState, GrantPermissionRequest, MessageResponse};
use crate::gateway::permissions::{CATALOG, PermissionInfo};

/// GET /permissions
/// Known permission names with their descriptions
pub async fn list_catalog(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
) -> Result<Json<ApiResponse<&'static [PermissionInfo]>>, ApiError> {
    // Any signed-in user may read the catalog.
    state.auth().current_user(token.as_deref()).await?;
    Ok(Json(ApiResponse::success(CATALOG)))
}

/// POST /users/{id}/permissions
pub async fn grant_permission(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
    Path(id): Path<i32>,
    Json(payload): Json<GrantPermissionRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let user_id = validate_user_id(id)?;
    state
        .auth()
        .grant_permission(token.as_deref(), user_id, &payload.name)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(format!(
        "Granted '{}' to user {user_id}",
        payload.name
    )))))
}

/// DELETE /users/{id}/permissions/{name}
pub async fn revoke_permission(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
    Path((id, name)): Path<(i32, String)>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let user_id = validate_user_id(id)?;
    state
        .auth()
        .revoke_permission(token.as_deref(), user_id, &name)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(format!(
        "Revoked '{name}' from user {user_id}"
    )))))
}
