use axum::{
    Json,
    extract::{Query, State},
    http::header::SET_COOKIE,
    response::{AppendHeaders, IntoResponse},
};
use std::sync::Arc;

use super::auth::{BearerToken, removal_cookie};
use super::validation::validate_permission_names;
use super::{
    ApiError, ApiResponse, AppState, ChangePasswordRequest, MessageResponse,
    PermissionCheckResponse,
};
use crate::gateway::permissions::GrantedPermission;
use crate::gateway::users::{SettingsUpdate, UserProfile};

/// GET /me
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
) -> Result<Json<ApiResponse<UserProfile>>, ApiError> {
    let profile = state.auth().current_user(token.as_deref()).await?;
    Ok(Json(ApiResponse::success(profile)))
}

/// PUT /me/settings
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
    Json(payload): Json<SettingsUpdate>,
) -> Result<Json<ApiResponse<UserProfile>>, ApiError> {
    let profile = state
        .auth()
        .update_settings(token.as_deref(), payload)
        .await?;
    Ok(Json(ApiResponse::success(profile)))
}

/// PUT /me/password
/// Change password (requires current password verification)
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .auth()
        .change_password(
            token.as_deref(),
            &payload.current_password,
            &payload.new_password,
        )
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Password updated successfully",
    ))))
}

/// DELETE /me
/// Soft-delete the caller's account and end every session
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
) -> Result<impl IntoResponse, ApiError> {
    state.auth().delete_account(token.as_deref()).await?;

    let cookie = removal_cookie(&state.config().server);
    Ok((
        AppendHeaders([(SET_COOKIE, cookie.to_string())]),
        Json(ApiResponse::success(MessageResponse::new("Account deleted"))),
    ))
}

/// GET /me/permissions
pub async fn list_permissions(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
) -> Result<Json<ApiResponse<Vec<GrantedPermission>>>, ApiError> {
    let granted = state.auth().list_permissions(token.as_deref()).await?;
    Ok(Json(ApiResponse::success(granted)))
}

/// GET /permissions/check?name=a&name=b
/// Succeeds only if the caller holds every named permission
pub async fn check_permissions(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<ApiResponse<PermissionCheckResponse>>, ApiError> {
    let names: Vec<String> = params
        .into_iter()
        .filter(|(key, _)| key == "name")
        .map(|(_, value)| value)
        .collect();
    let names = validate_permission_names(names)?;

    match names.as_slice() {
        [single] => state.auth().check_permission(token.as_deref(), single).await?,
        _ => {
            state
                .auth()
                .check_permissions(token.as_deref(), names.clone())
                .await?;
        }
    }

    Ok(Json(ApiResponse::success(PermissionCheckResponse {
        granted: true,
        checked: names,
    })))
}
