use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use super::ApiResponse;
use crate::gateway::{GatewayError, StorageFailure};

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),

    ValidationError(String),

    Conflict(String),

    Unauthorized(String),

    Forbidden(String),

    Unavailable(String),

    /// A server-side failure whose message is already safe to show.
    ServerError(String),

    InternalError(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            Self::Conflict(msg) => write!(f, "Conflict: {msg}"),
            Self::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            Self::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
            Self::Unavailable(msg) => write!(f, "Unavailable: {msg}"),
            Self::ServerError(msg) => write!(f, "Server error: {msg}"),
            Self::InternalError(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            Self::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ApiResponse::<()>::error(error_message);
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}

/// Gateway errors are already stripped of internal detail, so their messages
/// are passed through as they are.
impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let message = err.to_string();
        match err {
            GatewayError::InvalidCredential | GatewayError::InvalidToken => {
                Self::Unauthorized(message)
            }
            GatewayError::PermissionDenied => Self::Forbidden(message),
            GatewayError::InvitationInvalid | GatewayError::Validation(_) => {
                Self::ValidationError(message)
            }
            GatewayError::InvitationConflict
            | GatewayError::Storage(StorageFailure::Conflict | StorageFailure::Reference) => {
                Self::Conflict(message)
            }
            GatewayError::NotFound => Self::NotFound(message),
            GatewayError::Storage(StorageFailure::Unavailable) => Self::Unavailable(message),
            GatewayError::TokenRevocationFailed
            | GatewayError::RedemptionIncomplete
            | GatewayError::Storage(StorageFailure::Internal) => Self::ServerError(message),
        }
    }
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: GatewayError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn gateway_errors_map_to_statuses() {
        assert_eq!(status_of(GatewayError::InvalidCredential), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(GatewayError::InvalidToken), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(GatewayError::PermissionDenied), StatusCode::FORBIDDEN);
        assert_eq!(status_of(GatewayError::InvitationInvalid), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(GatewayError::InvitationConflict), StatusCode::CONFLICT);
        assert_eq!(status_of(GatewayError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(GatewayError::Storage(StorageFailure::Unavailable)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(GatewayError::RedemptionIncomplete),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn gateway_messages_pass_through() {
        let err = ApiError::from(GatewayError::InvalidToken);
        assert_eq!(
            err.to_string(),
            format!("Unauthorized: {}", GatewayError::InvalidToken)
        );
    }
}
