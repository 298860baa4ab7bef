use axum::{
    Json,
    extract::{FromRequestParts, State},
    http::{
        HeaderMap,
        header::{AUTHORIZATION, COOKIE, SET_COOKIE},
        request::Parts,
    },
    response::{AppendHeaders, IntoResponse},
};
use chrono::Utc;
use std::convert::Infallible;
use std::sync::Arc;
use tower_sessions::cookie::{Cookie, SameSite};

use super::validation::validate_login;
use super::{ApiError, ApiResponse, AppState, LoginRequest, LoginResponse, MessageResponse};
use crate::config::ServerConfig;

// ============================================================================
// Bearer token extraction
// ============================================================================

/// The bearer token presented with a request, if any.
///
/// Looked up in this order:
/// 1. The token cookie set at login
/// 2. `Authorization: Bearer <token>` header
///
/// Absence is not a rejection here; the gateway decides what a missing token
/// means for the call being made.
#[derive(Debug, Clone, Default)]
pub struct BearerToken(pub Option<String>);

impl BearerToken {
    #[must_use]
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl FromRequestParts<Arc<AppState>> for BearerToken {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let cookie_name = &state.config().server.cookie_name;
        let (token, credential) = match token_from_cookie(&parts.headers, cookie_name) {
            Some(token) => (Some(token), "cookie"),
            None => match token_from_authorization(&parts.headers) {
                Some(token) => (Some(token), "bearer"),
                None => (None, "none"),
            },
        };

        tracing::Span::current().record("credential", credential);
        Ok(Self(token))
    }
}

fn token_from_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| Cookie::split_parse(header.to_string()))
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == cookie_name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

fn token_from_authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

// ============================================================================
// Cookies
// ============================================================================

/// HttpOnly, site-wide token cookie that lives exactly as long as the token.
#[must_use]
pub fn token_cookie(server: &ServerConfig, token: &str, max_age_seconds: i64) -> Cookie<'static> {
    Cookie::build((server.cookie_name.clone(), token.to_string()))
        .http_only(true)
        .secure(server.secure_cookies)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(max_age_seconds.max(0)))
        .build()
}

#[must_use]
pub fn removal_cookie(server: &ServerConfig) -> Cookie<'static> {
    let mut cookie = Cookie::build((server.cookie_name.clone(), String::new()))
        .http_only(true)
        .secure(server.secure_cookies)
        .same_site(SameSite::Lax)
        .path("/")
        .build();
    cookie.make_removal();
    cookie
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/login
/// Authenticate with username and password; the token is set as a cookie
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_login(&payload.username, &payload.password)?;

    let outcome = state
        .auth()
        .login(&payload.username, &payload.password)
        .await?;

    let max_age = (outcome.expires_at - Utc::now()).num_seconds();
    let cookie = token_cookie(&state.config().server, &outcome.token, max_age);

    Ok((
        AppendHeaders([(SET_COOKIE, cookie.to_string())]),
        Json(ApiResponse::success(LoginResponse {
            message: outcome.message,
            expires_at: outcome.expires_at,
        })),
    ))
}

/// POST /auth/logout
/// Revoke the presented token and clear the cookie
pub async fn logout(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
) -> Result<impl IntoResponse, ApiError> {
    state.auth().logout(token.as_deref()).await?;

    let cookie = removal_cookie(&state.config().server);
    Ok((
        AppendHeaders([(SET_COOKIE, cookie.to_string())]),
        Json(ApiResponse::success(MessageResponse::new("Logged out"))),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_token_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; gatehouse_token=abc123; other=1"),
        );
        assert_eq!(
            token_from_cookie(&headers, "gatehouse_token"),
            Some("abc123".to_string())
        );
        assert_eq!(token_from_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_token_from_authorization() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer  xyz "));
        assert_eq!(token_from_authorization(&headers), Some("xyz".to_string()));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(token_from_authorization(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(token_from_authorization(&headers), None);
    }

    #[test]
    fn test_token_cookie_attributes() {
        let server = ServerConfig::default();
        let rendered = token_cookie(&server, "abc", 3600).to_string();

        assert!(rendered.starts_with("gatehouse_token=abc"));
        assert!(rendered.contains("HttpOnly"));
        assert!(rendered.contains("Secure"));
        assert!(rendered.contains("SameSite=Lax"));
        assert!(rendered.contains("Path=/"));
        assert!(rendered.contains("Max-Age=3600"));
    }

    #[test]
    fn test_insecure_cookie_for_local_dev() {
        let server = ServerConfig {
            secure_cookies: false,
            ..ServerConfig::default()
        };
        let rendered = token_cookie(&server, "abc", 60).to_string();
        assert!(!rendered.contains("Secure"));
    }

    #[test]
    fn test_removal_cookie_expires() {
        let rendered = removal_cookie(&ServerConfig::default()).to_string();
        assert!(rendered.starts_with("gatehouse_token=;"));
        assert!(rendered.contains("Max-Age=0"));
    }
}
