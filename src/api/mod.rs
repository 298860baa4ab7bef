use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::services::AuthService;
use crate::state::SharedState;

mod account_codes;
mod accounts;
pub mod auth;
mod error;
mod me;
mod observability;
mod permissions;
mod system;
mod tokens;
mod types;
mod validation;

pub use auth::BearerToken;
pub use error::ApiError;
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }

    #[must_use]
    pub fn auth(&self) -> &Arc<dyn AuthService> {
        &self.shared.auth_service
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config().server.cors_allowed_origins.clone();

    let api_router = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/accounts", post(accounts::create_account))
        .route(
            "/account-codes/validate",
            get(accounts::validate_account_code),
        )
        .route("/account-codes", post(account_codes::issue_code))
        .route("/account-codes", get(account_codes::list_codes))
        .route(
            "/account-codes/{id}/revoke",
            post(account_codes::revoke_code),
        )
        .route("/me", get(me::get_profile))
        .route("/me", delete(me::delete_account))
        .route("/me/settings", put(me::update_settings))
        .route("/me/password", put(me::change_password))
        .route("/me/permissions", get(me::list_permissions))
        .route("/permissions", get(permissions::list_catalog))
        .route("/permissions/check", get(me::check_permissions))
        .route("/tokens", get(tokens::list_tokens))
        .route("/tokens/current", get(tokens::current_token))
        .route("/tokens/revoke", post(tokens::revoke_token))
        .route(
            "/users/{id}/permissions",
            post(permissions::grant_permission),
        )
        .route(
            "/users/{id}/permissions/{name}",
            delete(permissions::revoke_permission),
        )
        .route_layer(middleware::from_fn(observability::request_span_middleware))
        .layer(middleware::from_fn(
            observability::security_headers_middleware,
        ));

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_credentials(true)
    };

    Router::new()
        .nest("/api", api_router)
        .route("/health", get(system::health))
        .route("/health/ready", get(system::health_ready))
        .route("/metrics", get(observability::get_metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer.allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::DELETE,
                ])),
        )
        .with_state(state)
}
