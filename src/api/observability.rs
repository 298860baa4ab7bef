//! Request spans, HTTP metrics and response headers.
//!
//! Every `/api` request runs inside a `request` span. The gateway records
//! `user_id` on it once a token verifies, and [`super::BearerToken`] records
//! `credential` (cookie, bearer or none), so events logged by a gateway call
//! carry both without the query functions knowing about HTTP.

use axum::{
    extract::{MatchedPath, Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, field, info, info_span, warn};
use uuid::Uuid;

use super::AppState;

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Token responses and session listings must never be cached or framed.
const SECURITY_HEADERS: [(&str, &str); 4] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("referrer-policy", "no-referrer"),
    ("cache-control", "no-store"),
];

pub async fn get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.prometheus_handle.as_ref().map_or_else(
        || "Metrics not enabled or failed to initialize".to_string(),
        metrics_exporter_prometheus::PrometheusHandle::render,
    )
}

/// Outcome label for a response status. Authentication and permission
/// failures get their own bucket.
#[must_use]
pub const fn outcome(status: u16) -> &'static str {
    match status {
        500.. => "error",
        401 | 403 => "denied",
        400..=499 => "client_error",
        _ => "success",
    }
}

pub async fn request_span_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let request_id = Uuid::new_v4();
    let method = req.method().clone();

    // Raw paths may carry codes and ids; label by route only.
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string());

    let span = info_span!(
        "request",
        %request_id,
        %method,
        route = %route,
        user_id = field::Empty,
        credential = field::Empty,
    );

    async move {
        let mut response = next.run(req).await;

        let elapsed = start.elapsed();
        let status = response.status().as_u16();
        let outcome = outcome(status);

        let labels = [
            ("method", method.to_string()),
            ("route", route),
            ("outcome", outcome.to_string()),
        ];
        metrics::counter!("http_requests_total", &labels).increment(1);
        metrics::histogram!("http_request_duration_seconds", &labels)
            .record(elapsed.as_secs_f64());

        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }

        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        if outcome == "error" {
            warn!(status, elapsed_ms, "Request failed");
        } else {
            info!(status, elapsed_ms, outcome, "Request finished");
        }

        response
    }
    .instrument(span)
    .await
}

pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    for (name, value) in SECURITY_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }

    response
}
