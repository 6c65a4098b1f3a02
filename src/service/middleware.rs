//! Service middleware for request tracking and metrics.
//!
//! Metrics are emitted as structured log events under the
//! `monorepo_harmonizer::metrics` target and aggregated from logs.

use std::sync::OnceLock;
use std::time::Instant;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use regex_lite::Regex;
use tracing::{info, info_span, Instrument};

/// Header carrying the correlation id.
pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Request logging middleware.
///
/// Reuses an incoming `X-Request-Id` or mints a UUID v4, runs the request in
/// a span carrying it, echoes it on the response and logs completion.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let method = request.method().clone();
    let uri = request.uri().path().to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %uri,
        status = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );

    let mut response = next.run(request).instrument(span.clone()).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();
    span.record("status", status);
    span.record("latency_ms", latency.as_millis() as u64);

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER.clone(), value);
    }

    info!(
        target: "monorepo_harmonizer::access",
        request_id = %request_id,
        method = %method,
        path = %uri,
        status = status,
        latency_ms = latency.as_millis() as u64,
        "request completed"
    );

    response
}

/// Metrics middleware that records request counts and latency by path.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    info!(
        target: "monorepo_harmonizer::metrics",
        metric_type = "request",
        path = %path,
        method = %method,
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "request_metric"
    );

    response
}

/// Normalize a path for metrics.
///
/// UUIDs and git object ids become `:id`, and trailing slashes are dropped.
pub fn normalize_path(path: &str) -> String {
    static IDS: OnceLock<Option<Regex>> = OnceLock::new();
    let ids = IDS.get_or_init(|| {
        Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}|\b[0-9a-f]{40}\b").ok()
    });

    let normalized = match ids {
        Some(re) => re.replace_all(path, ":id").to_string(),
        None => path.to_string(),
    };
    match normalized.trim_end_matches('/') {
        "" => "/".to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// Record a plan run.
pub fn record_plan_metrics(module_count: usize, decisions: usize, latency_ms: u64) {
    info!(
        target: "monorepo_harmonizer::metrics",
        metric_type = "plan",
        module_count = module_count,
        decisions = decisions,
        latency_ms = latency_ms,
        "plan_metric"
    );
}

/// Record an apply run; `failed_phase` is set when the pipeline stopped.
pub fn record_apply_metrics(files: usize, failed_phase: Option<&str>, latency_ms: u64) {
    let status = if failed_phase.is_some() { "error" } else { "success" };
    info!(
        target: "monorepo_harmonizer::metrics",
        metric_type = "apply",
        files = files,
        status = status,
        failed_phase = failed_phase.unwrap_or(""),
        latency_ms = latency_ms,
        "apply_metric"
    );
}

/// Record a unification preview.
pub fn record_unify_metrics(groups: usize, placeholders: usize, latency_ms: u64) {
    info!(
        target: "monorepo_harmonizer::metrics",
        metric_type = "unify",
        groups = groups,
        placeholders = placeholders,
        latency_ms = latency_ms,
        "unify_metric"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_replaces_ids() {
        assert_eq!(
            normalize_path("/runs/550e8400-e29b-41d4-a716-446655440000"),
            "/runs/:id"
        );
        assert_eq!(
            normalize_path("/commits/0123456789abcdef0123456789abcdef01234567"),
            "/commits/:id"
        );
    }

    #[test]
    fn test_normalize_path_preserves_regular_path() {
        assert_eq!(normalize_path("/harmonize/plan"), "/harmonize/plan");
        assert_eq!(normalize_path("/harmonize/plan/"), "/harmonize/plan");
        assert_eq!(normalize_path("/"), "/");
    }
}
