//! Prometheus metrics endpoint and HTTP request tracking middleware.

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::AppState;

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const ORDERS_CREATED_TOTAL: &str = "orders_created_total";
pub const PAYMENTS_TOTAL: &str = "payments_total";
pub const PRODUCTS_TOTAL: &str = "products_total";
pub const ORDERS_PENDING: &str = "orders_pending";

/// Install the global Prometheus recorder. Call once at startup.
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(HTTP_REQUEST_DURATION_SECONDS, "HTTP request duration in seconds");
    describe_counter!(ORDERS_CREATED_TOTAL, "Total number of orders placed");
    describe_counter!(PAYMENTS_TOTAL, "Payment attempts by outcome");
    describe_gauge!(PRODUCTS_TOTAL, "Number of products in the catalog");
    describe_gauge!(ORDERS_PENDING, "Number of orders awaiting payment");

    Ok(handle)
}

/// GET /metrics
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    update_gauge_metrics(&state).await;

    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Metrics not initialized".to_string(),
        ),
    }
}

async fn update_gauge_metrics(state: &AppState) {
    if let Ok(count) =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products WHERE deleted_at IS NULL")
            .fetch_one(&state.db)
            .await
    {
        gauge!(PRODUCTS_TOTAL).set(count as f64);
    }

    if let Ok(count) =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE status = 'pending'")
            .fetch_one(&state.db)
            .await
    {
        gauge!(ORDERS_PENDING).set(count as f64);
    }
}

/// Records `http_requests_total` and `http_request_duration_seconds`
/// labelled by method and matched route.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

pub fn record_order_created() {
    counter!(ORDERS_CREATED_TOTAL).increment(1);
}

/// `outcome` is one of approved, declined, error, rejected
pub fn record_payment(outcome: &'static str) {
    counter!(PAYMENTS_TOTAL, "outcome" => outcome).increment(1);
}
