use anyhow::{Context, Result};
use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Controller metrics
    pub static ref RECONCILE_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "reflector_reconcile_duration_seconds",
            "Time spent reconciling resources"
        ).buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]),
        &["kind"]
    ).unwrap();

    pub static ref RECONCILE_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "reflector_reconcile_errors_total",
            "Total number of reconciliation errors"
        ),
        &["kind"]
    ).unwrap();

    // Scan metrics
    pub static ref SCANS_TOTAL: IntCounter = IntCounter::new(
        "reflector_scans_total",
        "Total number of registry scans started"
    ).unwrap();

    pub static ref SCAN_FAILURES: IntCounter = IntCounter::new(
        "reflector_scan_failures_total",
        "Total number of registry scans that failed or timed out"
    ).unwrap();

    pub static ref TAGS_DISCOVERED: IntGaugeVec = IntGaugeVec::new(
        Opts::new(
            "reflector_tags_discovered",
            "Number of tags found by the latest scan of an image"
        ),
        &["image"]
    ).unwrap();

    pub static ref CACHED_IMAGES: IntGauge = IntGauge::new(
        "reflector_cached_images",
        "Number of image locations held in the scan cache"
    ).unwrap();

    // Policy metrics
    pub static ref POLICY_OUTCOMES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "reflector_policy_evaluations_total",
            "Policy evaluations by outcome reason"
        ),
        &["reason"]
    ).unwrap();
}

pub fn register_metrics() {
    REGISTRY
        .register(Box::new(RECONCILE_DURATION.clone()))
        .ok();
    REGISTRY.register(Box::new(RECONCILE_ERRORS.clone())).ok();
    REGISTRY.register(Box::new(SCANS_TOTAL.clone())).ok();
    REGISTRY.register(Box::new(SCAN_FAILURES.clone())).ok();
    REGISTRY.register(Box::new(TAGS_DISCOVERED.clone())).ok();
    REGISTRY.register(Box::new(CACHED_IMAGES.clone())).ok();
    REGISTRY.register(Box::new(POLICY_OUTCOMES.clone())).ok();

    info!("Metrics registered");
}

pub fn router() -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(health_check))
        .layer(TraceLayer::new_for_http())
}

pub async fn start_metrics_server(addr: SocketAddr) -> Result<JoinHandle<()>> {
    register_metrics();

    info!("Starting metrics server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics server to {}", addr))?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router()).await {
            error!("Metrics server failed: {}", e);
        }
    });

    Ok(handle)
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        buffer,
    )
        .into_response()
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        register_metrics();
        register_metrics();

        SCANS_TOTAL.inc();
        POLICY_OUTCOMES.with_label_values(&["Succeeded"]).inc();

        let mut buffer = vec![];
        TextEncoder::new()
            .encode(&REGISTRY.gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("reflector_scans_total"));
        assert!(text.contains("reflector_policy_evaluations_total"));
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        register_metrics();
        SCANS_TOTAL.inc();

        let response = metrics_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = health_check().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
