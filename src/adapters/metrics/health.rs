//! Health & Metrics Server - read endpoints for probes and scrapers
//!
//! Exposes via axum 0.7:
//! - `/live`            liveness, always 200
//! - `/health`          health report, 503 only when overall Unhealthy
//! - `/health/detailed` report with per-check details and host metadata
//! - `/metrics`         Prometheus text (`?name=<regex>&kind=<kind>`)
//! - `/metrics/json`    JSON form, same filters

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, instrument};

use super::prometheus::{ExportFilter, PrometheusExporter, TEXT_CONTENT_TYPE};
use crate::domain::health::HostMetadata;
use crate::domain::metrics::MetricKind;
use crate::usecases::HealthMonitor;

/// Shared state behind every route.
pub struct HealthState {
    pub monitor: Arc<HealthMonitor>,
    pub exporter: PrometheusExporter,
    pub host: HostMetadata,
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricsParams {
    pub name: Option<String>,
    pub kind: Option<MetricKind>,
}

impl MetricsParams {
    fn filter(&self) -> Result<ExportFilter, String> {
        let mut filter = ExportFilter::all();
        if let Some(pattern) = &self.name {
            filter = filter.name_matching(pattern).map_err(|e| e.to_string())?;
        }
        if let Some(kind) = self.kind {
            filter = filter.kinds(&[kind]);
        }
        Ok(filter)
    }
}

/// Axum server for the observability read API.
pub struct HealthServer {
    state: Arc<HealthState>,
    bind_address: String,
}

impl HealthServer {
    pub fn new(state: Arc<HealthState>, bind_address: impl Into<String>) -> Self {
        Self {
            state,
            bind_address: bind_address.into(),
        }
    }

    /// Route table, exposed for embedding and tests.
    pub fn router(state: Arc<HealthState>) -> Router {
        Router::new()
            .route("/live", get(Self::liveness))
            .route("/health", get(Self::health))
            .route("/health/detailed", get(Self::health_detailed))
            .route("/metrics", get(Self::metrics_text))
            .route("/metrics/json", get(Self::metrics_json))
            .with_state(state)
    }

    /// Serve until shutdown is broadcast.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.bind_address).await?;
        info!(address = %self.bind_address, "Health server started");

        axum::serve(listener, Self::router(Arc::clone(&self.state)))
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        info!("Health server stopped");
        Ok(())
    }

    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    async fn health(State(state): State<Arc<HealthState>>) -> Response {
        let report = state.monitor.check_all().await;
        let code = if report.is_unavailable() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::OK
        };
        (code, Json(report.to_json(None))).into_response()
    }

    async fn health_detailed(State(state): State<Arc<HealthState>>) -> Response {
        let report = state.monitor.check_all().await;
        let code = if report.is_unavailable() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::OK
        };
        (code, Json(report.to_json(Some(&state.host)))).into_response()
    }

    async fn metrics_text(
        State(state): State<Arc<HealthState>>,
        Query(params): Query<MetricsParams>,
    ) -> Response {
        match params.filter() {
            Ok(filter) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)],
                state.exporter.render(&filter),
            )
                .into_response(),
            Err(e) => (StatusCode::BAD_REQUEST, e).into_response(),
        }
    }

    async fn metrics_json(
        State(state): State<Arc<HealthState>>,
        Query(params): Query<MetricsParams>,
    ) -> Response {
        match params.filter() {
            Ok(filter) => Json(state.exporter.render_json(&filter)).into_response(),
            Err(e) => (StatusCode::BAD_REQUEST, e).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::health::{HealthCheckResult, HealthStatus};
    use crate::domain::metrics::MetricRegistry;
    use crate::ports::HealthCheck;
    use crate::usecases::CheckPolicy;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Fixed(HealthStatus);

    #[async_trait]
    impl HealthCheck for Fixed {
        fn service_name(&self) -> &str {
            "database"
        }

        async fn perform_check(&self) -> anyhow::Result<HealthCheckResult> {
            Ok(HealthCheckResult::new("database", self.0, "fixed").with_detail("pool", 4))
        }
    }

    async fn serve(status: HealthStatus) -> String {
        let registry = Arc::new(MetricRegistry::new());
        registry.counter("scrapes_total", "Scrapes", &[]).unwrap().inc(&[]).unwrap();
        let mut monitor = HealthMonitor::new(Duration::from_secs(1));
        monitor.register(Arc::new(Fixed(status)), CheckPolicy::default()).unwrap();
        let state = Arc::new(HealthState {
            monitor: Arc::new(monitor),
            exporter: PrometheusExporter::new(registry),
            host: HostMetadata::current("triage"),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, HealthServer::router(state)).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_health_status_codes() {
        let base = serve(HealthStatus::Degraded).await;
        let resp = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "degraded");
        assert!(body["checks"]["database"].get("details").is_none());

        let detailed: serde_json::Value = reqwest::get(format!("{base}/health/detailed"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(detailed["checks"]["database"]["details"]["pool"], 4);
        assert_eq!(detailed["host"]["service"], "triage");

        let down = serve(HealthStatus::Unhealthy).await;
        let resp = reqwest::get(format!("{down}/health")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 503);
    }

    #[tokio::test]
    async fn test_metrics_endpoints() {
        let base = serve(HealthStatus::Healthy).await;
        let resp = reqwest::get(format!("{base}/metrics")).await.unwrap();
        assert!(
            resp.headers()[reqwest::header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );
        assert!(resp.text().await.unwrap().contains("scrapes_total 1\n"));

        let json: serde_json::Value = reqwest::get(format!("{base}/metrics/json?kind=gauge"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(json["metrics"].as_object().unwrap().is_empty());

        let bad = reqwest::get(format!("{base}/metrics?name=(")).await.unwrap();
        assert_eq!(bad.status().as_u16(), 400);
    }
}
