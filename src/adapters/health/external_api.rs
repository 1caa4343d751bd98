//! External API Check - one minimal real HTTP call, classified by status.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::health::{HealthCheckResult, HealthStatus};
use crate::ports::HealthCheck;

/// GET `url` and classify the response.
pub struct ExternalApiCheck {
    service: String,
    url: String,
    client: reqwest::Client,
    degraded_after: Duration,
}

impl ExternalApiCheck {
    pub fn new(
        service: impl Into<String>,
        url: impl Into<String>,
        request_timeout: Duration,
        degraded_after: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("triage-observability/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            service: service.into(),
            url: url.into(),
            client,
            degraded_after,
        })
    }
}

#[async_trait]
impl HealthCheck for ExternalApiCheck {
    fn service_name(&self) -> &str {
        &self.service
    }

    async fn perform_check(&self) -> Result<HealthCheckResult> {
        let started = Instant::now();
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("connectivity")?;
        let latency = started.elapsed();
        Ok(classify_response(
            &self.service,
            response.status().as_u16(),
            latency,
            self.degraded_after,
        ))
    }
}

/// Map an HTTP status and latency to a health result.
///
/// 2xx is Healthy (Degraded past `degraded_after`), 401 is an auth
/// failure, 429 a quota failure, anything else Unhealthy.
pub fn classify_response(
    service: &str,
    status: u16,
    latency: Duration,
    degraded_after: Duration,
) -> HealthCheckResult {
    let (health, message) = match status {
        200..=299 if latency > degraded_after => (HealthStatus::Degraded, "slow response".to_string()),
        200..=299 => (HealthStatus::Healthy, "api reachable".to_string()),
        401 => (HealthStatus::Unhealthy, "auth".to_string()),
        429 => (HealthStatus::Unhealthy, "quota".to_string()),
        other => (HealthStatus::Unhealthy, format!("unexpected status {other}")),
    };
    HealthCheckResult::new(service, health, message)
        .with_detail("http_status", status)
        .with_detail("latency_ms", latency.as_secs_f64() * 1000.0)
}
