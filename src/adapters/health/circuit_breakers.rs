//! Circuit Breaker Check - aggregate breaker states into one status.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::health::HealthCheckResult;
use crate::ports::{BreakerState, CircuitBreakerSource, HealthCheck};

/// Healthy with no open breakers, Degraded with one, Unhealthy with more.
pub struct CircuitBreakerCheck {
    service: String,
    source: Arc<dyn CircuitBreakerSource>,
}

impl CircuitBreakerCheck {
    pub fn new(service: impl Into<String>, source: Arc<dyn CircuitBreakerSource>) -> Self {
        Self {
            service: service.into(),
            source,
        }
    }
}

#[async_trait]
impl HealthCheck for CircuitBreakerCheck {
    fn service_name(&self) -> &str {
        &self.service
    }

    async fn perform_check(&self) -> Result<HealthCheckResult> {
        let states = self.source.breaker_states();
        let open: Vec<&str> = states
            .iter()
            .filter(|(_, s)| *s == BreakerState::Open)
            .map(|(name, _)| name.as_str())
            .collect();
        let half_open = states.iter().filter(|(_, s)| *s == BreakerState::HalfOpen).count();

        let result = match open.len() {
            0 => HealthCheckResult::healthy(&self.service, "all circuits closed"),
            1 => HealthCheckResult::degraded(&self.service, format!("circuit open: {}", open[0])),
            n => HealthCheckResult::unhealthy(&self.service, format!("{n} circuits open")),
        };
        Ok(result
            .with_detail("total", states.len())
            .with_detail("open", open.len())
            .with_detail("half_open", half_open)
            .with_detail("open_breakers", open))
    }
}
