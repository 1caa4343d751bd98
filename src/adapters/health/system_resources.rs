//! System Resource Check - CPU, memory and disk usage against thresholds.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System};

use crate::domain::health::{HealthCheckResult, HealthStatus, aggregate};
use crate::ports::{HealthCheck, ResourceSampler, ResourceUsage};

/// Warning/critical pair, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub warning: f64,
    pub critical: f64,
}

impl Threshold {
    /// Healthy below warning, Degraded below critical, Unhealthy at or above.
    pub fn classify(&self, percent: f64) -> HealthStatus {
        if percent >= self.critical {
            HealthStatus::Unhealthy
        } else if percent >= self.warning {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceThresholds {
    pub cpu: Threshold,
    pub memory: Threshold,
    pub disk: Threshold,
}

impl Default for ResourceThresholds {
    fn default() -> Self {
        Self {
            cpu: Threshold { warning: 80.0, critical: 95.0 },
            memory: Threshold { warning: 85.0, critical: 95.0 },
            disk: Threshold { warning: 85.0, critical: 95.0 },
        }
    }
}

pub struct SystemResourceCheck {
    service: String,
    sampler: Arc<dyn ResourceSampler>,
    thresholds: ResourceThresholds,
}

impl SystemResourceCheck {
    pub fn new(
        service: impl Into<String>,
        sampler: Arc<dyn ResourceSampler>,
        thresholds: ResourceThresholds,
    ) -> Self {
        Self {
            service: service.into(),
            sampler,
            thresholds,
        }
    }
}

#[async_trait]
impl HealthCheck for SystemResourceCheck {
    fn service_name(&self) -> &str {
        &self.service
    }

    async fn perform_check(&self) -> Result<HealthCheckResult> {
        let usage = self.sampler.sample().await.context("resource sampling failed")?;
        let graded = [
            ("cpu", self.thresholds.cpu.classify(usage.cpu_percent)),
            ("memory", self.thresholds.memory.classify(usage.memory_percent)),
            ("disk", self.thresholds.disk.classify(usage.disk_percent)),
        ];
        let status = aggregate(graded.iter().map(|(_, s)| *s));
        let pressured: Vec<&str> = graded
            .iter()
            .filter(|(_, s)| *s != HealthStatus::Healthy)
            .map(|(name, _)| *name)
            .collect();
        let message = if pressured.is_empty() {
            "resources within limits".to_string()
        } else {
            format!("resource pressure: {}", pressured.join(", "))
        };

        Ok(HealthCheckResult::new(&self.service, status, message)
            .with_detail("cpu_percent", usage.cpu_percent)
            .with_detail("memory_percent", usage.memory_percent)
            .with_detail("disk_percent", usage.disk_percent))
    }
}

/// `ResourceSampler` backed by `sysinfo`.
///
/// Keeps one `System` across samples so CPU usage is measured over the
/// interval between calls. The first sample reports 0% CPU.
pub struct SysinfoSampler {
    system: Arc<Mutex<System>>,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        system.refresh_memory();
        Self {
            system: Arc::new(Mutex::new(system)),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceSampler for SysinfoSampler {
    async fn sample(&self) -> Result<ResourceUsage> {
        let system = Arc::clone(&self.system);
        tokio::task::spawn_blocking(move || {
            let mut system = system.lock().unwrap_or_else(PoisonError::into_inner);
            system.refresh_cpu_all();
            system.refresh_memory();

            let memory_percent = percent(system.used_memory(), system.total_memory());
            let disks = Disks::new_with_refreshed_list();
            let (total, available) = disks.list().iter().fold((0u64, 0u64), |(t, a), d| {
                (t.saturating_add(d.total_space()), a.saturating_add(d.available_space()))
            });

            ResourceUsage {
                cpu_percent: f64::from(system.global_cpu_usage()),
                memory_percent,
                disk_percent: percent(total.saturating_sub(available), total),
            }
        })
        .await
        .context("resource sampler task failed")
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(ResourceUsage);

    #[async_trait]
    impl ResourceSampler for Fixed {
        async fn sample(&self) -> Result<ResourceUsage> {
            Ok(self.0)
        }
    }

    async fn run(cpu: f64, memory: f64, disk: f64) -> HealthCheckResult {
        let usage = ResourceUsage {
            cpu_percent: cpu,
            memory_percent: memory,
            disk_percent: disk,
        };
        SystemResourceCheck::new("system", Arc::new(Fixed(usage)), ResourceThresholds::default())
            .perform_check()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_worst_resource_wins() {
        assert_eq!(run(10.0, 20.0, 30.0).await.status(), HealthStatus::Healthy);
        let degraded = run(85.0, 20.0, 30.0).await;
        assert_eq!(degraded.status(), HealthStatus::Degraded);
        assert_eq!(degraded.message(), "resource pressure: cpu");
        assert_eq!(run(85.0, 20.0, 99.0).await.status(), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_threshold_boundaries() {
        let t = Threshold { warning: 80.0, critical: 95.0 };
        assert_eq!(t.classify(79.9), HealthStatus::Healthy);
        assert_eq!(t.classify(80.0), HealthStatus::Degraded);
        assert_eq!(t.classify(95.0), HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_sysinfo_sample_in_range() {
        let usage = SysinfoSampler::new().sample().await.unwrap();
        assert!((0.0..=100.0).contains(&usage.memory_percent));
        assert!((0.0..=100.0).contains(&usage.disk_percent));
    }
}
