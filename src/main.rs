//! Triage Observability - Entry Point
//!
//! Wires the health monitor, metrics registry and audit pipeline, then
//! serves the read endpoints until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON or pretty)
//! 3. Create the shared metric registry
//! 4. Register configured health checks behind retry wrappers
//! 5. Open audit storage (encryption key from env)
//! 6. Create the AuditLogger in the configured delivery mode
//! 7. Spawn health server (/live, /health, /health/detailed, /metrics)
//! 8. Spawn the scheduled retention cleanup
//! 9. Wait for SIGINT → broadcast shutdown → drain audit queue → exit

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use triage_observability::adapters::health::{
    DependencyCheck, ExternalApiCheck, SysinfoSampler, SystemResourceCheck, TcpProbe,
};
use triage_observability::adapters::metrics::{HealthServer, HealthState, PrometheusExporter};
use triage_observability::adapters::storage::{EncryptedFileStorage, InMemoryStorage};
use triage_observability::config::{self, AppConfig, CheckKind, LogFormat, StorageKind};
use triage_observability::domain::audit::{SYSTEM_ACTOR, hash_identifier};
use triage_observability::domain::health::HostMetadata;
use triage_observability::domain::metrics::MetricRegistry;
use triage_observability::ports::{AuditStorage, HealthCheck};
use triage_observability::usecases::{
    AuditLogger, DataRetentionManager, HealthMonitor, SlidingWindowLimiter,
};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration from config.toml ──────────────
    let config = config::loader::load_config("config.toml")
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured logging ────────────────────
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.service.log_level));
    match config.service.log_format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).pretty().init(),
    }

    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        checks = config.health.checks.len(),
        "Starting triage observability"
    );

    let host = HostMetadata::current(&config.service.name);
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    // ── 3. Shared metric registry ───────────────────────────
    let registry = Arc::new(MetricRegistry::new());

    // ── 4. Health monitor with configured checks ────────────
    let monitor = Arc::new(build_monitor(&config, &registry)?);

    // ── 5. Audit storage ────────────────────────────────────
    let storage: Arc<dyn AuditStorage> = match config.audit.storage {
        StorageKind::EncryptedFile => {
            let key = config.audit.encryption_key()?;
            Arc::new(
                EncryptedFileStorage::new(&config.audit.directory, &key)
                    .await
                    .context("Failed to open audit storage")?,
            )
        }
        StorageKind::Memory => {
            warn!("In-memory audit storage configured - events are lost on exit");
            Arc::new(InMemoryStorage::new())
        }
    };

    // ── 6. Audit logger ─────────────────────────────────────
    let mut logger = AuditLogger::new(
        Arc::clone(&storage),
        host.clone(),
        config.audit.delivery_mode(),
    )?
    .with_metrics(&registry)?;
    if let Some(limit) = config.audit.rate_limit_per_second {
        logger = logger.with_rate_limit(SlidingWindowLimiter::per_second(limit));
    }
    let logger = Arc::new(logger);

    let operator = match config.audit.identity_salt() {
        Some(salt) => {
            let user = std::env::var("USER").unwrap_or_else(|_| SYSTEM_ACTOR.to_string());
            hash_identifier(&user, &salt)
        }
        None => {
            warn!(
                env = %config.audit.identity_salt_env,
                "Identity salt not set, recording startup as system actor"
            );
            SYSTEM_ACTOR.to_string()
        }
    };
    let correlation_id = Uuid::new_v4().to_string();
    if let Err(e) = logger
        .log_system_admin(&correlation_id, &operator, "service_start", "observability")
        .await
    {
        error!(error = %e, "Failed to record service start");
    }

    // ── 7. Spawn health/metrics server ──────────────────────
    let state = Arc::new(HealthState {
        monitor: Arc::clone(&monitor),
        exporter: PrometheusExporter::new(Arc::clone(&registry)),
        host,
    });
    let server = HealthServer::new(state, config.metrics.bind_address.clone());
    let server_shutdown = shutdown_tx.subscribe();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run(server_shutdown).await {
            error!(error = %e, "Health server failed");
        }
    });

    // ── 8. Spawn scheduled retention cleanup ────────────────
    let retention = Arc::new(DataRetentionManager::new(Arc::clone(&storage)));
    let retention_handle = retention.spawn_scheduled_cleanup(
        config.audit.retention_days,
        config.audit.cleanup_interval(),
        shutdown_tx.subscribe(),
    );

    info!("All tasks spawned - observability core is running");

    // ── 9. Wait for SIGINT ──────────────────────────────────
    signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("SIGINT received, initiating graceful shutdown");

    let _ = shutdown_tx.send(());

    if let Err(e) = logger
        .log_system_admin(&correlation_id, &operator, "service_stop", "observability")
        .await
    {
        error!(error = %e, "Failed to record service stop");
    }
    logger.shutdown().await;

    let _ = tokio::time::timeout(Duration::from_secs(5), server_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;

    info!("Shutdown complete");
    Ok(())
}

/// Build the health monitor from `[[health.checks]]`.
fn build_monitor(config: &AppConfig, registry: &MetricRegistry) -> Result<HealthMonitor> {
    let mut monitor = HealthMonitor::new(config.health.global_timeout())
        .with_history(config.health.history_len)
        .with_metrics(registry)?;

    for check in &config.health.checks {
        let policy = config.health.policy_for(check);
        let inner: Arc<dyn HealthCheck> = match &check.kind {
            CheckKind::Tcp {
                address,
                request,
                expect,
                degraded_after_ms,
            } => {
                let mut probe = TcpProbe::new(address.clone());
                if let (Some(request), Some(expect)) = (request, expect) {
                    probe = probe.with_exchange(request.as_bytes(), expect.as_bytes());
                }
                Arc::new(DependencyCheck::new(
                    check.name.clone(),
                    probe,
                    Duration::from_millis(*degraded_after_ms),
                ))
            }
            CheckKind::Http {
                url,
                degraded_after_ms,
            } => Arc::new(ExternalApiCheck::new(
                check.name.clone(),
                url.clone(),
                policy.timeout,
                Duration::from_millis(*degraded_after_ms),
            )?),
            CheckKind::System { thresholds } => Arc::new(SystemResourceCheck::new(
                check.name.clone(),
                Arc::new(SysinfoSampler::new()),
                *thresholds,
            )),
        };
        monitor.register(inner, policy)?;
        info!(check = %check.name, "Health check registered");
    }

    Ok(monitor)
}
