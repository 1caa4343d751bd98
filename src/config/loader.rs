//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::{AppConfig, CheckKind, StorageKind};
use crate::adapters::health::Threshold;

/// Longest accepted retention period (100 years).
const MAX_RETENTION_DAYS: u32 = 36_500;
const MAX_BATCH_SIZE: usize = 10_000;
const MAX_RATE_LIMIT_PER_SECOND: usize = 100_000;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    service = %config.service.name,
    checks = config.health.checks.len(),
    delivery = ?config.audit.delivery,
    storage = ?config.audit.storage,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content)
    .with_context(|| "Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Positive timeouts and batch sizes
/// - Unique, non-empty check names
/// - Ordered warning/critical thresholds
/// - Bounded retention, batch and rate-limit values
/// - TCP exchanges with both `request` and `expect`, or neither
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    !config.service.name.is_empty(),
    "service.name must not be empty"
  );

  // Health validation
  let health = &config.health;
  anyhow::ensure!(
    health.global_timeout_ms > 0,
    "health.global_timeout_ms must be positive"
  );
  anyhow::ensure!(
    health.defaults.timeout_ms > 0,
    "health.defaults.timeout_ms must be positive"
  );
  anyhow::ensure!(
    health.defaults.backoff_base_ms <= health.defaults.backoff_max_ms,
    "health.defaults.backoff_base_ms ({}) exceeds backoff_max_ms ({})",
    health.defaults.backoff_base_ms,
    health.defaults.backoff_max_ms
  );

  let mut names = HashSet::new();
  for (i, check) in health.checks.iter().enumerate() {
    anyhow::ensure!(!check.name.is_empty(), "Health check {} has empty name", i);
    anyhow::ensure!(
      names.insert(check.name.as_str()),
      "Health check {} is configured twice",
      check.name
    );
    anyhow::ensure!(
      check.timeout_ms.is_none_or(|t| t > 0),
      "Health check {} timeout_ms must be positive",
      check.name
    );

    match &check.kind {
      CheckKind::Tcp {
        address,
        request,
        expect,
        ..
      } => {
        anyhow::ensure!(
          !address.is_empty(),
          "Health check {} has empty address",
          check.name
        );
        anyhow::ensure!(
          request.is_some() == expect.is_some(),
          "Health check {} must set both request and expect, or neither",
          check.name
        );
      }
      CheckKind::Http { url, .. } => anyhow::ensure!(
        url.starts_with("http://") || url.starts_with("https://"),
        "Health check {} url must be http(s), got {}",
        check.name,
        url
      ),
      CheckKind::System { thresholds } => {
        for (resource, threshold) in [
          ("cpu", thresholds.cpu),
          ("memory", thresholds.memory),
          ("disk", thresholds.disk),
        ] {
          validate_threshold(&check.name, resource, threshold)?;
        }
      }
    }
  }

  // Audit validation
  let audit = &config.audit;
  anyhow::ensure!(
    (1..=MAX_BATCH_SIZE).contains(&audit.batch_size),
    "audit.batch_size must be within 1..={}",
    MAX_BATCH_SIZE
  );
  anyhow::ensure!(
    audit.channel_capacity > 0,
    "audit.channel_capacity must be positive"
  );
  anyhow::ensure!(
    audit.flush_interval_ms > 0,
    "audit.flush_interval_ms must be positive"
  );
  anyhow::ensure!(
    audit
      .rate_limit_per_second
      .is_none_or(|n| (1..=MAX_RATE_LIMIT_PER_SECOND).contains(&n)),
    "audit.rate_limit_per_second must be within 1..={} when set",
    MAX_RATE_LIMIT_PER_SECOND
  );
  anyhow::ensure!(
    (1..=MAX_RETENTION_DAYS).contains(&audit.retention_days),
    "audit.retention_days must be within 1..={}",
    MAX_RETENTION_DAYS
  );
  anyhow::ensure!(
    audit.cleanup_interval_secs > 0,
    "audit.cleanup_interval_secs must be positive"
  );
  if audit.storage == StorageKind::EncryptedFile {
    anyhow::ensure!(
      !audit.directory.is_empty(),
      "audit.directory must not be empty"
    );
    anyhow::ensure!(
      !audit.encryption_key_env.is_empty(),
      "audit.encryption_key_env must name an environment variable"
    );
  }

  Ok(())
}

fn validate_threshold(check: &str, resource: &str, threshold: Threshold) -> Result<()> {
  anyhow::ensure!(
    threshold.warning > 0.0 && threshold.critical <= 100.0,
    "Health check {} {} thresholds must be within (0, 100]",
    check,
    resource
  );
  anyhow::ensure!(
    threshold.warning < threshold.critical,
    "Health check {} {} warning ({}) must be below critical ({})",
    check,
    resource,
    threshold.warning,
    threshold.critical
  );
  Ok(())
}
