//! Configuration Module - TOML-based Service Configuration
//!
//! Loads and validates configuration from `config.toml`. Every section
//! has defaults so a minimal file is valid. Secrets (the audit
//! encryption key and the identity-hashing salt) never live in the
//! file: the config names the environment variables that hold them.

pub mod loader;

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::health::ResourceThresholds;
use crate::usecases::{CheckPolicy, DeliveryMode};

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
  #[serde(default)]
  pub service: ServiceConfig,
  #[serde(default)]
  pub metrics: MetricsConfig,
  #[serde(default)]
  pub health: HealthConfig,
  #[serde(default)]
  pub audit: AuditConfig,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
  #[default]
  Json,
  Pretty,
}

/// Service identity and logging.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
  #[serde(default = "default_service_name")]
  pub name: String,
  /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides.
  #[serde(default = "default_log_level")]
  pub log_level: String,
  #[serde(default)]
  pub log_format: LogFormat,
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self {
      name: default_service_name(),
      log_level: default_log_level(),
      log_format: LogFormat::default(),
    }
  }
}

/// Health/metrics HTTP endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  #[serde(default = "default_bind_address")]
  pub bind_address: String,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      bind_address: default_bind_address(),
    }
  }
}

/// Retry policy applied to every check unless overridden.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
  #[serde(default = "default_check_timeout_ms")]
  pub timeout_ms: u64,
  #[serde(default = "default_retry_count")]
  pub retry_count: u32,
  #[serde(default = "default_backoff_base_ms")]
  pub backoff_base_ms: u64,
  #[serde(default = "default_backoff_max_ms")]
  pub backoff_max_ms: u64,
}

impl Default for PolicyConfig {
  fn default() -> Self {
    Self {
      timeout_ms: default_check_timeout_ms(),
      retry_count: default_retry_count(),
      backoff_base_ms: default_backoff_base_ms(),
      backoff_max_ms: default_backoff_max_ms(),
    }
  }
}

/// What a configured check probes.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckKind {
  /// TCP connect plus optional request/expected-reply exchange.
  Tcp {
    address: String,
    request: Option<String>,
    expect: Option<String>,
    #[serde(default = "default_degraded_after_ms")]
    degraded_after_ms: u64,
  },
  /// HTTP GET classified by status and latency.
  Http {
    url: String,
    #[serde(default = "default_degraded_after_ms")]
    degraded_after_ms: u64,
  },
  /// Host CPU/memory/disk usage.
  System {
    #[serde(default)]
    thresholds: ResourceThresholds,
  },
}

/// One `[[health.checks]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckConfig {
  pub name: String,
  #[serde(flatten)]
  pub kind: CheckKind,
  pub timeout_ms: Option<u64>,
  pub retry_count: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
  /// Deadline for one whole `check_all` round.
  #[serde(default = "default_global_timeout_ms")]
  pub global_timeout_ms: u64,
  /// Results kept per service (0 disables history).
  #[serde(default = "default_history_len")]
  pub history_len: usize,
  #[serde(default)]
  pub defaults: PolicyConfig,
  #[serde(default)]
  pub checks: Vec<CheckConfig>,
}

impl Default for HealthConfig {
  fn default() -> Self {
    Self {
      global_timeout_ms: default_global_timeout_ms(),
      history_len: default_history_len(),
      defaults: PolicyConfig::default(),
      checks: Vec::new(),
    }
  }
}

impl HealthConfig {
  pub fn global_timeout(&self) -> Duration {
    Duration::from_millis(self.global_timeout_ms)
  }

  /// Defaults with the check's own overrides applied.
  pub fn policy_for(&self, check: &CheckConfig) -> CheckPolicy {
    CheckPolicy {
      timeout: Duration::from_millis(check.timeout_ms.unwrap_or(self.defaults.timeout_ms)),
      retry_count: check.retry_count.unwrap_or(self.defaults.retry_count),
      backoff_base: Duration::from_millis(self.defaults.backoff_base_ms),
      backoff_max: Duration::from_millis(self.defaults.backoff_max_ms),
    }
  }
}

/// Audit storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
  #[default]
  EncryptedFile,
  Memory,
}

/// Audit delivery mode name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryKind {
  Immediate,
  Buffered,
  #[default]
  Background,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
  #[serde(default)]
  pub storage: StorageKind,
  #[serde(default = "default_audit_directory")]
  pub directory: String,
  /// Environment variable holding the encryption passphrase.
  #[serde(default = "default_key_env")]
  pub encryption_key_env: String,
  /// Environment variable holding the identity-hashing salt.
  #[serde(default = "default_salt_env")]
  pub identity_salt_env: String,
  #[serde(default)]
  pub delivery: DeliveryKind,
  #[serde(default = "default_batch_size")]
  pub batch_size: usize,
  #[serde(default = "default_channel_capacity")]
  pub channel_capacity: usize,
  #[serde(default = "default_flush_interval_ms")]
  pub flush_interval_ms: u64,
  /// Sliding one-second ingestion cap; unset means unlimited.
  pub rate_limit_per_second: Option<usize>,
  #[serde(default = "default_retention_days")]
  pub retention_days: u32,
  #[serde(default = "default_cleanup_interval_secs")]
  pub cleanup_interval_secs: u64,
}

impl Default for AuditConfig {
  fn default() -> Self {
    Self {
      storage: StorageKind::default(),
      directory: default_audit_directory(),
      encryption_key_env: default_key_env(),
      identity_salt_env: default_salt_env(),
      delivery: DeliveryKind::default(),
      batch_size: default_batch_size(),
      channel_capacity: default_channel_capacity(),
      flush_interval_ms: default_flush_interval_ms(),
      rate_limit_per_second: None,
      retention_days: default_retention_days(),
      cleanup_interval_secs: default_cleanup_interval_secs(),
    }
  }
}

impl AuditConfig {
  pub fn delivery_mode(&self) -> DeliveryMode {
    match self.delivery {
      DeliveryKind::Immediate => DeliveryMode::Immediate,
      DeliveryKind::Buffered => DeliveryMode::Buffered {
        batch_size: self.batch_size,
      },
      DeliveryKind::Background => DeliveryMode::Background {
        capacity: self.channel_capacity,
        batch_size: self.batch_size,
        flush_interval: Duration::from_millis(self.flush_interval_ms),
      },
    }
  }

  /// Read the encryption passphrase from its environment variable.
  pub fn encryption_key(&self) -> Result<String> {
    std::env::var(&self.encryption_key_env).with_context(|| {
      format!(
        "audit encryption key not set (expected ${})",
        self.encryption_key_env
      )
    })
  }

  /// Read the identity salt, if configured in the environment.
  pub fn identity_salt(&self) -> Option<Vec<u8>> {
    std::env::var(&self.identity_salt_env)
      .ok()
      .filter(|s| !s.is_empty())
      .map(String::into_bytes)
  }

  pub fn cleanup_interval(&self) -> Duration {
    Duration::from_secs(self.cleanup_interval_secs)
  }
}

fn default_service_name() -> String {
  "triage-observability".to_string()
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_bind_address() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_check_timeout_ms() -> u64 {
  5_000
}

fn default_retry_count() -> u32 {
  3
}

fn default_backoff_base_ms() -> u64 {
  100
}

fn default_backoff_max_ms() -> u64 {
  2_000
}

fn default_degraded_after_ms() -> u64 {
  500
}

fn default_global_timeout_ms() -> u64 {
  10_000
}

fn default_history_len() -> usize {
  20
}

fn default_audit_directory() -> String {
  "data/audit".to_string()
}

fn default_key_env() -> String {
  "AUDIT_ENCRYPTION_KEY".to_string()
}

fn default_salt_env() -> String {
  "AUDIT_IDENTITY_SALT".to_string()
}

fn default_batch_size() -> usize {
  50
}

fn default_channel_capacity() -> usize {
  1_024
}

fn default_flush_interval_ms() -> u64 {
  1_000
}

fn default_retention_days() -> u32 {
  365
}

fn default_cleanup_interval_secs() -> u64 {
  86_400
}
