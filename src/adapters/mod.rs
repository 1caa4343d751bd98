//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (TCP, HTTP, host statistics, file I/O). Each
//! sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `health`: concrete health checks and their probes
//! - `metrics`: Prometheus/JSON export and the health/metrics server
//! - `storage`: encrypted-file and in-memory audit stores

pub mod health;
pub mod metrics;
pub mod storage;
