//! Triage Observability - Library Root
//!
//! Health-check orchestration, the in-process metrics engine and the
//! PDPA-compliant audit pipeline. Re-exports all modules for the binary,
//! integration tests and benchmarks.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod usecases;
