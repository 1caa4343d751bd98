//! Metrics engine - label-dimensioned accumulators and their registry.
//!
//! Four primitives share the `Metric` interface:
//! - `Counter`: monotonically increasing total
//! - `Gauge`: value that can move both ways
//! - `Histogram`: cumulative bucket counts with an implicit `+Inf` bucket
//! - `Summary`: windowed observations with index-based quantiles
//!
//! Each metric guards its own series map, so contention on one metric
//! never blocks another. The registry is an explicit instance handed to
//! consumers; there is no process-wide collector.

pub mod counter;
pub mod exposition;
pub mod gauge;
pub mod histogram;
pub mod labels;
pub mod registry;
pub mod summary;

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

pub use counter::Counter;
pub use gauge::Gauge;
pub use histogram::{DEFAULT_BUCKETS, Histogram, HistogramSnapshot};
pub use labels::{LabelSet, MetricDesc};
pub use registry::MetricRegistry;
pub use summary::{DEFAULT_QUANTILES, Summary};

/// The four metric kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
}

impl MetricKind {
    /// Exposition type name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
            Self::Summary => "summary",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One exported line: full sample name, ordered labels, value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    /// Sample name, e.g. `latency_seconds_bucket`.
    pub name: String,
    /// Labels in exposition order (series labels, then `le`/`quantile`).
    pub labels: Vec<(String, String)>,
    /// Sample value.
    pub value: f64,
}

impl Sample {
    fn new(name: impl Into<String>, labels: Vec<(String, String)>, value: f64) -> Self {
        Self {
            name: name.into(),
            labels,
            value,
        }
    }
}

/// Common interface of every metric primitive.
pub trait Metric: Send + Sync + 'static {
    /// Name, help text and label names.
    fn desc(&self) -> &MetricDesc;

    /// Which primitive this is.
    fn kind(&self) -> MetricKind;

    /// Point-in-time samples of every series.
    fn samples(&self) -> Vec<Sample>;

    /// Metric name.
    fn name(&self) -> &str {
        self.desc().name()
    }

    /// Help text.
    fn description(&self) -> &str {
        self.desc().description()
    }

    /// Declared label names, sorted.
    fn label_names(&self) -> &[String] {
        self.desc().label_names()
    }

    /// Render this metric alone in the Prometheus text format.
    fn render_prometheus(&self) -> String {
        let mut out = String::new();
        exposition::encode_metric(self, &mut out);
        out
    }
}

/// Lock a series map, recovering the data if a writer panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
