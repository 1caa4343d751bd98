//! Windowed summary with index-based quantiles.
//!
//! Quantiles are an approximation: every read prunes the window, copies
//! and sorts the retained values (O(n log n)), then picks the value at
//! index `⌊q·(n−1)⌋`. The median instead follows the usual rule (mean of
//! the two middle values for even n). This is not a streaming sketch;
//! memory grows with the number of observations inside `max_age`.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{LabelSet, Metric, MetricDesc, MetricKind, Sample, exposition, lock};
use crate::domain::clock::{Clock, SystemClock};
use crate::domain::error::MetricError;

/// Quantiles exported when none are configured.
pub const DEFAULT_QUANTILES: [f64; 4] = [0.5, 0.9, 0.95, 0.99];

/// Value reported for a quantile when the window holds no data.
pub const NO_DATA: f64 = 0.0;

#[derive(Debug, Default)]
struct SummarySeries {
    /// Arrival-ordered observations; the oldest sit at the front.
    observations: VecDeque<(f64, DateTime<Utc>)>,
}

impl SummarySeries {
    fn prune(&mut self, cutoff: DateTime<Utc>) {
        while self
            .observations
            .front()
            .is_some_and(|(_, at)| *at < cutoff)
        {
            self.observations.pop_front();
        }
    }

    fn sorted_values(&self) -> Vec<f64> {
        let mut values: Vec<f64> = self.observations.iter().map(|(v, _)| *v).collect();
        values.sort_by(f64::total_cmp);
        values
    }
}

/// Summary over a sliding retention window.
pub struct Summary {
    desc: MetricDesc,
    max_age: chrono::Duration,
    quantiles: Vec<f64>,
    clock: Arc<dyn Clock>,
    series: Mutex<BTreeMap<LabelSet, SummarySeries>>,
}

impl std::fmt::Debug for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Summary")
            .field("desc", &self.desc)
            .field("max_age", &self.max_age)
            .field("quantiles", &self.quantiles)
            .finish_non_exhaustive()
    }
}

impl Summary {
    /// Create a summary retaining observations for `max_age`.
    pub fn new(
        name: &str,
        description: &str,
        label_names: &[&str],
        max_age: Duration,
    ) -> Result<Self, MetricError> {
        let max_age = chrono::Duration::from_std(max_age)
            .ok()
            .filter(|d| *d > chrono::Duration::zero())
            .ok_or_else(|| MetricError::InvalidMaxAge(name.to_string()))?;

        let desc = MetricDesc::new(name, description, label_names);
        let mut series = BTreeMap::new();
        if desc.label_names().is_empty() {
            series.insert(LabelSet::empty(), SummarySeries::default());
        }
        Ok(Self {
            desc,
            max_age,
            quantiles: DEFAULT_QUANTILES.to_vec(),
            clock: Arc::new(SystemClock),
            series: Mutex::new(series),
        })
    }

    /// Read time from `clock` instead of the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Override the exported quantiles (values are clamped to `[0, 1]`).
    #[must_use]
    pub fn with_quantiles(mut self, quantiles: &[f64]) -> Self {
        self.quantiles = quantiles.iter().map(|q| q.clamp(0.0, 1.0)).collect();
        self
    }

    fn cutoff(&self) -> DateTime<Utc> {
        self.clock.now() - self.max_age
    }

    /// Record one observation, pruning stale ones from the same series.
    pub fn observe(&self, value: f64, labels: &[(&str, &str)]) -> Result<(), MetricError> {
        let key = self.desc.resolve(labels)?;
        let now = self.clock.now();
        let mut series = lock(&self.series);
        let entry = series.entry(key).or_default();
        entry.prune(now - self.max_age);
        entry.observations.push_back((value, now));
        Ok(())
    }

    /// Estimate the requested quantiles for one series.
    ///
    /// Returns `(q, value)` pairs; with no observations inside the window
    /// every value is `NO_DATA`.
    pub fn get_quantiles(&self, quantiles: &[f64], labels: &[(&str, &str)]) -> Vec<(f64, f64)> {
        let values = self.desc.resolve(labels).ok().map_or_else(Vec::new, |key| {
            let cutoff = self.cutoff();
            let mut series = lock(&self.series);
            series.get_mut(&key).map_or_else(Vec::new, |s| {
                s.prune(cutoff);
                s.sorted_values()
            })
        });
        quantiles
            .iter()
            .map(|q| (*q, quantile_of_sorted(&values, *q)))
            .collect()
    }

    /// Observations currently inside the window.
    pub fn count(&self, labels: &[(&str, &str)]) -> usize {
        self.window_stats(labels).0
    }

    /// Sum of observations currently inside the window.
    pub fn sum(&self, labels: &[(&str, &str)]) -> f64 {
        self.window_stats(labels).1
    }

    fn window_stats(&self, labels: &[(&str, &str)]) -> (usize, f64) {
        let Ok(key) = self.desc.resolve(labels) else {
            return (0, 0.0);
        };
        let cutoff = self.cutoff();
        let mut series = lock(&self.series);
        series.get_mut(&key).map_or((0, 0.0), |s| {
            s.prune(cutoff);
            (
                s.observations.len(),
                s.observations.iter().map(|(v, _)| v).sum(),
            )
        })
    }
}

/// Index-based quantile over an ascending slice.
pub fn quantile_of_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return NO_DATA;
    }
    let q = q.clamp(0.0, 1.0);
    if (q - 0.5).abs() < f64::EPSILON {
        let mid = n / 2;
        return if n % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let index = (q * (n - 1) as f64).floor() as usize;
    sorted[index.min(n - 1)]
}

impl Metric for Summary {
    fn desc(&self) -> &MetricDesc {
        &self.desc
    }

    fn kind(&self) -> MetricKind {
        MetricKind::Summary
    }

    fn samples(&self) -> Vec<Sample> {
        let name = self.desc.name();
        let cutoff = self.cutoff();
        let mut series = lock(&self.series);
        let mut samples = Vec::new();

        for (labels, s) in series.iter_mut() {
            s.prune(cutoff);
            let values = s.sorted_values();
            for q in &self.quantiles {
                samples.push(Sample::new(
                    name,
                    labels.to_pairs_with(Some(("quantile", exposition::format_value(*q)))),
                    quantile_of_sorted(&values, *q),
                ));
            }
            #[allow(clippy::cast_precision_loss)]
            samples.push(Sample::new(
                format!("{name}_count"),
                labels.to_pairs_with(None),
                values.len() as f64,
            ));
            samples.push(Sample::new(
                format!("{name}_sum"),
                labels.to_pairs_with(None),
                values.iter().sum(),
            ));
        }
        samples
    }
}
