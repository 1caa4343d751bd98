//! Histogram with cumulative buckets.

use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{LabelSet, Metric, MetricDesc, MetricKind, Sample, exposition, lock};
use crate::domain::error::MetricError;

/// Default latency buckets in seconds.
pub const DEFAULT_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

#[derive(Debug, Clone)]
struct HistogramSeries {
    /// One count per boundary plus the trailing `+Inf` bucket.
    bucket_counts: Vec<u64>,
    count: u64,
    sum: f64,
}

impl HistogramSeries {
    fn new(buckets: usize) -> Self {
        Self {
            bucket_counts: vec![0; buckets + 1],
            count: 0,
            sum: 0.0,
        }
    }
}

/// Point-in-time copy of one histogram series.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    /// `(upper bound, cumulative count)`, ending with `(+Inf, count)`.
    pub buckets: Vec<(f64, u64)>,
    /// Number of observations.
    pub count: u64,
    /// Sum of observed values.
    pub sum: f64,
}

impl HistogramSnapshot {
    /// Cumulative count for the bucket with upper bound `le`.
    pub fn bucket(&self, le: f64) -> Option<u64> {
        self.buckets
            .iter()
            .find(|(bound, _)| (*bound - le).abs() < f64::EPSILON || (bound.is_infinite() && le.is_infinite()))
            .map(|(_, count)| *count)
    }
}

/// Histogram over ascending boundaries with an implicit `+Inf` bucket.
#[derive(Debug)]
pub struct Histogram {
    desc: MetricDesc,
    bounds: Vec<f64>,
    series: Mutex<BTreeMap<LabelSet, HistogramSeries>>,
}

impl Histogram {
    /// Create a histogram; boundaries must be finite and strictly ascending.
    pub fn new(
        name: &str,
        description: &str,
        label_names: &[&str],
        buckets: &[f64],
    ) -> Result<Self, MetricError> {
        let invalid = |reason: &str| MetricError::InvalidBuckets {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if buckets.is_empty() {
            return Err(invalid("at least one boundary is required"));
        }
        if buckets.iter().any(|b| !b.is_finite()) {
            return Err(invalid("boundaries must be finite; +Inf is implicit"));
        }
        if buckets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(invalid("boundaries must be strictly ascending"));
        }

        let desc = MetricDesc::new(name, description, label_names);
        let mut series = BTreeMap::new();
        if desc.label_names().is_empty() {
            series.insert(LabelSet::empty(), HistogramSeries::new(buckets.len()));
        }
        Ok(Self {
            desc,
            bounds: buckets.to_vec(),
            series: Mutex::new(series),
        })
    }

    /// Configured boundaries (without `+Inf`).
    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    /// Record one observation. O(number of buckets).
    pub fn observe(&self, value: f64, labels: &[(&str, &str)]) -> Result<(), MetricError> {
        let key = self.desc.resolve(labels)?;
        let mut series = lock(&self.series);
        let entry = series
            .entry(key)
            .or_insert_with(|| HistogramSeries::new(self.bounds.len()));

        for (bound, count) in self.bounds.iter().zip(entry.bucket_counts.iter_mut()) {
            if value <= *bound {
                *count += 1;
            }
        }
        if let Some(inf) = entry.bucket_counts.last_mut() {
            *inf += 1;
        }
        entry.count += 1;
        entry.sum += value;
        Ok(())
    }

    /// Snapshot one series, or `None` if it was never written.
    pub fn snapshot(&self, labels: &[(&str, &str)]) -> Option<HistogramSnapshot> {
        let key = self.desc.resolve(labels).ok()?;
        let series = lock(&self.series);
        series.get(&key).map(|s| self.to_snapshot(s))
    }

    fn to_snapshot(&self, series: &HistogramSeries) -> HistogramSnapshot {
        let buckets = self
            .bounds
            .iter()
            .copied()
            .chain(std::iter::once(f64::INFINITY))
            .zip(series.bucket_counts.iter().copied())
            .collect();
        HistogramSnapshot {
            buckets,
            count: series.count,
            sum: series.sum,
        }
    }
}

impl Metric for Histogram {
    fn desc(&self) -> &MetricDesc {
        &self.desc
    }

    fn kind(&self) -> MetricKind {
        MetricKind::Histogram
    }

    fn samples(&self) -> Vec<Sample> {
        let name = self.desc.name();
        let series = lock(&self.series);
        let mut samples = Vec::with_capacity(series.len() * (self.bounds.len() + 3));

        for (labels, s) in series.iter() {
            let snapshot = self.to_snapshot(s);
            for (bound, count) in &snapshot.buckets {
                samples.push(Sample::new(
                    format!("{name}_bucket"),
                    labels.to_pairs_with(Some(("le", exposition::format_value(*bound)))),
                    *count as f64,
                ));
            }
            samples.push(Sample::new(
                format!("{name}_count"),
                labels.to_pairs_with(None),
                snapshot.count as f64,
            ));
            samples.push(Sample::new(
                format!("{name}_sum"),
                labels.to_pairs_with(None),
                snapshot.sum,
            ));
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_counts_are_cumulative() {
        let histogram = Histogram::new("latency_seconds", "Latency", &[], &[0.1, 0.5, 1.0]).unwrap();
        for v in [0.05, 0.3, 0.8, 1.5] {
            histogram.observe(v, &[]).unwrap();
        }

        let snap = histogram.snapshot(&[]).unwrap();
        assert_eq!(snap.bucket(0.1), Some(1));
        assert_eq!(snap.bucket(0.5), Some(2));
        assert_eq!(snap.bucket(1.0), Some(3));
        assert_eq!(snap.bucket(f64::INFINITY), Some(4));
        assert_eq!(snap.count, 4);
        assert!((snap.sum - 2.65).abs() < 1e-9);
    }

    #[test]
    fn test_value_on_boundary_counts_in_that_bucket() {
        let histogram = Histogram::new("h", "h", &[], &[1.0, 2.0]).unwrap();
        histogram.observe(1.0, &[]).unwrap();
        let snap = histogram.snapshot(&[]).unwrap();
        assert_eq!(snap.bucket(1.0), Some(1));
    }

    #[test]
    fn test_rejects_unsorted_buckets() {
        assert!(Histogram::new("h", "h", &[], &[1.0, 0.5]).is_err());
        assert!(Histogram::new("h", "h", &[], &[]).is_err());
        assert!(Histogram::new("h", "h", &[], &[1.0, f64::INFINITY]).is_err());
    }

    #[test]
    fn test_samples_per_series() {
        let histogram = Histogram::new("h", "h", &["route"], &[1.0]).unwrap();
        histogram.observe(0.5, &[("route", "/a")]).unwrap();
        histogram.observe(0.5, &[("route", "/b")]).unwrap();
        // (1 bucket + Inf + count + sum) × 2 series
        assert_eq!(histogram.samples().len(), 8);
    }
}
