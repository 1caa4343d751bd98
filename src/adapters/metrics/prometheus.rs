//! Prometheus / JSON Exporter - registry snapshot to text or JSON.
//!
//! Text output follows the exposition format: a `# HELP`/`# TYPE` pair
//! per metric, then one line per sample. JSON output is
//! `{"metrics": {name: {kind, description, samples}}, "timestamp"}`.

use std::sync::Arc;

use chrono::Utc;
use regex::Regex;
use serde_json::{Map, Value, json};

use crate::domain::error::ObservabilityError;
use crate::domain::metrics::exposition::encode_metric;
use crate::domain::metrics::{Metric, MetricKind, MetricRegistry};

/// Content type of the text exposition format.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Which metrics to export. The default accepts everything.
#[derive(Debug, Clone, Default)]
pub struct ExportFilter {
    name_pattern: Option<Regex>,
    kinds: Option<Vec<MetricKind>>,
}

impl ExportFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Keep metrics whose name matches `pattern` (unanchored regex).
    pub fn name_matching(mut self, pattern: &str) -> Result<Self, ObservabilityError> {
        let re = Regex::new(pattern)
            .map_err(|e| ObservabilityError::Configuration(format!("metric name pattern: {e}")))?;
        self.name_pattern = Some(re);
        Ok(self)
    }

    /// Keep only metrics of the given kinds.
    #[must_use]
    pub fn kinds(mut self, kinds: &[MetricKind]) -> Self {
        self.kinds = Some(kinds.to_vec());
        self
    }

    pub fn accepts(&self, metric: &dyn Metric) -> bool {
        self.name_pattern
            .as_ref()
            .is_none_or(|re| re.is_match(metric.name()))
            && self
                .kinds
                .as_ref()
                .is_none_or(|kinds| kinds.contains(&metric.kind()))
    }
}

/// Renders a shared registry.
#[derive(Clone)]
pub struct PrometheusExporter {
    registry: Arc<MetricRegistry>,
}

impl PrometheusExporter {
    pub fn new(registry: Arc<MetricRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Text exposition of every accepted metric, name-ordered.
    pub fn render(&self, filter: &ExportFilter) -> String {
        let mut out = String::new();
        for metric in self.registry.get_all() {
            if filter.accepts(metric.as_ref()) {
                encode_metric(metric.as_ref(), &mut out);
            }
        }
        out
    }

    /// JSON form of every accepted metric.
    pub fn render_json(&self, filter: &ExportFilter) -> Value {
        let metrics: Map<String, Value> = self
            .registry
            .get_all()
            .iter()
            .filter(|m| filter.accepts(m.as_ref()))
            .map(|m| {
                let samples: Vec<Value> = m
                    .samples()
                    .into_iter()
                    .map(|s| {
                        let labels: Map<String, Value> =
                            s.labels.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
                        json!({ "name": s.name, "labels": labels, "value": s.value })
                    })
                    .collect();
                (
                    m.name().to_string(),
                    json!({
                        "kind": m.kind(),
                        "description": m.description(),
                        "samples": samples,
                    }),
                )
            })
            .collect();

        json!({ "metrics": metrics, "timestamp": Utc::now().to_rfc3339() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn exporter() -> PrometheusExporter {
        let registry = Arc::new(MetricRegistry::new());
        registry
            .counter("http_requests_total", "Requests", &["route"])
            .unwrap()
            .inc(&[("route", "/triage")])
            .unwrap();
        registry.gauge("active_sessions", "Sessions", &[]).unwrap().set(4.0, &[]).unwrap();
        registry
            .summary("request_seconds", "Latency", &[], Duration::from_secs(60))
            .unwrap()
            .observe(0.2, &[])
            .unwrap();
        PrometheusExporter::new(registry)
    }

    #[test]
    fn test_render_headers_and_lines() {
        let text = exporter().render(&ExportFilter::all());
        assert!(text.contains("# HELP active_sessions Sessions\n# TYPE active_sessions gauge\nactive_sessions 4\n"));
        assert!(text.contains("http_requests_total{route=\"/triage\"} 1\n"));
        assert!(text.contains("request_seconds{quantile=\"0.5\"} 0.2\n"));
        assert!(text.contains("request_seconds_count 1\n"));
        // name-ordered
        assert!(text.find("active_sessions").unwrap() < text.find("http_requests_total").unwrap());
    }

    #[test]
    fn test_filters() {
        let exporter = exporter();
        let by_kind = exporter.render(&ExportFilter::all().kinds(&[MetricKind::Counter]));
        assert!(by_kind.contains("http_requests_total"));
        assert!(!by_kind.contains("active_sessions"));

        let by_name = exporter.render(&ExportFilter::all().name_matching("^active_").unwrap());
        assert!(by_name.contains("active_sessions"));
        assert!(!by_name.contains("http_requests_total"));

        assert!(ExportFilter::all().name_matching("(").is_err());
    }

    #[test]
    fn test_json_shape() {
        let body = exporter().render_json(&ExportFilter::all());
        let counter = &body["metrics"]["http_requests_total"];
        assert_eq!(counter["kind"], "counter");
        assert_eq!(counter["samples"][0]["labels"]["route"], "/triage");
        assert_eq!(counter["samples"][0]["value"], 1.0);
        assert!(body["timestamp"].is_string());
    }
}
