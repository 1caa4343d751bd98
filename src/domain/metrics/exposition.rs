//! Prometheus text exposition encoding.
//!
//! ```text
//! # HELP <name> <description>
//! # TYPE <name> <kind>
//! <sample>{k="v",...} <value>
//! ```
//! Braces are omitted for unlabeled samples.

use std::fmt::Write;

use super::{Metric, Sample};

/// Append one metric family (header pair plus every sample) to `out`.
pub fn encode_metric<M: Metric + ?Sized>(metric: &M, out: &mut String) {
    let _ = writeln!(out, "# HELP {} {}", metric.name(), escape_help(metric.description()));
    let _ = writeln!(out, "# TYPE {} {}", metric.name(), metric.kind());
    for sample in metric.samples() {
        encode_sample(&sample, out);
    }
}

/// Append a single sample line.
pub fn encode_sample(sample: &Sample, out: &mut String) {
    out.push_str(&sample.name);
    if !sample.labels.is_empty() {
        out.push('{');
        for (i, (k, v)) in sample.labels.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(out, "{k}=\"{}\"", escape_label_value(v));
        }
        out.push('}');
    }
    let _ = writeln!(out, " {}", format_value(sample.value));
}

/// Number formatting with the exposition spellings for non-finite values.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', r"\\")
        .replace('"', "\\\"")
        .replace('\n', r"\n")
}

fn escape_help(help: &str) -> String {
    help.replace('\\', r"\\").replace('\n', r"\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::{Counter, Histogram};

    #[test]
    fn test_unlabeled_counter_line() {
        let counter = Counter::new("audit_events_total", "Audit events", &[]);
        counter.increment(3.0, &[]).unwrap();
        assert_eq!(
            counter.render_prometheus(),
            "# HELP audit_events_total Audit events\n\
             # TYPE audit_events_total counter\n\
             audit_events_total 3\n"
        );
    }

    #[test]
    fn test_histogram_lines() {
        let histogram = Histogram::new("rt", "Round trip", &["svc"], &[0.5]).unwrap();
        histogram.observe(0.25, &[("svc", "db")]).unwrap();
        let text = histogram.render_prometheus();
        assert!(text.contains("rt_bucket{svc=\"db\",le=\"0.5\"} 1\n"));
        assert!(text.contains("rt_bucket{svc=\"db\",le=\"+Inf\"} 1\n"));
        assert!(text.contains("rt_count{svc=\"db\"} 1\n"));
        assert!(text.contains("rt_sum{svc=\"db\"} 0.25\n"));
    }

    #[test]
    fn test_label_values_escaped() {
        let counter = Counter::new("c", "c", &["path"]);
        counter.inc(&[("path", "a\"b\\c")]).unwrap();
        assert!(counter.render_prometheus().contains(r#"c{path="a\"b\\c"} 1"#));
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(0.1), "0.1");
        assert_eq!(format_value(2.0), "2");
    }
}
