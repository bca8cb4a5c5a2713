//! Telemetry sink contract
//!
//! Best-effort counters, gauges and histograms. Implementations must never
//! fail outward; a sink that cannot deliver simply drops the sample.

use metrics::Label;

/// Metric names emitted by the pipeline and canary
pub mod names {
    pub const PIPELINE_RECORDS: &str = "remedy.pipeline.records";
    pub const PIPELINE_ERRORS: &str = "remedy.pipeline.errors";
    pub const PIPELINE_LATENCY_MS: &str = "remedy.pipeline.latency_ms";
    pub const CANARY_ERROR_RATE: &str = "remedy.canary.error_rate";
    pub const CANARY_P95_MS: &str = "remedy.canary.p95_ms";
}

/// Destination for named metrics with tag sets
pub trait TelemetrySink: Send + Sync {
    fn counter(&self, name: &str, value: u64, tags: &[(&str, String)]);
    fn gauge(&self, name: &str, value: f64, tags: &[(&str, String)]);
    fn histogram(&self, name: &str, value: f64, tags: &[(&str, String)]);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn counter(&self, _name: &str, _value: u64, _tags: &[(&str, String)]) {}
    fn gauge(&self, _name: &str, _value: f64, _tags: &[(&str, String)]) {}
    fn histogram(&self, _name: &str, _value: f64, _tags: &[(&str, String)]) {}
}

/// Forwards to the global `metrics` recorder
///
/// With no recorder installed the facade is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSink;

fn labels(tags: &[(&str, String)]) -> Vec<Label> {
    tags.iter()
        .map(|(key, value)| Label::new((*key).to_string(), value.clone()))
        .collect()
}

impl TelemetrySink for MetricsSink {
    fn counter(&self, name: &str, value: u64, tags: &[(&str, String)]) {
        metrics::counter!(name.to_string(), labels(tags)).increment(value);
    }

    fn gauge(&self, name: &str, value: f64, tags: &[(&str, String)]) {
        metrics::gauge!(name.to_string(), labels(tags)).set(value);
    }

    fn histogram(&self, name: &str, value: f64, tags: &[(&str, String)]) {
        metrics::histogram!(name.to_string(), labels(tags)).record(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sinks_accept_samples_without_a_recorder() {
        let tags = [("mode", "flaky".to_string())];
        for sink in [&NoopSink as &dyn TelemetrySink, &MetricsSink] {
            sink.counter(names::PIPELINE_RECORDS, 5, &tags);
            sink.gauge(names::CANARY_ERROR_RATE, 0.0, &tags);
            sink.histogram(names::PIPELINE_LATENCY_MS, 12.0, &[]);
        }
    }

    #[test]
    fn labels_preserve_order() {
        let out = labels(&[("mode", "normal".into()), ("status", "ok".into())]);
        assert_eq!(out[0].key(), "mode");
        assert_eq!(out[1].value(), "ok");
    }
}
