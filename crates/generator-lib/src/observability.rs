//! Observability of the generator itself
//!
//! Provides:
//! - Prometheus metrics (generated spans/traces/points, sink errors, pod restarts, latency)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge,
};
use std::fmt;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for one generation call (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5,
];

/// Signal label values
pub mod signals {
    pub const TRACES: &str = "traces";
    pub const METRICS: &str = "metrics";
}

static GLOBAL_METRICS: OnceLock<GeneratorMetricsInner> = OnceLock::new();

struct GeneratorMetricsInner {
    spans_generated: IntCounter,
    traces_generated: IntCounter,
    metric_points_generated: IntCounter,
    sink_errors: IntCounterVec,
    pod_restarts: IntCounterVec,
    active_flags: IntGauge,
    generation_latency_seconds: HistogramVec,
}

impl GeneratorMetricsInner {
    fn new() -> Self {
        Self {
            spans_generated: register_int_counter!(
                "telemetry_generator_spans_generated_total",
                "Total number of spans generated"
            )
            .expect("Failed to register spans_generated"),

            traces_generated: register_int_counter!(
                "telemetry_generator_traces_generated_total",
                "Total number of traces generated"
            )
            .expect("Failed to register traces_generated"),

            metric_points_generated: register_int_counter!(
                "telemetry_generator_metric_points_generated_total",
                "Total number of metric points generated"
            )
            .expect("Failed to register metric_points_generated"),

            sink_errors: register_int_counter_vec!(
                "telemetry_generator_sink_errors_total",
                "Batches the sink rejected and that were dropped",
                &["signal"]
            )
            .expect("Failed to register sink_errors"),

            pod_restarts: register_int_counter_vec!(
                "telemetry_generator_pod_restarts_total",
                "Simulated pod restarts",
                &["service"]
            )
            .expect("Failed to register pod_restarts"),

            active_flags: register_int_gauge!(
                "telemetry_generator_active_flags",
                "Number of flags currently active"
            )
            .expect("Failed to register active_flags"),

            generation_latency_seconds: register_histogram_vec!(
                "telemetry_generator_generation_latency_seconds",
                "Time spent building one trace or metric batch",
                &["signal"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register generation_latency_seconds"),
        }
    }
}

/// Handle to the process-wide generator metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone, Default)]
pub struct GeneratorMetrics {
    _private: (),
}

impl fmt::Debug for GeneratorMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GeneratorMetrics")
    }
}

impl GeneratorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(GeneratorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &GeneratorMetricsInner {
        GLOBAL_METRICS.get_or_init(GeneratorMetricsInner::new)
    }

    /// Count one finished trace of `spans` spans
    pub fn record_trace(&self, spans: usize) {
        self.inner().traces_generated.inc();
        self.inner().spans_generated.inc_by(spans as u64);
    }

    pub fn record_metric_points(&self, points: usize) {
        self.inner().metric_points_generated.inc_by(points as u64);
    }

    pub fn inc_sink_errors(&self, signal: &str) {
        self.inner().sink_errors.with_label_values(&[signal]).inc();
    }

    pub fn inc_pod_restarts(&self, service: &str) {
        self.inner().pod_restarts.with_label_values(&[service]).inc();
    }

    pub fn set_active_flags(&self, count: usize) {
        self.inner().active_flags.set(count as i64);
    }

    pub fn observe_generation_latency(&self, signal: &str, duration_secs: f64) {
        self.inner()
            .generation_latency_seconds
            .with_label_values(&[signal])
            .observe(duration_secs);
    }
}

/// Structured logger for generator lifecycle events
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, services: usize, root_routes: usize, flags: usize) {
        info!(
            event = "generator_started",
            instance = %self.instance,
            version = %version,
            services = services,
            root_routes = root_routes,
            flags = flags,
            "Telemetry generator started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "generator_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Telemetry generator shutting down"
        );
    }

    pub fn log_task_started(&self, kind: &str, target: &str, interval_ms: u128) {
        info!(
            event = "task_started",
            instance = %self.instance,
            kind = %kind,
            target = %target,
            interval_ms = interval_ms as u64,
            "Generation task started"
        );
    }

    pub fn log_flag_change(&self, flag: &str, enabled: bool, source: &str) {
        info!(
            event = "flag_changed",
            instance = %self.instance,
            flag = %flag,
            enabled = enabled,
            source = %source,
            "Flag state changed"
        );
    }

    /// Dropped batches are never retried
    pub fn log_batch_dropped(&self, signal: &str, target: &str, error: &str) {
        warn!(
            event = "batch_dropped",
            instance = %self.instance,
            signal = %signal,
            target = %target,
            error = %error,
            "Sink rejected batch, dropping it"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handles_share_registry() {
        let a = GeneratorMetrics::new();
        let b = a.clone();
        a.record_trace(3);
        b.record_metric_points(2);
        a.inc_sink_errors(signals::TRACES);
        b.inc_pod_restarts("checkout");
        a.set_active_flags(1);
        a.observe_generation_latency(signals::METRICS, 0.0002);

        let families = prometheus::gather();
        let names: Vec<_> = families.iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.contains(&"telemetry_generator_spans_generated_total".to_string()));
        assert!(names.contains(&"telemetry_generator_sink_errors_total".to_string()));
        assert!(names.contains(&"telemetry_generator_generation_latency_seconds".to_string()));
    }

    #[test]
    fn test_structured_logger_events() {
        let logger = StructuredLogger::new("test");
        logger.log_startup("0.1.0", 3, 1, 2);
        logger.log_task_started("trace", "frontend/product", 1000);
        logger.log_flag_change("deploy", true, "api");
        logger.log_batch_dropped("traces", "frontend/product", "channel closed");
        logger.log_shutdown("test");
    }
}
