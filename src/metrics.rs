//! Metrics recording abstraction.
//!
//! The distributed limiter emits a small fixed set of metrics through the
//! [`MetricsRecorder`] trait so callers can bridge into their own pipeline
//! (Prometheus, StatsD, OTLP, ...). The default recorder discards all input,
//! which keeps the hot path free of `Option` checks. Recording is
//! fire-and-forget: a recorder can never change the decision or error
//! returned to the caller.

/// Counter incremented once per completed admission check, tagged with
/// `namespace` and `status` (allowed/denied).
pub const CALL_METRIC: &str = "ratelimit.call";

/// Counter incremented once per failed store invocation, tagged with
/// `namespace` and `type` (the error category).
pub const ERROR_METRIC: &str = "ratelimit.errors";

/// Latency distribution for admission checks in seconds, tagged with
/// `namespace` and `status` (allowed/denied/error).
pub const LATENCY_METRIC: &str = "ratelimit.latency";

/// Sink for counters and distribution observations.
///
/// Implementations must be cheap and non-blocking; they are invoked inside
/// the request hot path.
pub trait MetricsRecorder: Send + Sync {
    /// Increment a counter by `value`.
    fn add(&self, name: &str, value: f64, tags: &[(&str, &str)]);

    /// Record one observation of a distribution.
    fn observe(&self, name: &str, value: f64, tags: &[(&str, &str)]);
}

/// Recorder that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpRecorder;

impl MetricsRecorder for NoOpRecorder {
    fn add(&self, _name: &str, _value: f64, _tags: &[(&str, &str)]) {}

    fn observe(&self, _name: &str, _value: f64, _tags: &[(&str, &str)]) {}
}

/// Recorder that forwards everything to `tracing` at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRecorder;

impl MetricsRecorder for TracingRecorder {
    fn add(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        tracing::debug!(metric = name, value, ?tags, "counter");
    }

    fn observe(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        tracing::debug!(metric = name, value, ?tags, "observation");
    }
}
