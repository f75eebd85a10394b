// Path: crates/telemetry/src/sinks.rs
//! Defines an abstract trait for metrics reporting, decoupling the
//! engine's core logic from whatever backend ultimately exports it
//! (Prometheus, statsd, ...). Mirrors the teacher's own
//! `MetricsSink`/`NopSink`/`OnceCell` pattern.

use once_cell::sync::OnceCell;

/// A no-op sink, used in tests or when telemetry has not been wired up.
#[derive(Debug, Clone, Copy)]
pub struct NopSink;

/// A lazily-initialized static reference to the global sink implementation.
pub static SINK: OnceCell<&'static dyn ViewMetricsSink> = OnceCell::new();
static NOP_SINK: NopSink = NopSink;

/// Returns the configured sink, or a no-op sink if none has been set.
pub fn metrics() -> &'static dyn ViewMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Metrics emitted by the resolver, module cache, worker pool, and
/// coordinator.
pub trait ViewMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the total view-call counter, labeled by outcome
    /// (`"ok"`, or a `ViewError` tag such as `"methodNotFound"`).
    fn inc_view_calls_total(&self, outcome: &'static str);
    /// Observes end-to-end view call latency in seconds.
    fn observe_view_latency(&self, duration_secs: f64);
    /// Increments the module cache hit counter.
    fn inc_cache_hit(&self);
    /// Increments the module cache miss counter (a compile was triggered).
    fn inc_cache_miss(&self);
    /// Sets the gauge for the number of jobs currently queued, waiting
    /// for an idle worker.
    fn set_worker_queue_depth(&self, depth: u64);
    /// Increments the counter of workers torn down and replaced after a
    /// fatal per-call error.
    fn inc_worker_replaced(&self, reason: &'static str);
}

impl ViewMetricsSink for NopSink {
    fn inc_view_calls_total(&self, _outcome: &'static str) {}
    fn observe_view_latency(&self, _duration_secs: f64) {}
    fn inc_cache_hit(&self) {}
    fn inc_cache_miss(&self) {}
    fn set_worker_queue_depth(&self, _depth: u64) {}
    fn inc_worker_replaced(&self, _reason: &'static str) {}
}
