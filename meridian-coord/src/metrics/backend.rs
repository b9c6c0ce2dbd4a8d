//! Metric backend trait for forwarding sampled recordings.
//!
//! The collector always maintains its internal counters; a sampled subset
//! of recordings is additionally forwarded to a backend (Prometheus bridge,
//! statsd, a test recorder). The exposition endpoint itself is owned by the
//! embedding application.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use serde::Serialize;

// Layer 3: Internal module imports
// (none)

/// One forwarded recording.
#[derive(Debug, Clone, Serialize)]
pub enum MetricSample {
    /// Monotonic counter increment.
    Counter {
        component: String,
        metric: &'static str,
        value: u64,
    },
    /// Gauge level.
    Gauge {
        component: String,
        metric: &'static str,
        value: f64,
    },
    /// Latency observation.
    Latency {
        component: String,
        metric: &'static str,
        duration: Duration,
    },
}

impl MetricSample {
    /// The component the sample belongs to; empty for system-wide samples.
    pub fn component(&self) -> &str {
        match self {
            MetricSample::Counter { component, .. }
            | MetricSample::Gauge { component, .. }
            | MetricSample::Latency { component, .. } => component,
        }
    }
}

/// Sink for sampled metric recordings.
///
/// Implementations must be cheap and non-blocking; anything expensive
/// belongs behind an internal queue.
pub trait MetricsBackend: Send + Sync {
    fn record(&self, sample: MetricSample);
}

/// Backend that drops every sample. The default when no backend is wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBackend;

impl MetricsBackend for NoopBackend {
    fn record(&self, _sample: MetricSample) {}
}
