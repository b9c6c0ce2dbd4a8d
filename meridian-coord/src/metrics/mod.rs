//! # Metrics Module
//!
//! Per-component counters, latency histograms and gauges with sampled
//! backend forwarding and periodic system-wide aggregation.
//!
//! ## Key Types
//! - [`MetricsCollector`]: the in-process collector
//! - [`MetricsBackend`] / [`NoopBackend`]: the forwarding sink
//! - [`spawn_metrics_aggregator`]: background aggregation task
//! - [`render_prometheus`]: text exposition of a dashboard snapshot

pub mod aggregator;
pub mod backend;
pub mod collector;
pub mod exposition;
pub mod types;

pub use aggregator::spawn_metrics_aggregator;
pub use backend::{MetricSample, MetricsBackend, NoopBackend};
pub use collector::MetricsCollector;
pub use exposition::render_prometheus;
pub use types::{
    ComponentMetricsSnapshot, HistogramBucket, HistogramSnapshot, LatencyHistogram, MetricsConfig,
    SystemMetricsSnapshot, DEFAULT_AGGREGATION_INTERVAL, DEFAULT_MAX_CUSTOM_METRICS,
    DEFAULT_SAMPLE_RATE, LATENCY_BUCKETS_MS,
};
