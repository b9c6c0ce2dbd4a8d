//! Metric configuration and snapshot types.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
// (none)

/// Default fraction of recordings forwarded to the backend.
pub const DEFAULT_SAMPLE_RATE: f64 = 1.0;

/// Default cap on custom named values per component.
pub const DEFAULT_MAX_CUSTOM_METRICS: usize = 32;

/// Default cadence of the system-wide aggregation task (10 seconds).
pub const DEFAULT_AGGREGATION_INTERVAL: Duration = Duration::from_secs(10);

/// Collector configuration with sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Fraction in `[0, 1]` of recordings forwarded to the backend.
    /// Internal counters always update regardless.
    pub sample_rate: f64,

    /// Cap on custom named values per component; attempts beyond the cap
    /// are dropped with a one-time warning.
    pub max_custom_metrics: usize,

    /// Cadence of the system-wide aggregation task.
    pub aggregation_interval: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_custom_metrics: DEFAULT_MAX_CUSTOM_METRICS,
            aggregation_interval: DEFAULT_AGGREGATION_INTERVAL,
        }
    }
}

impl MetricsConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.sample_rate) {
            return Err("sample_rate must lie in [0, 1]".to_string());
        }
        if self.aggregation_interval.is_zero() {
            return Err("aggregation_interval must be > 0".to_string());
        }
        Ok(())
    }
}

/// Initialization latency bucket bounds in milliseconds. The final implicit
/// bucket is unbounded.
pub const LATENCY_BUCKETS_MS: [u64; 8] = [1, 5, 10, 50, 100, 500, 1_000, 5_000];

/// Lock-free latency histogram with fixed millisecond buckets.
#[derive(Debug, Default)]
pub struct LatencyHistogram {
    buckets: [AtomicU64; LATENCY_BUCKETS_MS.len() + 1],
    count: AtomicU64,
    sum_micros: AtomicU64,
}

impl LatencyHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation.
    pub fn record(&self, latency: Duration) {
        let millis = latency.as_millis() as u64;
        let index = LATENCY_BUCKETS_MS
            .iter()
            .position(|bound| millis <= *bound)
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        self.buckets[index].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    /// Point-in-time view of the histogram.
    pub fn snapshot(&self) -> HistogramSnapshot {
        let buckets = LATENCY_BUCKETS_MS
            .iter()
            .copied()
            .map(Some)
            .chain(std::iter::once(None))
            .zip(self.buckets.iter())
            .map(|(bound_ms, counter)| HistogramBucket {
                le_millis: bound_ms,
                count: counter.load(Ordering::Relaxed),
            })
            .collect();
        HistogramSnapshot {
            buckets,
            count: self.count.load(Ordering::Relaxed),
            sum: Duration::from_micros(self.sum_micros.load(Ordering::Relaxed)),
        }
    }
}

/// One cumulative-free histogram bucket; `le_millis == None` is the
/// unbounded overflow bucket.
#[derive(Debug, Clone, Serialize)]
pub struct HistogramBucket {
    pub le_millis: Option<u64>,
    pub count: u64,
}

/// Serializable histogram view.
#[derive(Debug, Clone, Serialize)]
pub struct HistogramSnapshot {
    pub buckets: Vec<HistogramBucket>,
    pub count: u64,
    pub sum: Duration,
}

/// Per-component metric view.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentMetricsSnapshot {
    pub name: String,
    pub init_count: u64,
    pub init_errors: u64,
    pub access_count: u64,
    pub error_count: u64,
    pub total_init_time: Duration,
    pub last_init_time: Option<Duration>,
    pub memory_usage: u64,
    pub cpu_usage: f64,
    pub custom: HashMap<String, f64>,
    pub init_latency: HistogramSnapshot,
}

/// System-wide aggregate produced by the aggregation task.
#[derive(Debug, Clone, Serialize)]
pub struct SystemMetricsSnapshot {
    pub total_memory_usage: u64,
    pub total_cpu_usage: f64,
    pub component_count: usize,
    pub aggregated_at: DateTime<Utc>,
}
