//! In-process metrics collector with lock-free counters.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use tracing::warn;

// Layer 3: Internal module imports
use super::backend::{MetricSample, MetricsBackend, NoopBackend};
use super::types::{
    ComponentMetricsSnapshot, LatencyHistogram, MetricsConfig, SystemMetricsSnapshot,
};

#[derive(Debug, Default)]
struct ComponentMetrics {
    init_count: AtomicU64,
    init_errors: AtomicU64,
    access_count: AtomicU64,
    error_count: AtomicU64,
    total_init_micros: AtomicU64,
    last_init_micros: AtomicU64,
    memory_usage: AtomicU64,
    cpu_usage_bits: AtomicU64,
    init_latency: LatencyHistogram,
    custom: Mutex<HashMap<String, f64>>,
    custom_warned: AtomicBool,
}

impl ComponentMetrics {
    fn cpu_usage(&self) -> f64 {
        f64::from_bits(self.cpu_usage_bits.load(Ordering::Relaxed))
    }
}

struct SystemGauges {
    total_memory_usage: AtomicU64,
    total_cpu_usage_bits: AtomicU64,
    component_count: AtomicU64,
    aggregated_at: Mutex<Option<DateTime<Utc>>>,
}

struct CollectorInner {
    config: MetricsConfig,
    components: DashMap<String, Arc<ComponentMetrics>>,
    system: SystemGauges,
    backend: Arc<dyn MetricsBackend>,
}

/// Per-component counters, latency histograms and gauges with sampled
/// backend forwarding.
///
/// Internal counters always update; the configured `sample_rate` only
/// gates forwarding to the [`MetricsBackend`]. Cheap to clone; all clones
/// share the same tables.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<CollectorInner>,
}

impl MetricsCollector {
    /// Create a collector that drops forwarded samples.
    pub fn new(config: MetricsConfig) -> Self {
        Self::with_backend(config, Arc::new(NoopBackend))
    }

    /// Create a collector forwarding sampled recordings to `backend`.
    pub fn with_backend(config: MetricsConfig, backend: Arc<dyn MetricsBackend>) -> Self {
        Self {
            inner: Arc::new(CollectorInner {
                config,
                components: DashMap::new(),
                system: SystemGauges {
                    total_memory_usage: AtomicU64::new(0),
                    total_cpu_usage_bits: AtomicU64::new(0),
                    component_count: AtomicU64::new(0),
                    aggregated_at: Mutex::new(None),
                },
                backend,
            }),
        }
    }

    /// The collector configuration.
    pub fn config(&self) -> &MetricsConfig {
        &self.inner.config
    }

    /// Start tracking a component. Idempotent.
    pub fn register_component(&self, name: impl Into<String>) {
        self.inner
            .components
            .entry(name.into())
            .or_insert_with(|| Arc::new(ComponentMetrics::default()));
    }

    /// Stop tracking a component and drop its counters.
    pub fn unregister_component(&self, name: &str) {
        self.inner.components.remove(name);
    }

    /// Record a successful component acquisition.
    pub fn record_access(&self, name: &str) {
        if let Some(metrics) = self.component(name) {
            metrics.access_count.fetch_add(1, Ordering::Relaxed);
            self.forward(MetricSample::Counter {
                component: name.to_string(),
                metric: "access_count",
                value: 1,
            });
        }
    }

    /// Record a component-level error.
    pub fn record_error(&self, name: &str) {
        if let Some(metrics) = self.component(name) {
            metrics.error_count.fetch_add(1, Ordering::Relaxed);
            self.forward(MetricSample::Counter {
                component: name.to_string(),
                metric: "error_count",
                value: 1,
            });
        }
    }

    /// Record an initialization attempt with its latency.
    pub fn record_init(&self, name: &str, latency: Duration, success: bool) {
        if let Some(metrics) = self.component(name) {
            let micros = latency.as_micros() as u64;
            if success {
                metrics.init_count.fetch_add(1, Ordering::Relaxed);
            } else {
                metrics.init_errors.fetch_add(1, Ordering::Relaxed);
            }
            metrics.total_init_micros.fetch_add(micros, Ordering::Relaxed);
            metrics.last_init_micros.store(micros, Ordering::Relaxed);
            metrics.init_latency.record(latency);
            self.forward(MetricSample::Latency {
                component: name.to_string(),
                metric: if success { "init" } else { "init_error" },
                duration: latency,
            });
        }
    }

    /// Set the component memory gauge.
    pub fn set_memory_usage(&self, name: &str, bytes: u64) {
        if let Some(metrics) = self.component(name) {
            metrics.memory_usage.store(bytes, Ordering::Relaxed);
            self.forward(MetricSample::Gauge {
                component: name.to_string(),
                metric: "memory_usage",
                value: bytes as f64,
            });
        }
    }

    /// Set the component CPU gauge.
    pub fn set_cpu_usage(&self, name: &str, fraction: f64) {
        if let Some(metrics) = self.component(name) {
            metrics
                .cpu_usage_bits
                .store(fraction.to_bits(), Ordering::Relaxed);
            self.forward(MetricSample::Gauge {
                component: name.to_string(),
                metric: "cpu_usage",
                value: fraction,
            });
        }
    }

    /// Record a custom named value for a component.
    ///
    /// Values beyond `max_custom_metrics` distinct names are dropped; the
    /// first drop emits a warning, subsequent drops are silent.
    pub fn record_custom(&self, name: &str, key: impl Into<String>, value: f64) {
        let Some(metrics) = self.component(name) else {
            return;
        };
        let key = key.into();
        {
            let mut custom = metrics.custom.lock();
            let known = custom.contains_key(&key);
            if known || custom.len() < self.inner.config.max_custom_metrics {
                custom.insert(key.clone(), value);
            } else {
                if !metrics.custom_warned.swap(true, Ordering::Relaxed) {
                    warn!(
                        component = name,
                        cap = self.inner.config.max_custom_metrics,
                        dropped = %key,
                        "custom metric cap reached, dropping further names"
                    );
                }
                return;
            }
        }
        self.forward(MetricSample::Gauge {
            component: name.to_string(),
            metric: "custom",
            value,
        });
    }

    /// Per-component snapshot, if the component is tracked.
    pub fn component_snapshot(&self, name: &str) -> Option<ComponentMetricsSnapshot> {
        let metrics = self.component(name)?;
        let last = metrics.last_init_micros.load(Ordering::Relaxed);
        let snapshot = ComponentMetricsSnapshot {
            name: name.to_string(),
            init_count: metrics.init_count.load(Ordering::Relaxed),
            init_errors: metrics.init_errors.load(Ordering::Relaxed),
            access_count: metrics.access_count.load(Ordering::Relaxed),
            error_count: metrics.error_count.load(Ordering::Relaxed),
            total_init_time: Duration::from_micros(
                metrics.total_init_micros.load(Ordering::Relaxed),
            ),
            last_init_time: (last > 0).then(|| Duration::from_micros(last)),
            memory_usage: metrics.memory_usage.load(Ordering::Relaxed),
            cpu_usage: metrics.cpu_usage(),
            custom: metrics.custom.lock().clone(),
            init_latency: metrics.init_latency.snapshot(),
        };
        Some(snapshot)
    }

    /// Snapshots for every tracked component.
    pub fn snapshots(&self) -> Vec<ComponentMetricsSnapshot> {
        let names: Vec<String> = self
            .inner
            .components
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        let mut snapshots: Vec<ComponentMetricsSnapshot> = names
            .iter()
            .filter_map(|name| self.component_snapshot(name))
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Sum per-component gauges into the system-wide aggregate and forward
    /// it. Called by the aggregation task and usable directly in tests.
    pub fn aggregate(&self) -> SystemMetricsSnapshot {
        let mut total_memory: u64 = 0;
        let mut total_cpu: f64 = 0.0;
        let mut count: usize = 0;
        for entry in self.inner.components.iter() {
            total_memory = total_memory.saturating_add(entry.memory_usage.load(Ordering::Relaxed));
            total_cpu += entry.cpu_usage();
            count += 1;
        }

        let aggregated_at = Utc::now();
        self.inner
            .system
            .total_memory_usage
            .store(total_memory, Ordering::Relaxed);
        self.inner
            .system
            .total_cpu_usage_bits
            .store(total_cpu.to_bits(), Ordering::Relaxed);
        self.inner
            .system
            .component_count
            .store(count as u64, Ordering::Relaxed);
        *self.inner.system.aggregated_at.lock() = Some(aggregated_at);

        self.forward(MetricSample::Gauge {
            component: String::new(),
            metric: "total_memory_usage",
            value: total_memory as f64,
        });

        SystemMetricsSnapshot {
            total_memory_usage: total_memory,
            total_cpu_usage: total_cpu,
            component_count: count,
            aggregated_at,
        }
    }

    /// The last aggregate produced, if any.
    pub fn system_snapshot(&self) -> Option<SystemMetricsSnapshot> {
        let aggregated_at = (*self.inner.system.aggregated_at.lock())?;
        Some(SystemMetricsSnapshot {
            total_memory_usage: self.inner.system.total_memory_usage.load(Ordering::Relaxed),
            total_cpu_usage: f64::from_bits(
                self.inner.system.total_cpu_usage_bits.load(Ordering::Relaxed),
            ),
            component_count: self.inner.system.component_count.load(Ordering::Relaxed) as usize,
            aggregated_at,
        })
    }

    fn component(&self, name: &str) -> Option<Arc<ComponentMetrics>> {
        self.inner
            .components
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn forward(&self, sample: MetricSample) {
        if self.should_sample() {
            self.inner.backend.record(sample);
        }
    }

    fn should_sample(&self) -> bool {
        let rate = self.inner.config.sample_rate;
        if rate >= 1.0 {
            return true;
        }
        if rate <= 0.0 {
            return false;
        }
        rand::thread_rng().gen::<f64>() < rate
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("components", &self.inner.components.len())
            .field("sample_rate", &self.inner.config.sample_rate)
            .finish()
    }
}
