//! Coordinator configuration with sensible defaults.

// Layer 1: Standard library
use std::time::Duration;

// Layer 2: Third-party
use serde::{Deserialize, Serialize};

// Layer 3: Internal
use crate::component::DEFAULT_PRIORITY;
use crate::memory::PressureThresholds;
use crate::metrics::{MetricsConfig, DEFAULT_SAMPLE_RATE};

/// Default per-component initialization timeout (30 seconds).
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default idle time before a component becomes evictable (60 seconds).
pub const DEFAULT_MIN_IDLE_TIME: Duration = Duration::from_secs(60);

/// Default background monitor cadence (30 seconds).
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Coordinator configuration.
///
/// Only `total_memory_limit` is required; everything else defaults.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use meridian_coord::CoordinatorConfig;
///
/// let config = CoordinatorConfig::builder(512 * 1024 * 1024)
///     .with_component_memory_limit(128 * 1024 * 1024)
///     .with_min_idle_time(Duration::from_secs(30))
///     .build()
///     .unwrap();
/// assert_eq!(config.total_memory_limit, 512 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Global byte budget for all components.
    pub total_memory_limit: u64,

    /// Per-component cap rejecting unreasonable estimates at registration.
    pub component_memory_limit: Option<u64>,

    /// Fallback initialization timeout for components whose provider defers.
    pub default_init_timeout: Duration,

    /// Fallback eviction priority for providers that defer; lower values
    /// are retained longer.
    pub default_priority: u32,

    /// Pressure classification thresholds.
    pub memory_thresholds: PressureThresholds,

    /// Whether the background monitor trims idle components under pressure.
    pub auto_unload_enabled: bool,

    /// Idle time before a component becomes an eviction candidate.
    pub min_idle_time: Duration,

    /// Background monitor cadence.
    pub check_interval: Duration,

    /// Fraction of metric recordings forwarded to the backend.
    pub metrics_sample_rate: f64,
}

impl CoordinatorConfig {
    /// Create a builder for a budget of `total_memory_limit` bytes.
    pub fn builder(total_memory_limit: u64) -> CoordinatorConfigBuilder {
        CoordinatorConfigBuilder {
            config: CoordinatorConfig {
                total_memory_limit,
                component_memory_limit: None,
                default_init_timeout: DEFAULT_INIT_TIMEOUT,
                default_priority: DEFAULT_PRIORITY,
                memory_thresholds: PressureThresholds::default(),
                auto_unload_enabled: true,
                min_idle_time: DEFAULT_MIN_IDLE_TIME,
                check_interval: DEFAULT_CHECK_INTERVAL,
                metrics_sample_rate: DEFAULT_SAMPLE_RATE,
            },
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.total_memory_limit == 0 {
            return Err("total_memory_limit must be > 0".to_string());
        }
        if let Some(cap) = self.component_memory_limit {
            if cap == 0 || cap > self.total_memory_limit {
                return Err(
                    "component_memory_limit must be > 0 and <= total_memory_limit".to_string(),
                );
            }
        }
        if self.default_init_timeout.is_zero() {
            return Err("default_init_timeout must be > 0".to_string());
        }
        if self.check_interval.is_zero() {
            return Err("check_interval must be > 0".to_string());
        }
        self.memory_thresholds.validate()?;
        if !(0.0..=1.0).contains(&self.metrics_sample_rate) {
            return Err("metrics_sample_rate must lie in [0, 1]".to_string());
        }
        Ok(())
    }

    /// The metrics configuration implied by this config.
    pub fn metrics_config(&self) -> MetricsConfig {
        MetricsConfig {
            sample_rate: self.metrics_sample_rate,
            ..MetricsConfig::default()
        }
    }
}

/// Builder for [`CoordinatorConfig`] with a fluent API.
#[derive(Debug)]
pub struct CoordinatorConfigBuilder {
    config: CoordinatorConfig,
}

impl CoordinatorConfigBuilder {
    /// Set the per-component estimate cap.
    pub fn with_component_memory_limit(mut self, cap: u64) -> Self {
        self.config.component_memory_limit = Some(cap);
        self
    }

    /// Set the fallback initialization timeout.
    pub fn with_default_init_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_init_timeout = timeout;
        self
    }

    /// Set the fallback eviction priority.
    pub fn with_default_priority(mut self, priority: u32) -> Self {
        self.config.default_priority = priority;
        self
    }

    /// Set the pressure classification thresholds.
    pub fn with_memory_thresholds(mut self, thresholds: PressureThresholds) -> Self {
        self.config.memory_thresholds = thresholds;
        self
    }

    /// Enable or disable the background idle trim.
    pub fn with_auto_unload(mut self, enabled: bool) -> Self {
        self.config.auto_unload_enabled = enabled;
        self
    }

    /// Set the idle time before a component becomes evictable.
    pub fn with_min_idle_time(mut self, min_idle_time: Duration) -> Self {
        self.config.min_idle_time = min_idle_time;
        self
    }

    /// Set the background monitor cadence.
    pub fn with_check_interval(mut self, check_interval: Duration) -> Self {
        self.config.check_interval = check_interval;
        self
    }

    /// Set the metric sampling rate.
    pub fn with_metrics_sample_rate(mut self, sample_rate: f64) -> Self {
        self.config.metrics_sample_rate = sample_rate;
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn build(self) -> Result<CoordinatorConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}
