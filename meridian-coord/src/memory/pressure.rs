//! Memory pressure classification.

// Layer 1: Standard library
// (none)

// Layer 2: Third-party
use serde::{Deserialize, Serialize};

// Layer 3: Internal
// (none)

/// Categorical classification of current memory usage driving eviction
/// urgency.
///
/// Ordered so `pressure >= Medium` comparisons read naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MemoryPressure {
    /// Usage below the low watermark; no action needed.
    Low,
    /// Usage approaching the budget; opportunistic trimming kicks in.
    Medium,
    /// Usage close to the budget; trimming is urgent.
    High,
    /// Budget effectively exhausted; eviction precedes any new allocation.
    Critical,
}

impl std::fmt::Display for MemoryPressure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            MemoryPressure::Low => "low",
            MemoryPressure::Medium => "medium",
            MemoryPressure::High => "high",
            MemoryPressure::Critical => "critical",
        };
        write!(f, "{label}")
    }
}

/// Usage fractions at which pressure escalates.
///
/// `low`, `medium` and `high` are the boundaries into `Medium`, `High` and
/// `Critical` respectively; `critical` is the forced-eviction watermark
/// above which new allocation is refused until eviction runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressureThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for PressureThresholds {
    fn default() -> Self {
        Self {
            low: 0.60,
            medium: 0.75,
            high: 0.85,
            critical: 0.95,
        }
    }
}

impl PressureThresholds {
    /// Validate ordering and range of the fractions.
    pub fn validate(&self) -> Result<(), String> {
        let fractions = [self.low, self.medium, self.high, self.critical];
        if fractions.iter().any(|f| !(0.0..=1.0).contains(f)) {
            return Err("memory thresholds must lie in [0, 1]".to_string());
        }
        if !(self.low < self.medium && self.medium < self.high && self.high <= self.critical) {
            return Err("memory thresholds must be ordered low < medium < high <= critical".to_string());
        }
        Ok(())
    }

    /// Classify a usage fraction of the total budget.
    pub fn classify(&self, usage: u64, limit: u64) -> MemoryPressure {
        let fraction = usage_fraction(usage, limit);
        if fraction < self.low {
            MemoryPressure::Low
        } else if fraction < self.medium {
            MemoryPressure::Medium
        } else if fraction < self.high {
            MemoryPressure::High
        } else {
            MemoryPressure::Critical
        }
    }

    /// Whether usage is past the forced-eviction watermark.
    pub fn forces_eviction(&self, usage: u64, limit: u64) -> bool {
        usage_fraction(usage, limit) > self.critical
    }
}

fn usage_fraction(usage: u64, limit: u64) -> f64 {
    if limit == 0 {
        return 1.0;
    }
    usage as f64 / limit as f64
}

/// Point-in-time view of the memory budget. Derived, never stored.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MemorySnapshot {
    pub total_limit: u64,
    pub total_usage: u64,
    pub pressure: MemoryPressure,
}

impl MemorySnapshot {
    /// Usage as a fraction of the limit.
    pub fn usage_fraction(&self) -> f64 {
        usage_fraction(self.total_usage, self.total_limit)
    }
}
