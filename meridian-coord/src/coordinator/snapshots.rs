//! Serializable observability views of the coordinator.
//!
//! The embedding application exposes these as HTTP/JSON endpoints
//! (`/api/system`, `/api/components`, `/api/dashboard`); the coordinator
//! itself only produces the data.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use serde::Serialize;

// Layer 3: Internal module imports
use crate::component::ComponentState;
use crate::memory::MemorySnapshot;

/// One row of the component listing.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentInfo {
    pub name: String,
    /// Free-form category ("exchange-connector", "cache", ...).
    pub kind: String,
    pub state: ComponentState,
    pub memory_estimate: u64,
    pub priority: u32,
    /// Seconds since the last successful acquisition or lease release.
    pub idle_seconds: f64,
    pub in_use: bool,
    pub access_count: u64,
    pub error_count: u64,
    /// Latency of the most recent successful build.
    pub init_duration_ms: Option<u64>,
    /// Rendering of the most recent build or teardown failure.
    pub last_error: Option<String>,
}

impl ComponentInfo {
    /// Whether the component currently holds a live instance.
    pub fn is_initialized(&self) -> bool {
        self.state.is_ready()
    }
}

/// Snapshot served at `/api/system`.
#[derive(Debug, Clone, Serialize)]
pub struct SystemSnapshot {
    pub memory: MemorySnapshot,
    pub registered_components: usize,
    pub initialized_components: usize,
}

/// Snapshot served at `/api/dashboard`.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub system: SystemSnapshot,
    pub components: Vec<ComponentInfo>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::memory::MemoryPressure;

    fn sample_info(state: ComponentState) -> ComponentInfo {
        ComponentInfo {
            name: "historical-data".to_string(),
            kind: "data-service".to_string(),
            state,
            memory_estimate: 1024,
            priority: 50,
            idle_seconds: 1.5,
            in_use: false,
            access_count: 3,
            error_count: 0,
            init_duration_ms: Some(12),
            last_error: None,
        }
    }

    #[test]
    fn test_initialized_flag() {
        assert!(sample_info(ComponentState::Ready).is_initialized());
        assert!(!sample_info(ComponentState::Registered).is_initialized());
    }

    #[test]
    fn test_dashboard_serializes() {
        let dashboard = DashboardSnapshot {
            system: SystemSnapshot {
                memory: MemorySnapshot {
                    total_limit: 2048,
                    total_usage: 1024,
                    pressure: MemoryPressure::Medium,
                },
                registered_components: 2,
                initialized_components: 1,
            },
            components: vec![sample_info(ComponentState::Ready)],
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&dashboard).unwrap();
        assert!(json.contains("historical-data"));
        assert!(json.contains("Medium"));
        assert!(json.contains("timestamp"));
    }
}
