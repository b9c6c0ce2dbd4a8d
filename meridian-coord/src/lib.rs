//! # meridian-coord - Component Coordination Runtime
//!
//! Lifecycle substrate of the Meridian multi-exchange trading platform:
//! lazy initialization, memory-pressure-driven eviction, deadlock-free
//! locking, timeout propagation and metrics aggregation for a heterogeneous
//! set of heavyweight subsystems (exchange connectors, historical data
//! services, order managers, matching/risk/settlement engines, gateways).
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use meridian_coord::prelude::*;
//! use meridian_coord::adapters::{ProviderSpec, SubsystemProvider};
//!
//! struct OrderBookCache {
//!     depth: usize,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 1. Configure the coordinator with a memory budget
//!     let config = CoordinatorConfig::builder(512 * 1024 * 1024)
//!         .with_min_idle_time(Duration::from_secs(30))
//!         .build()?;
//!     let coordinator = Coordinator::new(config);
//!
//!     // 2. Register subsystems as lazy providers
//!     coordinator.register(
//!         "orderbook-cache",
//!         "cache",
//!         Arc::new(SubsystemProvider::new(
//!             ProviderSpec::new(64 * 1024 * 1024),
//!             || Ok(OrderBookCache { depth: 50 }),
//!         )),
//!         vec![],
//!     )?;
//!
//!     // 3. Acquire leases; the first acquisition builds the component
//!     let lease = coordinator
//!         .get_component(Deadline::after(Duration::from_secs(5)), "orderbook-cache")
//!         .await?;
//!     let cache: Arc<OrderBookCache> = lease.downcast().ok_or("type mismatch")?;
//!     assert_eq!(cache.depth, 50);
//!
//!     // 4. Cooperative shutdown in reverse dependency order
//!     drop(lease);
//!     let report = coordinator.shutdown_all(Deadline::after(Duration::from_secs(30))).await;
//!     assert!(report.is_clean());
//!     Ok(())
//! }
//! ```
//!
//! # Core Guarantees
//!
//! - **At-most-once builds**: concurrent acquisitions of an uninitialized
//!   component collapse onto a single in-flight build.
//! - **Dependency ordering**: a dependency is observed `Ready` before its
//!   dependent's build starts; the dependency graph is a checked DAG.
//! - **Bounded memory**: the sum of `Ready` estimates never exceeds the
//!   configured budget; idle components are evicted by priority under
//!   pressure, and never while leased.
//! - **Deadline discipline**: every blocking operation carries an explicit
//!   deadline; there is no implicit global timeout.
//! - **Deadlock freedom**: named-lock acquisition runs a wait-for-graph
//!   cycle check before blocking.
//!
//! # Module Organization
//!
//! ## Lifecycle Core
//! - [`coordinator`] - Composition root, registry, leases, config, snapshots
//! - [`component`] - Lifecycle state machine and the `LazyProvider` capability
//! - `init` - Dependency-ordered, at-most-once realization (internal)
//!
//! ## Resource Management
//! - [`memory`] - Byte-budget accounting, pressure, eviction
//! - [`lock`] - Named locks with deadlock detection
//! - [`timeout`] - Deadlines and per-name timeout registry
//!
//! ## Observability
//! - [`metrics`] - Counters, histograms, sampled forwarding, aggregation
//!
//! ## Integration
//! - [`adapters`] - Wrappers adapting synchronous subsystem APIs

pub mod adapters;
pub mod component;
pub mod coordinator;
pub(crate) mod init;
pub mod lock;
pub mod memory;
pub mod metrics;
pub mod prelude;
pub mod timeout;

// Re-export commonly used types
pub use component::{BuildContext, ComponentState, LazyProvider, SharedInstance};
pub use coordinator::{
    ComponentInfo, ComponentLease, Coordinator, CoordinatorConfig, CoordinatorError,
    DashboardSnapshot, ShutdownReport, SystemSnapshot,
};
pub use lock::{LockError, LockManager, LockRecord, LockStats};
pub use memory::{MemoryError, MemoryManager, MemoryPressure, MemorySnapshot, PressureThresholds};
pub use metrics::{MetricsBackend, MetricsCollector, MetricsConfig};
pub use timeout::{Deadline, TimeoutManager};
