//! Prelude module for convenient imports.
//!
//! Re-exports the types most embeddings touch:
//!
//! ```rust
//! use meridian_coord::prelude::*;
//! ```
//!
//! # What's Included
//!
//! ## Lifecycle
//! - [`Coordinator`] - The composition root
//! - [`CoordinatorConfig`] - Validated configuration
//! - [`CoordinatorError`] - The error taxonomy
//! - [`ComponentLease`] - Opaque instance handle
//! - [`ComponentState`] - Lifecycle state enum
//! - [`LazyProvider`] / [`BuildContext`] - The subsystem capability
//!
//! ## Resources
//! - [`Deadline`] - Absolute monotonic deadline
//! - [`MemoryPressure`] - Pressure classification
//! - [`LockManager`] - Named locks
//!
//! ## Observability
//! - [`MetricsCollector`] - In-process metrics

pub use crate::component::{BuildContext, ComponentState, LazyProvider, SharedInstance};
pub use crate::coordinator::{
    ComponentLease, Coordinator, CoordinatorConfig, CoordinatorError, ShutdownReport,
};
pub use crate::lock::{LockError, LockManager};
pub use crate::memory::{MemoryError, MemoryPressure};
pub use crate::metrics::MetricsCollector;
pub use crate::timeout::{Deadline, TimeoutManager};
