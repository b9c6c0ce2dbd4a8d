//! # Coordinator Module
//!
//! The composition root: component registry, lifecycle orchestration and
//! the observability surface.
//!
//! ## Key Types
//! - [`Coordinator`]: register / get / shutdown entry point
//! - [`CoordinatorConfig`]: validated configuration
//! - [`ComponentLease`]: opaque reference-counted instance handle
//! - [`ShutdownReport`]: aggregate best-effort shutdown outcome

pub mod config;
pub mod core;
pub mod errors;
pub mod lease;
pub(crate) mod registry;
pub mod snapshots;

pub use config::{
    CoordinatorConfig, CoordinatorConfigBuilder, DEFAULT_CHECK_INTERVAL, DEFAULT_INIT_TIMEOUT,
    DEFAULT_MIN_IDLE_TIME,
};
pub use core::{ComponentShutdownOutcome, Coordinator, ShutdownReport};
pub use errors::CoordinatorError;
pub use lease::ComponentLease;
pub use snapshots::{ComponentInfo, DashboardSnapshot, SystemSnapshot};
