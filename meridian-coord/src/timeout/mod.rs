//! # Timeout Module
//!
//! Flat registry from component and operation names to timeout durations,
//! producing deadline-carrying contexts with out-of-band cancellation.
//!
//! ## Key Types
//! - [`Deadline`]: absolute monotonic point by which an operation must finish
//! - [`TimeoutManager`]: per-name durations with a configurable fallback
//! - [`OperationGuard`]: cancellation handle registered under an operation id

pub mod deadline;
pub mod manager;

pub use deadline::Deadline;
pub use manager::{OperationGuard, TimeoutManager, DEFAULT_TIMEOUT};
