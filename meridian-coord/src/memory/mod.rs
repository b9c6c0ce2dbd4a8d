//! # Memory Module
//!
//! Byte-budget accounting, pressure classification and idle-component
//! eviction for the coordinator.
//!
//! ## Key Types
//! - [`MemoryManager`]: the accountant (reserve/release, refcounts, eviction)
//! - [`MemoryPressure`] / [`PressureThresholds`]: categorical pressure model
//! - [`EvictionSink`]: executor capability implemented by the coordinator
//! - [`spawn_memory_monitor`]: background opportunistic trim task

pub mod error;
pub mod manager;
pub mod monitor;
pub mod pressure;

pub use error::MemoryError;
pub use manager::{EvictionSink, MemoryManager};
pub use monitor::spawn_memory_monitor;
pub use pressure::{MemoryPressure, MemorySnapshot, PressureThresholds};
