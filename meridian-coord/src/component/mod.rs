//! # Component Module
//!
//! The component model shared by the coordinator and its managers: the
//! lifecycle state machine and the [`LazyProvider`] capability every managed
//! subsystem implements.

pub mod lifecycle;
pub mod provider;

pub use lifecycle::{ComponentLifecycle, ComponentState};
pub use provider::{BuildContext, LazyProvider, SharedInstance, DEFAULT_PRIORITY};
