//! # Adapters Module
//!
//! Lazy wrappers that adapt synchronous subsystem APIs to the coordinator
//! lifecycle with cancellation.
//!
//! ## Key Types
//! - [`SubsystemProvider`]: generic factory-to-provider adapter
//! - [`ExchangeConnector`] / [`ConnectorProvider`]: venue connector shape
//! - [`ProviderSpec`]: estimate / timeout / priority envelope

pub mod connector;
pub mod subsystem;

pub use connector::{ConnectorCell, ConnectorProvider, ExchangeConnector};
pub use subsystem::{ProviderSpec, SubsystemProvider};
