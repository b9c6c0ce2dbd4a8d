//! Exchange connector adapter.
//!
//! Connectors are statically linked plug-ins: they implement the
//! [`ExchangeConnector`] capability for their venue and are wrapped by
//! [`ConnectorProvider`] to participate in the coordinator lifecycle
//! (connect on build, disconnect on teardown/eviction).

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

// Layer 3: Internal module imports
use super::subsystem::ProviderSpec;
use crate::component::{BuildContext, LazyProvider, SharedInstance};

/// The domain capability an exchange connector exposes.
///
/// Implementations own the venue protocol (REST/WebSocket sessions, symbol
/// maps, rate limiters). Any internal queues MUST apply backpressure and
/// MUST NOT silently drop.
pub trait ExchangeConnector: Send + Sync + 'static {
    /// Venue identifier ("binance", "coinbase", ...).
    fn exchange(&self) -> &str;

    /// Establish sessions. Called once per build epoch.
    ///
    /// # Errors
    ///
    /// Any error fails the component's build.
    fn connect(&mut self) -> anyhow::Result<()>;

    /// Tear sessions down. Must be idempotent.
    ///
    /// # Errors
    ///
    /// Errors surface as `TeardownFailed` but never block eviction.
    fn disconnect(&mut self) -> anyhow::Result<()>;

    /// Whether sessions are currently established.
    fn is_connected(&self) -> bool;
}

/// The registry instance type for connectors.
///
/// The registry shares instances immutably; the cell provides the interior
/// mutability connect/disconnect need.
pub struct ConnectorCell<C: ExchangeConnector> {
    inner: Mutex<C>,
}

impl<C: ExchangeConnector> ConnectorCell<C> {
    fn new(connector: C) -> Self {
        Self {
            inner: Mutex::new(connector),
        }
    }

    /// Run `operation` with exclusive access to the connector.
    pub fn with<R>(&self, operation: impl FnOnce(&mut C) -> R) -> R {
        operation(&mut self.inner.lock())
    }

    /// Whether the underlying connector is connected.
    pub fn is_connected(&self) -> bool {
        self.inner.lock().is_connected()
    }
}

/// Wraps a connector factory into the lazy-provider capability.
pub struct ConnectorProvider<C, F>
where
    C: ExchangeConnector,
    F: Fn() -> anyhow::Result<C> + Send + Sync,
{
    spec: ProviderSpec,
    factory: F,
}

impl<C, F> ConnectorProvider<C, F>
where
    C: ExchangeConnector,
    F: Fn() -> anyhow::Result<C> + Send + Sync,
{
    pub fn new(spec: ProviderSpec, factory: F) -> Self {
        Self { spec, factory }
    }
}

#[async_trait]
impl<C, F> LazyProvider for ConnectorProvider<C, F>
where
    C: ExchangeConnector,
    F: Fn() -> anyhow::Result<C> + Send + Sync,
{
    async fn build(&self, ctx: &BuildContext) -> anyhow::Result<SharedInstance> {
        anyhow::ensure!(
            !ctx.is_cancelled(),
            "connector build for '{}' cancelled",
            ctx.component()
        );
        let mut connector = (self.factory)()?;
        connector.connect()?;
        info!(
            component = ctx.component(),
            exchange = connector.exchange(),
            "connector established"
        );
        Ok(Arc::new(ConnectorCell::new(connector)) as SharedInstance)
    }

    async fn teardown(&self, instance: SharedInstance) -> anyhow::Result<()> {
        let cell = instance
            .downcast::<ConnectorCell<C>>()
            .map_err(|_| anyhow::anyhow!("instance type mismatch in connector teardown"))?;
        cell.with(|connector| {
            if connector.is_connected() {
                connector.disconnect()
            } else {
                Ok(())
            }
        })
    }

    fn memory_estimate(&self) -> u64 {
        self.spec.memory_estimate
    }

    fn timeout(&self) -> Duration {
        self.spec.timeout
    }

    fn priority(&self) -> u32 {
        self.spec.priority
    }
}
