//! Generic adapter from a synchronous subsystem factory to a
//! [`LazyProvider`].
//!
//! Most trading subsystems expose blocking constructors (load reference
//! data, open sockets, mmap history files). The adapter runs the factory on
//! the blocking pool and races it against the build's cancellation token;
//! on cancellation the factory finishes detached and its result is dropped.

// Layer 1: Standard library imports
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use tracing::debug;

// Layer 3: Internal module imports
use crate::component::{BuildContext, LazyProvider, SharedInstance, DEFAULT_PRIORITY};
use crate::timeout::DEFAULT_TIMEOUT;

/// Resource envelope a provider reports to the coordinator.
#[derive(Debug, Clone, Copy)]
pub struct ProviderSpec {
    pub memory_estimate: u64,
    pub timeout: Duration,
    pub priority: u32,
}

impl ProviderSpec {
    /// Spec for a worst-case footprint of `memory_estimate` bytes, with
    /// default timeout and priority (deferring to coordinator config).
    pub fn new(memory_estimate: u64) -> Self {
        Self {
            memory_estimate,
            timeout: DEFAULT_TIMEOUT,
            priority: DEFAULT_PRIORITY,
        }
    }

    /// Set the build timeout upper bound.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the eviction priority (lower = retained longer).
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }
}

type TeardownHook<T> = Box<dyn Fn(Arc<T>) -> anyhow::Result<()> + Send + Sync>;

/// Wraps a synchronous factory into the lazy-provider capability.
///
/// # Examples
///
/// ```rust
/// use meridian_coord::adapters::{ProviderSpec, SubsystemProvider};
///
/// struct SettlementEngine {
///     batch_size: usize,
/// }
///
/// let provider = SubsystemProvider::new(
///     ProviderSpec::new(32 * 1024 * 1024),
///     || Ok(SettlementEngine { batch_size: 500 }),
/// );
/// ```
pub struct SubsystemProvider<T, F>
where
    T: Any + Send + Sync,
    F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
{
    spec: ProviderSpec,
    factory: Arc<F>,
    teardown: Option<TeardownHook<T>>,
}

impl<T, F> SubsystemProvider<T, F>
where
    T: Any + Send + Sync,
    F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
{
    /// Create a provider from a spec and a factory.
    pub fn new(spec: ProviderSpec, factory: F) -> Self {
        Self {
            spec,
            factory: Arc::new(factory),
            teardown: None,
        }
    }

    /// Attach a teardown hook invoked with the instance on shutdown or
    /// eviction. Must be idempotent.
    pub fn with_teardown(
        mut self,
        teardown: impl Fn(Arc<T>) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.teardown = Some(Box::new(teardown));
        self
    }
}

#[async_trait]
impl<T, F> LazyProvider for SubsystemProvider<T, F>
where
    T: Any + Send + Sync,
    F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
{
    async fn build(&self, ctx: &BuildContext) -> anyhow::Result<SharedInstance> {
        anyhow::ensure!(
            !ctx.is_cancelled(),
            "build of '{}' cancelled before start",
            ctx.component()
        );
        let factory = Arc::clone(&self.factory);
        let building = tokio::task::spawn_blocking(move || factory());

        tokio::select! {
            joined = building => {
                let instance = joined
                    .map_err(|join_error| anyhow::anyhow!("subsystem factory panicked: {join_error}"))??;
                Ok(Arc::new(instance) as SharedInstance)
            }
            () = ctx.cancel_token().cancelled() => {
                debug!(component = ctx.component(), "factory abandoned on cancellation");
                anyhow::bail!("build of '{}' cancelled", ctx.component())
            }
        }
    }

    async fn teardown(&self, instance: SharedInstance) -> anyhow::Result<()> {
        let Some(hook) = &self.teardown else {
            return Ok(());
        };
        let typed = instance
            .downcast::<T>()
            .map_err(|_| anyhow::anyhow!("instance type mismatch in teardown"))?;
        hook(typed)
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

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::timeout::Deadline;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    struct HistoricalDataService {
        symbols: usize,
    }

    fn context() -> BuildContext {
        BuildContext::new(
            "historical-data",
            Deadline::never(),
            CancellationToken::new(),
            HashMap::new(),
        )
    }

    #[tokio::test]
    async fn test_build_runs_factory() {
        let provider = SubsystemProvider::new(ProviderSpec::new(1024), || {
            Ok(HistoricalDataService { symbols: 1200 })
        });
        let instance = provider.build(&context()).await.unwrap();
        let service = instance.downcast::<HistoricalDataService>().ok().unwrap();
        assert_eq!(service.symbols, 1200);
    }

    #[tokio::test]
    async fn test_build_propagates_factory_error() {
        let provider = SubsystemProvider::new(ProviderSpec::new(1024), || {
            anyhow::bail!("history files missing");
            #[allow(unreachable_code)]
            Ok(HistoricalDataService { symbols: 0 })
        });
        let error = provider.build(&context()).await.unwrap_err();
        assert!(error.to_string().contains("history files missing"));
    }

    #[tokio::test]
    async fn test_build_respects_pre_cancellation() {
        let provider = SubsystemProvider::new(ProviderSpec::new(1024), || {
            Ok(HistoricalDataService { symbols: 0 })
        });
        let ctx = context();
        ctx.cancel_token().cancel();
        assert!(provider.build(&ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_teardown_hook_runs() {
        static TEARDOWNS: AtomicUsize = AtomicUsize::new(0);
        let provider = SubsystemProvider::new(ProviderSpec::new(1024), || {
            Ok(HistoricalDataService { symbols: 3 })
        })
        .with_teardown(|_service| {
            TEARDOWNS.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let instance = provider.build(&context()).await.unwrap();
        provider.teardown(instance).await.unwrap();
        assert_eq!(TEARDOWNS.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_teardown_without_hook_is_noop() {
        let provider = SubsystemProvider::new(ProviderSpec::new(1024), || {
            Ok(HistoricalDataService { symbols: 3 })
        });
        let instance = provider.build(&context()).await.unwrap();
        provider.teardown(instance).await.unwrap();
    }

    #[tokio::test]
    async fn test_spec_plumbs_through() {
        let provider = SubsystemProvider::new(
            ProviderSpec::new(2048)
                .with_timeout(Duration::from_secs(3))
                .with_priority(80),
            || Ok(HistoricalDataService { symbols: 0 }),
        );
        assert_eq!(provider.memory_estimate(), 2048);
        assert_eq!(provider.timeout(), Duration::from_secs(3));
        assert_eq!(provider.priority(), 80);
    }
}
