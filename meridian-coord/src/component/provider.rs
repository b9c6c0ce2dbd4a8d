//! The lazy provider capability consumed by the coordinator.
//!
//! Every managed subsystem implements [`LazyProvider`]: a factory with a
//! memory estimate, a build timeout and an eviction priority. Providers are
//! invoked under the coordinator's single-flight guarantee, so `build` does
//! not need to be idempotent on its own; `teardown` must be.

// Layer 1: Standard library imports
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

// Layer 3: Internal module imports
use crate::coordinator::lease::ComponentLease;
use crate::timeout::{Deadline, DEFAULT_TIMEOUT};

/// Default eviction priority when a provider does not override it.
/// Lower values are retained longer.
pub const DEFAULT_PRIORITY: u32 = 50;

/// A type-erased, shared subsystem instance owned by the registry.
///
/// Consumers regain the concrete type through
/// [`ComponentLease::downcast`](crate::ComponentLease::downcast).
pub type SharedInstance = Arc<dyn Any + Send + Sync>;

/// Context handed to [`LazyProvider::build`].
///
/// Carries the remaining deadline, a cancellation token the build must
/// observe at its own suspension points, and leases for every declared
/// dependency. Dependencies are realized in order before the build starts,
/// so each one is observed `Ready` before the dependent's first instruction.
///
/// Dependency leases live only for the duration of the build; subsystems
/// that need a dependency at run time re-acquire it through the coordinator.
pub struct BuildContext {
    component: String,
    deadline: Deadline,
    cancel: CancellationToken,
    dependencies: HashMap<String, ComponentLease>,
}

impl BuildContext {
    pub(crate) fn new(
        component: impl Into<String>,
        deadline: Deadline,
        cancel: CancellationToken,
        dependencies: HashMap<String, ComponentLease>,
    ) -> Self {
        Self {
            component: component.into(),
            deadline,
            cancel,
            dependencies,
        }
    }

    /// Name of the component being built.
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Deadline by which the build must complete.
    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    /// Token signalled when the build is cancelled (deadline expiry or
    /// out-of-band cancellation).
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Lease for a declared dependency, if present.
    pub fn dependency(&self, name: &str) -> Option<&ComponentLease> {
        self.dependencies.get(name)
    }

    /// Typed instance of a declared dependency.
    pub fn dependency_instance<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.dependencies.get(name).and_then(ComponentLease::downcast)
    }

    /// Names of the dependencies available to this build.
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.dependencies.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext")
            .field("component", &self.component)
            .field("deadline", &self.deadline)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("dependencies", &self.dependencies.len())
            .finish()
    }
}

/// The capability a subsystem exposes to be managed by the coordinator.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use meridian_coord::component::{BuildContext, LazyProvider, SharedInstance};
///
/// struct QuoteCache {
///     capacity: usize,
/// }
///
/// struct QuoteCacheProvider;
///
/// #[async_trait]
/// impl LazyProvider for QuoteCacheProvider {
///     async fn build(&self, _ctx: &BuildContext) -> anyhow::Result<SharedInstance> {
///         Ok(Arc::new(QuoteCache { capacity: 10_000 }))
///     }
///
///     async fn teardown(&self, _instance: SharedInstance) -> anyhow::Result<()> {
///         Ok(())
///     }
///
///     fn memory_estimate(&self) -> u64 {
///         64 * 1024 * 1024
///     }
/// }
/// ```
#[async_trait]
pub trait LazyProvider: Send + Sync {
    /// Construct the subsystem instance.
    ///
    /// Runs outside every coordinator mutex and at most once in flight per
    /// component. Long-running builds should observe
    /// [`BuildContext::cancel_token`] at their suspension points.
    ///
    /// # Errors
    ///
    /// Any error is wrapped as `BuildFailed` and leaves the component in
    /// the `Failed` state until explicitly reset.
    async fn build(&self, ctx: &BuildContext) -> anyhow::Result<SharedInstance>;

    /// Release all resources owned by the instance. Must be idempotent.
    ///
    /// # Errors
    ///
    /// Errors are surfaced as `TeardownFailed`; during aggregate shutdown
    /// they are collected and never abort the sweep.
    async fn teardown(&self, instance: SharedInstance) -> anyhow::Result<()>;

    /// Worst-case memory footprint in bytes, used for budget accounting.
    fn memory_estimate(&self) -> u64;

    /// Upper bound on `build` latency.
    fn timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    /// Eviction priority; lower values are retained longer.
    fn priority(&self) -> u32 {
        DEFAULT_PRIORITY
    }
}
