//! The coordinator: single entry point for component lifecycle.
//!
//! Owns the registry and delegates to the initialization, memory, lock,
//! timeout and metrics managers. Every manager is a field of this
//! composition root; there are no process-wide singletons.

// Layer 1: Standard library imports
use std::sync::atomic::Ordering;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// Layer 3: Internal module imports
use super::config::CoordinatorConfig;
use super::errors::CoordinatorError;
use super::lease::ComponentLease;
use super::registry::{ComponentEntry, Registry};
use super::snapshots::{ComponentInfo, DashboardSnapshot, SystemSnapshot};
use crate::component::{ComponentState, LazyProvider, SharedInstance, DEFAULT_PRIORITY};
use crate::init::{DependencyResolver, InitializationManager};
use crate::lock::{LockManager, DEFAULT_LOCK_TIMEOUT};
use crate::memory::{spawn_memory_monitor, EvictionSink, MemoryManager};
use crate::metrics::{spawn_metrics_aggregator, MetricsCollector};
use crate::timeout::{Deadline, TimeoutManager, DEFAULT_TIMEOUT};

struct BackgroundTask {
    handle: JoinHandle<()>,
    // Dropping the sender stops the task; kept so shutdown is explicit.
    _stop: tokio::sync::oneshot::Sender<()>,
}

pub(crate) struct CoordinatorInner {
    config: CoordinatorConfig,
    registry: Arc<Registry>,
    init: InitializationManager,
    memory: MemoryManager,
    locks: LockManager,
    timeouts: TimeoutManager,
    metrics: MetricsCollector,
    tasks: Mutex<Vec<BackgroundTask>>,
}

/// Single entry point through which all component lifecycle flows.
///
/// Cheap to clone; all clones share the same state. Must be created inside
/// a Tokio runtime: construction spawns the background pressure monitor
/// (when auto-unload is enabled) and the metrics aggregator.
///
/// # Examples
///
/// ```rust,ignore
/// use meridian_coord::{Coordinator, CoordinatorConfig, Deadline};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = CoordinatorConfig::builder(512 * 1024 * 1024).build()?;
/// let coordinator = Coordinator::new(config);
///
/// coordinator.register(
///     "historical-data",
///     "data-service",
///     Arc::new(HistoricalDataProvider::default()),
///     vec!["connection-pool".to_string()],
/// )?;
///
/// let lease = coordinator
///     .get_component(Deadline::after(Duration::from_secs(10)), "historical-data")
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

impl Coordinator {
    /// Create a coordinator and spawn its background tasks.
    pub fn new(config: CoordinatorConfig) -> Self {
        let memory = MemoryManager::new(
            config.total_memory_limit,
            config.component_memory_limit,
            config.memory_thresholds,
            config.min_idle_time,
        );
        let locks = LockManager::new(DEFAULT_LOCK_TIMEOUT);
        let timeouts = TimeoutManager::new(config.default_init_timeout);
        let metrics = MetricsCollector::new(config.metrics_config());
        let registry = Arc::new(Registry::new());
        let init =
            InitializationManager::new(Arc::clone(&registry), memory.clone(), metrics.clone());

        let inner = Arc::new(CoordinatorInner {
            config,
            registry,
            init,
            memory: memory.clone(),
            locks,
            timeouts,
            metrics: metrics.clone(),
            tasks: Mutex::new(Vec::new()),
        });

        // The accountant executes evictions through the coordinator; bound
        // weakly so dropping the coordinator tears the loop.
        let sink: Arc<dyn EvictionSink> = Arc::clone(&inner) as Arc<dyn EvictionSink>;
        memory.bind_sink(Arc::downgrade(&sink));

        let mut tasks = Vec::new();
        if inner.config.auto_unload_enabled {
            let (handle, stop) = spawn_memory_monitor(memory, inner.config.check_interval);
            tasks.push(BackgroundTask {
                handle,
                _stop: stop,
            });
        }
        let aggregation_interval = inner.config.metrics_config().aggregation_interval;
        let (handle, stop) = spawn_metrics_aggregator(metrics, aggregation_interval);
        tasks.push(BackgroundTask {
            handle,
            _stop: stop,
        });
        *inner.tasks.lock() = tasks;

        Self { inner }
    }

    /// The coordinator configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// The lock manager shared with subsystems.
    pub fn locks(&self) -> &LockManager {
        &self.inner.locks
    }

    /// The timeout registry.
    pub fn timeouts(&self) -> &TimeoutManager {
        &self.inner.timeouts
    }

    /// The metrics collector.
    pub fn metrics(&self) -> &MetricsCollector {
        &self.inner.metrics
    }

    /// The memory accountant.
    pub fn memory(&self) -> &MemoryManager {
        &self.inner.memory
    }

    /// Register a component under the coordinator's management.
    ///
    /// Announces the component to the memory, timeout and metrics managers.
    /// Dependencies may name components that are not registered yet; the
    /// cycle check runs over whatever part of the graph is known, so a
    /// cycle is rejected on whichever registration would complete it.
    ///
    /// A provider that returns the trait-default timeout or priority defers
    /// to the configured `default_init_timeout` / `default_priority`.
    ///
    /// # Errors
    ///
    /// `AlreadyRegistered`, `DependencyCycle`, or a memory error when the
    /// estimate exceeds the per-component cap.
    pub fn register(
        &self,
        name: impl Into<String>,
        kind: impl Into<String>,
        provider: Arc<dyn LazyProvider>,
        dependencies: Vec<String>,
    ) -> Result<(), CoordinatorError> {
        let name = name.into();
        let kind = kind.into();

        if self.inner.registry.contains(&name) {
            return Err(CoordinatorError::AlreadyRegistered(name));
        }
        if let Some(path) = self.inner.registry.would_create_cycle(&name, &dependencies) {
            return Err(CoordinatorError::DependencyCycle { name, path });
        }

        let priority = match provider.priority() {
            DEFAULT_PRIORITY => self.inner.config.default_priority,
            explicit => explicit,
        };
        let timeout = if provider.timeout() == DEFAULT_TIMEOUT {
            self.inner.config.default_init_timeout
        } else {
            provider.timeout()
        };

        self.inner
            .memory
            .register(&name, &kind, provider.memory_estimate(), priority)?;
        self.inner.timeouts.set_for(&name, timeout);
        self.inner.metrics.register_component(&name);

        let entry = ComponentEntry::new(name.clone(), kind, provider, dependencies, priority);
        if let Err(error) = self.inner.registry.insert(entry) {
            // Lost a race with a concurrent registration; undo announcements.
            let _ = self.inner.memory.unregister(&name);
            self.inner.timeouts.clear_for(&name);
            self.inner.metrics.unregister_component(&name);
            return Err(error);
        }

        info!(component = %name, "component registered");
        Ok(())
    }

    /// Remove a component that holds no instance and no leases.
    ///
    /// # Errors
    ///
    /// `NotRegistered`, or `ComponentInUse` while the component is `Ready`,
    /// mid-transition, or leased. Shut it down first.
    pub fn deregister(&self, name: &str) -> Result<(), CoordinatorError> {
        let entry = self
            .inner
            .registry
            .get(name)
            .ok_or_else(|| CoordinatorError::NotRegistered(name.to_string()))?;
        let state = entry.state();
        if !matches!(
            state,
            ComponentState::Registered | ComponentState::Failed
        ) || self.inner.memory.is_in_use(name)
        {
            return Err(CoordinatorError::ComponentInUse(name.to_string()));
        }
        self.inner.registry.remove(name);
        let _ = self.inner.memory.unregister(name);
        self.inner.timeouts.clear_for(name);
        self.inner.metrics.unregister_component(name);
        info!(component = name, "component deregistered");
        Ok(())
    }

    /// Acquire a lease on a component, initializing it if necessary.
    ///
    /// The operation deadline is `min(caller deadline, per-component
    /// timeout)`. Concurrent callers for the same uninitialized component
    /// join a single in-flight build, each bounded by its own deadline.
    ///
    /// # Errors
    ///
    /// `NotRegistered`, `ComponentFailed` (sticky until reset),
    /// `BuildFailed`, `DependencyFailed`/`DependencyTimeout`,
    /// `InsufficientMemory` (after one eviction retry), or `Timeout`.
    pub async fn get_component(
        &self,
        deadline: Deadline,
        name: &str,
    ) -> Result<ComponentLease, CoordinatorError> {
        let entry = self
            .inner
            .registry
            .get(name)
            .ok_or_else(|| CoordinatorError::NotRegistered(name.to_string()))?;
        let op_deadline = self.inner.timeouts.derive_deadline(deadline, name);

        loop {
            // Fast path; also closes the window between a concurrent
            // publish and this caller's lease.
            if let Some(lease) = self.try_lease(&entry) {
                return Ok(lease);
            }
            if op_deadline.is_elapsed() {
                return Err(CoordinatorError::Timeout(name.to_string()));
            }
            self.inner.init.realize(&entry, op_deadline, self).await?;
        }
    }

    /// [`Coordinator::get_component`] with an out-of-band cancellation
    /// token, typically obtained from
    /// [`TimeoutManager::with_id`](crate::TimeoutManager::with_id).
    ///
    /// Cancellation abandons the acquisition; a build in flight is rolled
    /// back by the next acquisition of the same component.
    ///
    /// # Errors
    ///
    /// As `get_component`, plus `Cancelled` when the token fires first.
    pub async fn get_component_cancellable(
        &self,
        deadline: Deadline,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<ComponentLease, CoordinatorError> {
        tokio::select! {
            result = self.get_component(deadline, name) => result,
            () = cancel.cancelled() => Err(CoordinatorError::Cancelled(name.to_string())),
        }
    }

    /// Lease the entry if it is `Ready`. The refcount bump happens under
    /// the cell mutex so eviction cannot interleave between the state check
    /// and the mark.
    fn try_lease(&self, entry: &Arc<ComponentEntry>) -> Option<ComponentLease> {
        let instance: SharedInstance = {
            let cell = entry.cell.lock();
            if !cell.lifecycle.state().is_ready() {
                return None;
            }
            let instance = Arc::clone(cell.instance.as_ref()?);
            self.inner.memory.mark_in_use(&entry.name);
            instance
        };
        entry.access_count.fetch_add(1, Ordering::Relaxed);
        self.inner.metrics.record_access(&entry.name);
        Some(ComponentLease::new(
            entry.name.clone(),
            instance,
            self.inner.memory.clone(),
        ))
    }

    /// Initialize `names` and their transitive dependencies, leaves first.
    ///
    /// Each component gets a slice of the remaining deadline. Fails fast on
    /// the first error; already-initialized components are left `Ready`.
    ///
    /// # Errors
    ///
    /// As [`Coordinator::get_component`], plus `DependencyCycle`.
    pub async fn initialize_components(
        &self,
        deadline: Deadline,
        names: &[String],
    ) -> Result<(), CoordinatorError> {
        let order = self.inner.init.dependency_order(names)?;
        let total = order.len();
        for (index, name) in order.iter().enumerate() {
            let left = (total - index) as u32;
            let slice = deadline.budget_slice(left);
            let lease = self.get_component(slice, name).await?;
            drop(lease);
        }
        Ok(())
    }

    /// Shut a component down, or reset it from `Failed` to `Registered`.
    ///
    /// `Ready` components transition through `ShuttingDown`, run the
    /// provider's teardown outside every registry lock, release their
    /// reservation and land in `Registered` (re-acquirable). A `Failed`
    /// component is reset without a teardown (the failed build left no
    /// instance). Already-`Registered` components are a no-op.
    ///
    /// # Errors
    ///
    /// `NotRegistered`, `TeardownFailed` (reservation released regardless),
    /// or `Timeout` when the deadline elapses mid-teardown.
    pub async fn shutdown_component(
        &self,
        deadline: Deadline,
        name: &str,
    ) -> Result<(), CoordinatorError> {
        let entry = self
            .inner
            .registry
            .get(name)
            .ok_or_else(|| CoordinatorError::NotRegistered(name.to_string()))?;

        let _flight = tokio::time::timeout_at(deadline.instant(), entry.flight.lock())
            .await
            .map_err(|_| CoordinatorError::Timeout(name.to_string()))?;

        let instance = {
            let mut cell = entry.cell.lock();
            match cell.lifecycle.state() {
                ComponentState::Ready => {
                    cell.lifecycle.transition_to(ComponentState::ShuttingDown);
                    cell.instance.take()
                }
                ComponentState::Failed => {
                    cell.lifecycle.transition_to(ComponentState::Registered);
                    cell.last_error = None;
                    drop(cell);
                    self.inner.memory.release(name);
                    info!(component = name, "failed component reset");
                    return Ok(());
                }
                ComponentState::Initializing | ComponentState::ShuttingDown => {
                    // Abandoned mid-flight attempt; roll it back.
                    cell.instance = None;
                    cell.lifecycle.transition_to(ComponentState::Registered);
                    drop(cell);
                    self.inner.memory.release(name);
                    return Ok(());
                }
                ComponentState::Registered => return Ok(()),
            }
        };

        if self.inner.memory.is_in_use(name) {
            warn!(component = name, "shutting down component with live leases");
        }
        self.inner.teardown_entry(&entry, instance, deadline).await
    }

    /// Shut down every `Ready` component in reverse dependency order.
    ///
    /// Best-effort: teardown failures are collected in the report and never
    /// abort the sweep. Each component gets a slice of the remaining
    /// deadline. Idempotent: a second sweep finds nothing `Ready`.
    pub async fn shutdown_all(&self, deadline: Deadline) -> ShutdownReport {
        let names = self.inner.registry.names();
        let order = match self.inner.init.dependency_order(&names) {
            Ok(order) => order,
            // Registration rejects cycles, so this is unreachable in
            // practice; fall back to name order rather than give up.
            Err(_) => names,
        };

        let targets: Vec<String> = order
            .into_iter()
            .rev()
            .filter(|name| {
                self.inner
                    .registry
                    .get(name)
                    .is_some_and(|entry| entry.state().is_ready())
            })
            .collect();

        let total = targets.len();
        let mut outcomes = Vec::with_capacity(total);
        for (index, name) in targets.iter().enumerate() {
            let left = (total - index) as u32;
            let slice = deadline.budget_slice(left);
            let error = self
                .shutdown_component(slice, name)
                .await
                .err()
                .map(|error| error.to_string());
            outcomes.push(ComponentShutdownOutcome {
                name: name.clone(),
                error,
            });
        }

        let report = ShutdownReport { outcomes };
        info!(
            components = total,
            errors = report.errors().len(),
            "aggregate shutdown complete"
        );
        report
    }

    /// Pure read: one row per registered component, sorted by name.
    pub fn list_components(&self) -> Vec<ComponentInfo> {
        self.inner
            .registry
            .entries()
            .iter()
            .map(|entry| self.info_for(entry))
            .collect()
    }

    /// Pure read: a single component row.
    pub fn component_info(&self, name: &str) -> Option<ComponentInfo> {
        let entry = self.inner.registry.get(name)?;
        Some(self.info_for(&entry))
    }

    /// Snapshot backing `/api/system`.
    pub fn system_snapshot(&self) -> SystemSnapshot {
        SystemSnapshot {
            memory: self.inner.memory.snapshot(),
            registered_components: self.inner.registry.count(),
            initialized_components: self.inner.registry.ready_count(),
        }
    }

    /// Snapshot backing `/api/dashboard`.
    pub fn dashboard_snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            system: self.system_snapshot(),
            components: self.list_components(),
            timestamp: Utc::now(),
        }
    }

    fn info_for(&self, entry: &Arc<ComponentEntry>) -> ComponentInfo {
        let (state, init_duration, last_error) = {
            let cell = entry.cell.lock();
            (
                cell.lifecycle.state(),
                cell.init_duration,
                cell.last_error.clone(),
            )
        };
        let idle = self.inner.memory.idle_for(&entry.name).unwrap_or_default();
        ComponentInfo {
            name: entry.name.clone(),
            kind: entry.kind.clone(),
            state,
            memory_estimate: entry.provider.memory_estimate(),
            priority: entry.priority,
            idle_seconds: idle.as_secs_f64(),
            in_use: self.inner.memory.is_in_use(&entry.name),
            access_count: entry.access_count.load(Ordering::Relaxed),
            error_count: entry.error_count.load(Ordering::Relaxed),
            init_duration_ms: init_duration.map(|duration| duration.as_millis() as u64),
            last_error,
        }
    }
}

impl Clone for Coordinator {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("registered", &self.inner.registry.count())
            .field("initialized", &self.inner.registry.ready_count())
            .field("memory", &self.inner.memory)
            .finish()
    }
}

#[async_trait]
impl DependencyResolver for Coordinator {
    async fn resolve(
        &self,
        deadline: Deadline,
        name: &str,
    ) -> Result<ComponentLease, CoordinatorError> {
        self.get_component(deadline, name).await
    }
}

impl CoordinatorInner {
    /// Run the provider's teardown outside every registry lock, release the
    /// reservation and publish the final state. The caller must hold the
    /// entry's flight guard and have transitioned the cell to
    /// `ShuttingDown`.
    async fn teardown_entry(
        &self,
        entry: &Arc<ComponentEntry>,
        instance: Option<SharedInstance>,
        deadline: Deadline,
    ) -> Result<(), CoordinatorError> {
        let name = entry.name.clone();

        let outcome = match instance {
            Some(instance) => tokio::select! {
                result = entry.provider.teardown(instance) => Some(result),
                () = tokio::time::sleep_until(deadline.instant()) => None,
            },
            None => Some(Ok(())),
        };

        self.memory.release(&name);
        self.metrics.set_memory_usage(&name, 0);

        match outcome {
            Some(Ok(())) => {
                let mut cell = entry.cell.lock();
                cell.lifecycle.transition_to(ComponentState::Registered);
                cell.init_duration = None;
                drop(cell);
                info!(component = %name, "component shut down");
                Ok(())
            }
            Some(Err(source)) => {
                {
                    let mut cell = entry.cell.lock();
                    cell.lifecycle.transition_to(ComponentState::Failed);
                    cell.last_error = Some(format!("{source:#}"));
                }
                entry.error_count.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_error(&name);
                Err(CoordinatorError::TeardownFailed { name, source })
            }
            None => {
                {
                    let mut cell = entry.cell.lock();
                    cell.lifecycle.transition_to(ComponentState::Failed);
                    cell.last_error = Some("teardown timed out".to_string());
                }
                entry.error_count.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_error(&name);
                Err(CoordinatorError::Timeout(name))
            }
        }
    }
}

#[async_trait]
impl EvictionSink for CoordinatorInner {
    /// Evict one idle component. Re-checks `Ready` and refcount under the
    /// cell mutex so a live component is never evicted; skips components
    /// with a build or teardown in flight rather than stalling eviction.
    async fn evict(&self, name: &str) -> bool {
        let Some(entry) = self.registry.get(name) else {
            return false;
        };
        let Ok(_flight) = entry.flight.try_lock() else {
            return false;
        };

        let instance = {
            let mut cell = entry.cell.lock();
            if !cell.lifecycle.state().is_ready() {
                return false;
            }
            if self.memory.is_in_use(name) {
                return false;
            }
            cell.lifecycle.transition_to(ComponentState::ShuttingDown);
            cell.instance.take()
        };

        let deadline = Deadline::after(self.config.default_init_timeout);
        match self.teardown_entry(&entry, instance, deadline).await {
            Ok(()) => true,
            Err(error) => {
                // The reservation is released either way; report freed.
                warn!(component = name, %error, "eviction teardown failed");
                true
            }
        }
    }
}

impl Drop for CoordinatorInner {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.handle.abort();
        }
    }
}

/// Outcome of one component's teardown during an aggregate shutdown.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentShutdownOutcome {
    pub name: String,
    /// `None` on success; the error rendering otherwise.
    pub error: Option<String>,
}

/// Aggregate result of [`Coordinator::shutdown_all`].
///
/// One component's teardown failure never prevents others from shutting
/// down; all outcomes are collected here.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShutdownReport {
    pub outcomes: Vec<ComponentShutdownOutcome>,
}

impl ShutdownReport {
    /// Whether every attempted teardown succeeded.
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.error.is_none())
    }

    /// The failed teardowns as `(component, error)` pairs.
    pub fn errors(&self) -> Vec<(&str, &str)> {
        self.outcomes
            .iter()
            .filter_map(|outcome| {
                outcome
                    .error
                    .as_deref()
                    .map(|error| (outcome.name.as_str(), error))
            })
            .collect()
    }

    /// Number of components attempted.
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }
}
