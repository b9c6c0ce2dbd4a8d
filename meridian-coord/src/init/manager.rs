//! Dependency-ordered, at-most-once, timed component realization.

// Layer 1: Standard library imports
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// Layer 3: Internal module imports
use crate::component::{BuildContext, ComponentState};
use crate::coordinator::errors::CoordinatorError;
use crate::coordinator::lease::ComponentLease;
use crate::coordinator::registry::{ComponentEntry, Registry};
use crate::memory::MemoryManager;
use crate::metrics::MetricsCollector;
use crate::timeout::Deadline;

/// Resolves a dependency by name, recursively realizing it if necessary.
///
/// Implemented by the coordinator; the indirection keeps the realization
/// logic free of a hard reference back to the composition root.
#[async_trait]
pub(crate) trait DependencyResolver: Send + Sync {
    async fn resolve(
        &self,
        deadline: Deadline,
        name: &str,
    ) -> Result<ComponentLease, CoordinatorError>;
}

/// Realizes components in dependency order with at-most-once semantics.
///
/// The per-component single-flight guard lives on the registry entry;
/// concurrent callers for the same uninitialized component collapse onto
/// one build, and waiters observe `Ready`+instance or `Failed`+error,
/// never a partial state.
pub(crate) struct InitializationManager {
    registry: Arc<Registry>,
    memory: MemoryManager,
    metrics: MetricsCollector,
}

impl InitializationManager {
    pub(crate) fn new(
        registry: Arc<Registry>,
        memory: MemoryManager,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            registry,
            memory,
            metrics,
        }
    }

    /// Topological order (leaves first) of `roots` plus their transitive
    /// dependencies.
    ///
    /// Names that are not registered yet are kept in the order as leaves so
    /// the caller surfaces `NotRegistered` at realization time.
    ///
    /// # Errors
    ///
    /// `DependencyCycle` if the reachable graph is not a DAG (defense in
    /// depth; registration already rejects cycles).
    pub(crate) fn dependency_order(
        &self,
        roots: &[String],
    ) -> Result<Vec<String>, CoordinatorError> {
        // Collect the reachable closure.
        let mut closure: HashSet<String> = HashSet::new();
        let mut stack: Vec<String> = roots.to_vec();
        while let Some(name) = stack.pop() {
            if !closure.insert(name.clone()) {
                continue;
            }
            for dependency in self.registry.dependencies_of(&name).unwrap_or_default() {
                stack.push(dependency);
            }
        }

        // Kahn's algorithm over edges dependency -> dependent.
        let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for name in &closure {
            let mut direct: Vec<String> = self
                .registry
                .dependencies_of(name)
                .unwrap_or_default()
                .into_iter()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            direct.retain(|dependency| closure.contains(dependency));
            for dependency in &direct {
                dependents
                    .entry(dependency.clone())
                    .or_default()
                    .push(name.clone());
            }
            dependencies.insert(name.clone(), direct);
        }

        let mut ready: BTreeSet<String> = dependencies
            .iter()
            .filter(|(_, direct)| direct.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        let mut pending: HashMap<String, usize> = dependencies
            .iter()
            .map(|(name, direct)| (name.clone(), direct.len()))
            .collect();

        let mut order: Vec<String> = Vec::with_capacity(closure.len());
        while let Some(name) = ready.iter().next().cloned() {
            ready.remove(&name);
            order.push(name.clone());
            for dependent in dependents.get(&name).into_iter().flatten() {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dependent.clone());
                    }
                }
            }
        }

        if order.len() < closure.len() {
            let mut stuck: Vec<String> = closure
                .into_iter()
                .filter(|name| !order.contains(name))
                .collect();
            stuck.sort();
            return Err(CoordinatorError::DependencyCycle {
                name: roots.join(", "),
                path: stuck.join(" -> "),
            });
        }
        Ok(order)
    }

    /// Realize `entry`, joining an in-flight build if one exists.
    ///
    /// Protocol: acquire the single-flight guard under the deadline,
    /// re-check published state, reserve memory (evicting idle components
    /// once if refused), transition to `Initializing`, realize direct
    /// dependencies with a split budget, then run the provider's build
    /// outside every registry lock.
    pub(crate) async fn realize(
        &self,
        entry: &Arc<ComponentEntry>,
        deadline: Deadline,
        resolver: &dyn DependencyResolver,
    ) -> Result<(), CoordinatorError> {
        let name = entry.name.clone();

        let _flight = tokio::time::timeout_at(deadline.instant(), entry.flight.lock())
            .await
            .map_err(|_| CoordinatorError::Timeout(name.clone()))?;

        // Re-check now that we hold the guard: a concurrent caller may have
        // published while we waited.
        match entry.state() {
            ComponentState::Ready => return Ok(()),
            ComponentState::Failed => {
                return Err(CoordinatorError::ComponentFailed(name));
            }
            ComponentState::Initializing | ComponentState::ShuttingDown => {
                // A previous attempt was abandoned mid-flight (its future
                // was dropped). Roll back before rebuilding.
                self.memory.release(&name);
                let mut cell = entry.cell.lock();
                cell.instance = None;
                cell.lifecycle.transition_to(ComponentState::Registered);
            }
            ComponentState::Registered => {}
        }

        // Cycle re-check, defense in depth next to the registration check.
        self.dependency_order(std::slice::from_ref(&name))?;

        self.reserve_memory(entry).await?;

        {
            let mut cell = entry.cell.lock();
            cell.lifecycle.transition_to(ComponentState::Initializing);
            cell.last_error = None;
        }
        let started = Instant::now();
        debug!(component = %name, deadline = %deadline, "initializing component");

        let leases = match self.realize_dependencies(entry, deadline, resolver).await {
            Ok(leases) => leases,
            Err(error) => {
                self.fail_init(entry, started, &error);
                return Err(error);
            }
        };

        let cancel = CancellationToken::new();
        let ctx = BuildContext::new(name.clone(), deadline, cancel.clone(), leases);

        let outcome = tokio::select! {
            result = entry.provider.build(&ctx) => Some(result),
            () = tokio::time::sleep_until(deadline.instant()) => None,
        };

        match outcome {
            Some(Ok(instance)) => {
                let elapsed = started.elapsed();
                {
                    let mut cell = entry.cell.lock();
                    cell.lifecycle.transition_to(ComponentState::Ready);
                    cell.instance = Some(instance);
                    cell.init_duration = Some(elapsed);
                }
                self.metrics.record_init(&name, elapsed, true);
                self.metrics
                    .set_memory_usage(&name, entry.provider.memory_estimate());
                info!(component = %name, ?elapsed, "component initialized");
                Ok(())
            }
            Some(Err(source)) => {
                let error = CoordinatorError::BuildFailed { name, source };
                self.fail_init(entry, started, &error);
                Err(error)
            }
            None => {
                // Signal the abandoned build and roll back so the next
                // acquisition attempts a fresh build.
                cancel.cancel();
                let error = CoordinatorError::Timeout(name);
                self.fail_init(entry, started, &error);
                Err(error)
            }
        }
    }

    /// Step 4 of the acquisition protocol: fit the estimate into the
    /// budget, evicting idle components once before giving up. Past the
    /// forced-eviction watermark the estimate is evicted up front, before
    /// any new allocation is attempted.
    async fn reserve_memory(&self, entry: &Arc<ComponentEntry>) -> Result<(), CoordinatorError> {
        let estimate = entry.provider.memory_estimate();

        if self.memory.needs_forced_eviction() {
            self.memory.evict_idle_until(estimate).await;
        }

        if self.memory.reserve(&entry.name, estimate)? {
            return Ok(());
        }
        self.memory.evict_idle_until(estimate).await;
        if self.memory.reserve(&entry.name, estimate)? {
            return Ok(());
        }

        Err(crate::memory::MemoryError::InsufficientMemory {
            requested: estimate,
            available: self.memory.limit().saturating_sub(self.memory.usage()),
        }
        .into())
    }

    /// Realize direct dependencies in declared order, each with a
    /// `remaining / (deps_left + 1)` slice of the budget. Recursion through
    /// the resolver handles transitive dependencies.
    async fn realize_dependencies(
        &self,
        entry: &Arc<ComponentEntry>,
        deadline: Deadline,
        resolver: &dyn DependencyResolver,
    ) -> Result<HashMap<String, ComponentLease>, CoordinatorError> {
        let mut leases = HashMap::with_capacity(entry.dependencies.len());
        let total = entry.dependencies.len();
        for (index, dependency) in entry.dependencies.iter().enumerate() {
            let deps_left = (total - index) as u32;
            let slice = deadline.budget_slice(deps_left + 1);
            match resolver.resolve(slice, dependency).await {
                Ok(lease) => {
                    leases.insert(dependency.clone(), lease);
                }
                Err(error) if error.is_timeout() => {
                    return Err(CoordinatorError::DependencyTimeout {
                        name: entry.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
                Err(error) => {
                    return Err(CoordinatorError::DependencyFailed {
                        name: entry.name.clone(),
                        dependency: dependency.clone(),
                        source: Box::new(error),
                    });
                }
            }
        }
        Ok(leases)
    }

    /// Roll back a failed initialization: release the reservation, record
    /// the failure, and leave the component `Failed` (sticky) or
    /// `Registered` (retry on next acquisition) depending on the error.
    ///
    /// Deadline expiry rolls back to `Registered` so the next acquisition
    /// runs a fresh build; provider failures and dependency timeouts stay
    /// `Failed` until an explicit shutdown resets them.
    fn fail_init(&self, entry: &Arc<ComponentEntry>, started: Instant, error: &CoordinatorError) {
        self.memory.release(&entry.name);
        entry.error_count.fetch_add(1, Ordering::Relaxed);

        let next_state = match error {
            CoordinatorError::Timeout(_)
            | CoordinatorError::Cancelled(_)
            | CoordinatorError::DependencyFailed { .. }
            | CoordinatorError::Memory(_) => ComponentState::Registered,
            _ => ComponentState::Failed,
        };
        {
            let mut cell = entry.cell.lock();
            cell.lifecycle.transition_to(next_state);
            cell.instance = None;
            cell.last_error = Some(format!("{error:#}"));
        }
        self.metrics.record_init(&entry.name, started.elapsed(), false);
        self.metrics.record_error(&entry.name);
        warn!(component = %entry.name, %error, state = %next_state, "initialization failed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::component::{LazyProvider, SharedInstance};
    use crate::memory::PressureThresholds;
    use crate::metrics::MetricsConfig;
    use std::time::Duration;

    struct StubProvider;

    #[async_trait]
    impl LazyProvider for StubProvider {
        async fn build(&self, _ctx: &BuildContext) -> anyhow::Result<SharedInstance> {
            Ok(Arc::new(()))
        }

        async fn teardown(&self, _instance: SharedInstance) -> anyhow::Result<()> {
            Ok(())
        }

        fn memory_estimate(&self) -> u64 {
            1
        }
    }

    fn harness() -> (Arc<Registry>, InitializationManager) {
        let registry = Arc::new(Registry::new());
        let memory = MemoryManager::new(
            1024,
            None,
            PressureThresholds::default(),
            Duration::ZERO,
        );
        let metrics = MetricsCollector::new(MetricsConfig::default());
        let manager = InitializationManager::new(Arc::clone(&registry), memory, metrics);
        (registry, manager)
    }

    fn register(registry: &Registry, name: &str, deps: &[&str]) {
        registry
            .insert(ComponentEntry::new(
                name.to_string(),
                "stub".to_string(),
                Arc::new(StubProvider),
                deps.iter().map(|dep| (*dep).to_string()).collect(),
                50,
            ))
            .unwrap();
    }

    #[test]
    fn test_order_leaves_first() {
        let (registry, manager) = harness();
        register(&registry, "a", &[]);
        register(&registry, "b", &["a"]);
        register(&registry, "c", &["b"]);

        let order = manager.dependency_order(&["c".to_string()]).unwrap();
        assert_eq!(order, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_order_diamond() {
        let (registry, manager) = harness();
        register(&registry, "d", &[]);
        register(&registry, "b", &["d"]);
        register(&registry, "c", &["d"]);
        register(&registry, "a", &["b", "c"]);

        let order = manager.dependency_order(&["a".to_string()]).unwrap();
        let position = |name: &str| order.iter().position(|n| n == name).unwrap();
        assert!(position("d") < position("b"));
        assert!(position("d") < position("c"));
        assert!(position("b") < position("a"));
        assert!(position("c") < position("a"));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_order_is_deterministic() {
        let (registry, manager) = harness();
        register(&registry, "b", &[]);
        register(&registry, "a", &[]);
        register(&registry, "c", &[]);
        let roots = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let first = manager.dependency_order(&roots).unwrap();
        let second = manager.dependency_order(&roots).unwrap();
        assert_eq!(first, second);
        // Independent components come out lexicographically.
        assert_eq!(first, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_order_includes_unregistered_leaves() {
        let (registry, manager) = harness();
        register(&registry, "a", &["ghost"]);
        let order = manager.dependency_order(&["a".to_string()]).unwrap();
        assert_eq!(order, vec!["ghost".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_cycle_detected_in_order() {
        let (registry, manager) = harness();
        // Bypass registration checks to wire a raw cycle.
        register(&registry, "a", &["b"]);
        register(&registry, "b", &["a"]);
        let result = manager.dependency_order(&["a".to_string()]);
        assert!(matches!(
            result,
            Err(CoordinatorError::DependencyCycle { .. })
        ));
    }
}
