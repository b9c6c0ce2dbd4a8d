//! Component registry: the single owner of instances.
//!
//! Each entry pairs the provider with a per-component cell (state +
//! instance, under its own mutex) and a single-flight build guard.
//! Components reference each other by name only; raw instance handles never
//! leave the registry except through leases.

// Layer 1: Standard library imports
use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use parking_lot::{Mutex, RwLock};

// Layer 3: Internal module imports
use super::errors::CoordinatorError;
use crate::component::{ComponentLifecycle, ComponentState, LazyProvider, SharedInstance};

/// Mutable per-component state. Guarded by the entry's own mutex, which is
/// never held across an await point.
pub(crate) struct ComponentCell {
    pub(crate) lifecycle: ComponentLifecycle,
    pub(crate) instance: Option<SharedInstance>,
    pub(crate) last_error: Option<String>,
    pub(crate) init_duration: Option<Duration>,
}

impl ComponentCell {
    fn new() -> Self {
        Self {
            lifecycle: ComponentLifecycle::new(),
            instance: None,
            last_error: None,
            init_duration: None,
        }
    }
}

/// One registered component.
pub(crate) struct ComponentEntry {
    pub(crate) name: String,
    pub(crate) kind: String,
    pub(crate) provider: Arc<dyn LazyProvider>,
    pub(crate) dependencies: Vec<String>,
    pub(crate) priority: u32,
    pub(crate) cell: Mutex<ComponentCell>,
    /// Single-flight guard: at most one build or teardown in flight per
    /// component. A separate synchronization object so unrelated components
    /// never block each other.
    pub(crate) flight: tokio::sync::Mutex<()>,
    pub(crate) access_count: AtomicU64,
    pub(crate) error_count: AtomicU64,
}

impl ComponentEntry {
    pub(crate) fn new(
        name: String,
        kind: String,
        provider: Arc<dyn LazyProvider>,
        dependencies: Vec<String>,
        priority: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            kind,
            provider,
            dependencies,
            priority,
            cell: Mutex::new(ComponentCell::new()),
            flight: tokio::sync::Mutex::new(()),
            access_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        })
    }

    pub(crate) fn state(&self) -> ComponentState {
        self.cell.lock().lifecycle.state()
    }
}

/// Name-keyed component table under a readers-writer discipline.
#[derive(Default)]
pub(crate) struct Registry {
    components: RwLock<HashMap<String, Arc<ComponentEntry>>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert a new entry.
    ///
    /// # Errors
    ///
    /// `AlreadyRegistered` if the name is taken.
    pub(crate) fn insert(&self, entry: Arc<ComponentEntry>) -> Result<(), CoordinatorError> {
        let mut components = self.components.write();
        if components.contains_key(&entry.name) {
            return Err(CoordinatorError::AlreadyRegistered(entry.name.clone()));
        }
        components.insert(entry.name.clone(), entry);
        Ok(())
    }

    pub(crate) fn get(&self, name: &str) -> Option<Arc<ComponentEntry>> {
        self.components.read().get(name).map(Arc::clone)
    }

    pub(crate) fn remove(&self, name: &str) -> Option<Arc<ComponentEntry>> {
        self.components.write().remove(name)
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.components.read().contains_key(name)
    }

    /// All entries, sorted by name for deterministic iteration.
    pub(crate) fn entries(&self) -> Vec<Arc<ComponentEntry>> {
        let mut entries: Vec<Arc<ComponentEntry>> =
            self.components.read().values().map(Arc::clone).collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// All registered names, sorted.
    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.components.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn count(&self) -> usize {
        self.components.read().len()
    }

    pub(crate) fn ready_count(&self) -> usize {
        self.components
            .read()
            .values()
            .filter(|entry| entry.state().is_ready())
            .count()
    }

    /// Declared dependencies of `name`, if registered.
    pub(crate) fn dependencies_of(&self, name: &str) -> Option<Vec<String>> {
        self.components
            .read()
            .get(name)
            .map(|entry| entry.dependencies.clone())
    }

    /// Whether adding `name` with `dependencies` would close a cycle in the
    /// name graph; returns the offending path when it would.
    ///
    /// Edges may point at names that are not registered yet (forward
    /// declarations); the walk follows whatever is known, so the cycle
    /// `A -> B -> A` is caught on whichever registration completes it.
    pub(crate) fn would_create_cycle(
        &self,
        name: &str,
        dependencies: &[String],
    ) -> Option<String> {
        let components = self.components.read();
        // Depth-first walk from each declared dependency through the known
        // graph; reaching `name` again closes a cycle.
        let mut visited: HashSet<String> = HashSet::new();
        for root in dependencies {
            let mut path = vec![name.to_string()];
            if Self::reaches(
                &components,
                root,
                name,
                &mut visited,
                &mut path,
            ) {
                path.push(name.to_string());
                return Some(path.join(" -> "));
            }
        }
        None
    }

    fn reaches(
        components: &HashMap<String, Arc<ComponentEntry>>,
        from: &str,
        target: &str,
        visited: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> bool {
        if from == target {
            return true;
        }
        if !visited.insert(from.to_string()) {
            return false;
        }
        path.push(from.to_string());
        if let Some(entry) = components.get(from) {
            for dependency in &entry.dependencies {
                if Self::reaches(components, dependency, target, visited, path) {
                    return true;
                }
            }
        }
        path.pop();
        false
    }
}
