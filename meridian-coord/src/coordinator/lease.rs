//! Opaque component leases.
//!
//! A lease is the only way an instance crosses the registry boundary. It
//! carries a reference count: the component is `in_use` while any lease is
//! live and becomes evictable only after the last lease drops.

// Layer 1: Standard library imports
use std::any::Any;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use tracing::trace;
use uuid::Uuid;

// Layer 3: Internal module imports
use crate::component::SharedInstance;
use crate::memory::MemoryManager;

/// A reference-counted handle on a `Ready` component instance.
///
/// Dropping the lease decrements the component's refcount and refreshes its
/// idle clock. Leases are deliberately not `Clone`: every holder goes
/// through the coordinator so the accounting stays exact.
///
/// # Examples
///
/// ```rust,ignore
/// let lease = coordinator.get_component(deadline, "order-service").await?;
/// let service: Arc<OrderService> = lease.downcast().expect("type mismatch");
/// service.submit(order)?;
/// // lease drops here; the component becomes evictable again once idle
/// ```
pub struct ComponentLease {
    id: Uuid,
    name: String,
    instance: SharedInstance,
    memory: MemoryManager,
}

impl ComponentLease {
    pub(crate) fn new(name: String, instance: SharedInstance, memory: MemoryManager) -> Self {
        let id = Uuid::new_v4();
        trace!(component = %name, lease = %id, "lease acquired");
        Self {
            id,
            name,
            instance,
            memory,
        }
    }

    /// Unique lease identifier, carried in tracing events.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Name of the leased component.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type-erased instance.
    pub fn instance(&self) -> &SharedInstance {
        &self.instance
    }

    /// The instance downcast to its concrete type.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.instance).downcast::<T>().ok()
    }
}

impl Drop for ComponentLease {
    fn drop(&mut self) {
        trace!(component = %self.name, lease = %self.id, "lease released");
        self.memory.mark_idle(&self.name);
    }
}

impl std::fmt::Debug for ComponentLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentLease")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::memory::PressureThresholds;
    use std::time::Duration;

    fn memory() -> MemoryManager {
        let manager = MemoryManager::new(
            1024,
            None,
            PressureThresholds::default(),
            Duration::ZERO,
        );
        manager.register("cache", "cache", 64, 50).unwrap();
        manager
    }

    #[test]
    fn test_lease_decrements_refcount_on_drop() {
        let memory = memory();
        memory.mark_in_use("cache");
        assert!(memory.is_in_use("cache"));

        let lease = ComponentLease::new(
            "cache".to_string(),
            Arc::new(42u64) as SharedInstance,
            memory.clone(),
        );
        drop(lease);
        assert!(!memory.is_in_use("cache"));
    }

    #[test]
    fn test_downcast() {
        let memory = memory();
        memory.mark_in_use("cache");
        let lease = ComponentLease::new(
            "cache".to_string(),
            Arc::new(42u64) as SharedInstance,
            memory,
        );
        assert_eq!(*lease.downcast::<u64>().unwrap(), 42);
        assert!(lease.downcast::<String>().is_none());
        assert_eq!(lease.name(), "cache");
    }
}
