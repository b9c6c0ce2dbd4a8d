//! Coordinator error taxonomy.

// Layer 1: Standard library
// (none)

// Layer 2: Third-party
use thiserror::Error;

// Layer 3: Internal
use crate::lock::LockError;
use crate::memory::MemoryError;

/// Errors surfaced by coordinator lifecycle operations.
///
/// Structured so callers can branch on the kind; provider errors are
/// wrapped, never swallowed.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// Component name already present in the registry.
    #[error("component '{0}' already registered")]
    AlreadyRegistered(String),

    /// Component name unknown to the registry.
    #[error("component '{0}' not registered")]
    NotRegistered(String),

    /// Registration would introduce a dependency cycle.
    #[error("dependency cycle registering '{name}': {path}")]
    DependencyCycle { name: String, path: String },

    /// A dependency could not be realized.
    #[error("dependency '{dependency}' of '{name}' failed")]
    DependencyFailed {
        name: String,
        dependency: String,
        #[source]
        source: Box<CoordinatorError>,
    },

    /// A dependency's deadline expired during realization.
    #[error("dependency '{dependency}' of '{name}' timed out")]
    DependencyTimeout { name: String, dependency: String },

    /// The provider's build returned an error.
    #[error("build of component '{name}' failed")]
    BuildFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// The provider's teardown returned an error. Non-fatal during
    /// aggregate shutdown.
    #[error("teardown of component '{name}' failed")]
    TeardownFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// The component is in the sticky `Failed` state; an explicit shutdown
    /// resets it.
    #[error("component '{0}' is in failed state")]
    ComponentFailed(String),

    /// The component has live leases and the operation requires it idle.
    #[error("component '{0}' is in use")]
    ComponentInUse(String),

    /// The operation deadline elapsed.
    #[error("operation on component '{0}' timed out")]
    Timeout(String),

    /// The operation was cancelled out-of-band.
    #[error("operation on component '{0}' cancelled")]
    Cancelled(String),

    /// Memory accounting error.
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// Lock manager error.
    #[error(transparent)]
    Lock(#[from] LockError),
}

impl CoordinatorError {
    /// Whether the error is a deadline or cancellation outcome.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            CoordinatorError::Timeout(_)
                | CoordinatorError::Cancelled(_)
                | CoordinatorError::DependencyTimeout { .. }
        )
    }

    /// Whether retrying later may succeed without operator intervention.
    pub fn is_transient(&self) -> bool {
        match self {
            CoordinatorError::Timeout(_)
            | CoordinatorError::Cancelled(_)
            | CoordinatorError::DependencyTimeout { .. }
            | CoordinatorError::ComponentInUse(_) => true,
            CoordinatorError::Memory(memory) => memory.is_transient(),
            CoordinatorError::Lock(lock) => lock.is_transient(),
            _ => false,
        }
    }
}
