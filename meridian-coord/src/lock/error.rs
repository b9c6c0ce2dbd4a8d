//! Lock manager error types.

// Layer 1: Standard library
// (none)

// Layer 2: Third-party
use thiserror::Error;

// Layer 3: Internal
// (none)

/// Errors surfaced by the named-lock manager.
#[derive(Error, Debug)]
pub enum LockError {
    /// Lock name unknown to the manager.
    #[error("lock '{0}' not registered")]
    NotRegistered(String),

    /// Lock name already registered.
    #[error("lock '{0}' already registered")]
    AlreadyRegistered(String),

    /// Unregistration refused while the lock is held or awaited.
    #[error("lock '{0}' is in use")]
    InUse(String),

    /// Acquiring would close a cycle in the wait-for graph.
    #[error("deadlock detected: holder '{holder}' acquiring lock '{lock}'")]
    DeadlockDetected { lock: String, holder: String },

    /// Release attempted by a holder that does not own the lock.
    #[error("wrong holder '{holder}' releasing lock '{lock}'")]
    WrongHolder { lock: String, holder: String },

    /// The acquisition deadline elapsed while waiting.
    #[error("timeout acquiring lock '{lock}' for holder '{holder}'")]
    Timeout { lock: String, holder: String },

    /// The acquisition was cancelled out-of-band.
    #[error("acquisition of lock '{0}' cancelled")]
    Cancelled(String),
}

impl LockError {
    /// Whether retrying later may succeed (contention rather than misuse).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LockError::Timeout { .. } | LockError::Cancelled(_) | LockError::InUse(_)
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_deadlock_display() {
        let err = LockError::DeadlockDetected {
            lock: "orders".to_string(),
            holder: "settlement".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("orders"));
        assert!(msg.contains("settlement"));
    }

    #[test]
    fn test_wrong_holder_display() {
        let err = LockError::WrongHolder {
            lock: "positions".to_string(),
            holder: "intruder".to_string(),
        };
        assert!(err.to_string().contains("wrong holder"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(LockError::Timeout {
            lock: "l".to_string(),
            holder: "h".to_string()
        }
        .is_transient());
        assert!(!LockError::NotRegistered("l".to_string()).is_transient());
        assert!(!LockError::DeadlockDetected {
            lock: "l".to_string(),
            holder: "h".to_string()
        }
        .is_transient());
    }
}
