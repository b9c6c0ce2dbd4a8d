//! Memory accounting error types.

// Layer 1: Standard library
// (none)

// Layer 2: Third-party
use thiserror::Error;

// Layer 3: Internal
// (none)

/// Errors surfaced by the memory accountant.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// The budget cannot fit the requested reservation, even after eviction.
    #[error("insufficient memory: requested {requested} bytes, {available} available")]
    InsufficientMemory { requested: u64, available: u64 },

    /// A provider's estimate exceeds the per-component cap.
    #[error("memory estimate for '{name}' exceeds cap: {estimate} > {cap} bytes")]
    EstimateExceedsCap { name: String, estimate: u64, cap: u64 },

    /// Component already registered with the accountant.
    #[error("component '{0}' already registered with memory manager")]
    AlreadyRegistered(String),

    /// Component unknown to the accountant.
    #[error("component '{0}' not registered with memory manager")]
    NotRegistered(String),
}

impl MemoryError {
    /// Whether the error is a budget-pressure condition that may clear once
    /// other components release memory.
    pub fn is_transient(&self) -> bool {
        matches!(self, MemoryError::InsufficientMemory { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_memory_display() {
        let err = MemoryError::InsufficientMemory {
            requested: 1024,
            available: 512,
        };
        let msg = err.to_string();
        assert!(msg.contains("1024"));
        assert!(msg.contains("512"));
    }

    #[test]
    fn test_estimate_exceeds_cap_display() {
        let err = MemoryError::EstimateExceedsCap {
            name: "orderbook".to_string(),
            estimate: 2048,
            cap: 1024,
        };
        let msg = err.to_string();
        assert!(msg.contains("orderbook"));
        assert!(msg.contains("2048"));
    }

    #[test]
    fn test_transient_classification() {
        let pressure = MemoryError::InsufficientMemory {
            requested: 1,
            available: 0,
        };
        assert!(pressure.is_transient());
        assert!(!MemoryError::NotRegistered("x".to_string()).is_transient());
    }
}
