//! Per-component and per-operation timeout registry.
//!
//! The manager maps names to durations and derives deadline-carrying
//! operation contexts from them. Registered operations can be cancelled
//! out-of-band by id.

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

// Layer 3: Internal module imports
use super::deadline::Deadline;

/// Default timeout applied when no per-name override exists (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Registry from component/operation names to timeout durations.
///
/// Lookups fall back to a configurable default. [`TimeoutManager::with_id`]
/// additionally registers a cancellation handle so an out-of-band
/// [`TimeoutManager::cancel`] can abort the operation before its deadline.
///
/// Cheap to clone; all clones share the same tables.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use meridian_coord::timeout::TimeoutManager;
///
/// let timeouts = TimeoutManager::new(Duration::from_secs(10));
/// timeouts.set_for("order-service", Duration::from_secs(2));
///
/// assert_eq!(timeouts.timeout_for("order-service"), Duration::from_secs(2));
/// assert_eq!(timeouts.timeout_for("unknown"), Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct TimeoutManager {
    inner: Arc<TimeoutInner>,
}

#[derive(Debug)]
struct TimeoutInner {
    default: RwLock<Duration>,
    per_name: DashMap<String, Duration>,
    active: DashMap<String, CancellationToken>,
}

impl TimeoutManager {
    /// Create a manager with the given default timeout.
    pub fn new(default: Duration) -> Self {
        Self {
            inner: Arc::new(TimeoutInner {
                default: RwLock::new(default),
                per_name: DashMap::new(),
                active: DashMap::new(),
            }),
        }
    }

    /// Replace the fallback timeout.
    pub fn set_default(&self, duration: Duration) {
        *self.inner.default.write() = duration;
    }

    /// The current fallback timeout.
    pub fn default_timeout(&self) -> Duration {
        *self.inner.default.read()
    }

    /// Set a per-name timeout override.
    pub fn set_for(&self, name: impl Into<String>, duration: Duration) {
        self.inner.per_name.insert(name.into(), duration);
    }

    /// Remove a per-name override, falling back to the default.
    pub fn clear_for(&self, name: &str) {
        self.inner.per_name.remove(name);
    }

    /// Timeout for `name`, falling back to the default.
    pub fn timeout_for(&self, name: &str) -> Duration {
        self.inner
            .per_name
            .get(name)
            .map(|entry| *entry.value())
            .unwrap_or_else(|| *self.inner.default.read())
    }

    /// Compose a deadline for `name` under a parent deadline.
    ///
    /// Returns `min(parent, now + timeout_for(name))` so a tight caller
    /// budget is never extended by a generous per-name timeout.
    pub fn derive_deadline(&self, parent: Deadline, name: &str) -> Deadline {
        parent.earliest(Deadline::after(self.timeout_for(name)))
    }

    /// Derive a deadline and register the operation under `id`.
    ///
    /// The returned [`OperationGuard`] carries the cancellation token to
    /// observe during the operation and deregisters the id on drop.
    /// Registering an id while a previous guard for it is still live
    /// replaces the token; ids are expected to be unique per operation.
    pub fn with_id(
        &self,
        parent: Deadline,
        id: impl Into<String>,
        name: &str,
    ) -> (Deadline, OperationGuard) {
        let id = id.into();
        let token = CancellationToken::new();
        self.inner.active.insert(id.clone(), token.clone());
        let guard = OperationGuard {
            id,
            token,
            inner: Arc::clone(&self.inner),
        };
        (self.derive_deadline(parent, name), guard)
    }

    /// Cancel the operation registered under `id`.
    ///
    /// Returns `true` if an active operation was found and signalled.
    pub fn cancel(&self, id: &str) -> bool {
        match self.inner.active.get(id) {
            Some(entry) => {
                entry.value().cancel();
                true
            }
            None => false,
        }
    }

    /// Number of operations currently registered for cancellation.
    pub fn active_operations(&self) -> usize {
        self.inner.active.len()
    }
}

impl Default for TimeoutManager {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

/// Handle for an operation registered with [`TimeoutManager::with_id`].
///
/// Deregisters the operation on drop so normal completion cleans up the
/// cancellation registry.
#[derive(Debug)]
pub struct OperationGuard {
    id: String,
    token: CancellationToken,
    inner: Arc<TimeoutInner>,
}

impl OperationGuard {
    /// The cancellation token to observe during the operation.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The operation id this guard is registered under.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.inner.active.remove(&self.id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_default_fallback() {
        let timeouts = TimeoutManager::default();
        assert_eq!(timeouts.timeout_for("anything"), DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_per_name_override() {
        let timeouts = TimeoutManager::new(Duration::from_secs(30));
        timeouts.set_for("risk-engine", Duration::from_millis(250));
        assert_eq!(
            timeouts.timeout_for("risk-engine"),
            Duration::from_millis(250)
        );
        timeouts.clear_for("risk-engine");
        assert_eq!(timeouts.timeout_for("risk-engine"), Duration::from_secs(30));
    }

    #[test]
    fn test_set_default() {
        let timeouts = TimeoutManager::new(Duration::from_secs(30));
        timeouts.set_default(Duration::from_secs(1));
        assert_eq!(timeouts.timeout_for("anything"), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_derive_deadline_respects_parent() {
        let timeouts = TimeoutManager::new(Duration::from_secs(3600));
        let parent = Deadline::after(Duration::from_millis(50));
        let derived = timeouts.derive_deadline(parent, "slow-component");
        assert_eq!(derived, parent);
    }

    #[tokio::test]
    async fn test_derive_deadline_respects_name_timeout() {
        let timeouts = TimeoutManager::new(Duration::from_secs(3600));
        timeouts.set_for("fast", Duration::from_millis(10));
        let parent = Deadline::after(Duration::from_secs(3600));
        let derived = timeouts.derive_deadline(parent, "fast");
        assert!(derived.remaining() <= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_with_id_registers_and_cancels() {
        let timeouts = TimeoutManager::default();
        let (_deadline, guard) = timeouts.with_id(Deadline::never(), "op-1", "component");
        assert_eq!(timeouts.active_operations(), 1);
        assert!(!guard.token().is_cancelled());

        assert!(timeouts.cancel("op-1"));
        assert!(guard.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_unknown_id() {
        let timeouts = TimeoutManager::default();
        assert!(!timeouts.cancel("missing"));
    }

    #[tokio::test]
    async fn test_guard_deregisters_on_drop() {
        let timeouts = TimeoutManager::default();
        {
            let (_deadline, _guard) = timeouts.with_id(Deadline::never(), "op-2", "component");
            assert_eq!(timeouts.active_operations(), 1);
        }
        assert_eq!(timeouts.active_operations(), 0);
        assert!(!timeouts.cancel("op-2"));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let timeouts = TimeoutManager::default();
        let clone = timeouts.clone();
        clone.set_for("shared", Duration::from_secs(7));
        assert_eq!(timeouts.timeout_for("shared"), Duration::from_secs(7));
    }
}
