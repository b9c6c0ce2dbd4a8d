//! Named advisory locks with timeouts, cancellation and deadlock detection.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

// Layer 3: Internal module imports
use super::error::LockError;
use super::waitfor::would_deadlock;
use crate::timeout::Deadline;

/// Default per-lock acquisition timeout (10 seconds).
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Usage statistics kept per lock.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LockStats {
    /// Successful acquisitions over the lock's lifetime.
    pub acquisitions: u64,
    /// Acquisitions that had to queue behind a holder.
    pub contentions: u64,
    /// Cumulative time the lock has been held.
    pub total_held: Duration,
    pub last_acquired: Option<DateTime<Utc>>,
    pub last_released: Option<DateTime<Utc>>,
}

/// Observability view of a single lock.
#[derive(Debug, Clone, Serialize)]
pub struct LockRecord {
    pub name: String,
    pub holder: Option<String>,
    pub is_held: bool,
    /// How long the current holder has held the lock.
    pub held_for: Option<Duration>,
    pub waiters: usize,
    pub stats: LockStats,
}

pub(crate) struct Waiter {
    holder: String,
    deadline: Deadline,
    seq: u64,
    tx: oneshot::Sender<()>,
}

pub(crate) struct LockEntry {
    pub(crate) holder: Option<String>,
    pub(crate) acquired_at: Option<Instant>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) waiters: Vec<Waiter>,
    pub(crate) stats: LockStats,
}

impl LockEntry {
    pub(crate) fn new(timeout: Option<Duration>) -> Self {
        Self {
            holder: None,
            acquired_at: None,
            timeout,
            waiters: Vec::new(),
            stats: LockStats::default(),
        }
    }
}

#[derive(Default)]
pub(crate) struct LockTables {
    pub(crate) locks: HashMap<String, LockEntry>,
    /// holder -> lock name it is currently blocked on.
    pub(crate) waits_for: HashMap<String, String>,
    pub(crate) next_seq: u64,
}

struct LockInner {
    default_timeout: Duration,
    detect_deadlocks: bool,
    tables: Mutex<LockTables>,
}

/// Named advisory locks with deadline-bounded acquisition and
/// wait-for-graph deadlock detection.
///
/// Waiters are served deadline-ordered (earlier deadline first), FIFO among
/// equal deadlines, with direct hand-off on release. The deadlock check
/// runs under the manager mutex before a caller blocks; a would-be cycle is
/// rejected with `DeadlockDetected` without blocking.
///
/// Cheap to clone; all clones share the same tables. Lock operations never
/// touch the coordinator registry, and the coordinator never calls into a
/// provider while holding the manager mutex.
#[derive(Clone)]
pub struct LockManager {
    inner: Arc<LockInner>,
}

impl LockManager {
    /// Create a manager with the given default acquisition timeout.
    pub fn new(default_timeout: Duration) -> Self {
        Self::with_detection(default_timeout, true)
    }

    /// Create a manager, optionally disabling deadlock detection.
    pub fn with_detection(default_timeout: Duration, detect_deadlocks: bool) -> Self {
        Self {
            inner: Arc::new(LockInner {
                default_timeout,
                detect_deadlocks,
                tables: Mutex::new(LockTables::default()),
            }),
        }
    }

    /// Register a named lock using the manager's default timeout.
    ///
    /// # Errors
    ///
    /// `AlreadyRegistered` for duplicate names.
    pub fn register_lock(&self, name: impl Into<String>) -> Result<(), LockError> {
        self.register_lock_entry(name.into(), None)
    }

    /// Register a named lock with a per-lock acquisition timeout.
    ///
    /// # Errors
    ///
    /// `AlreadyRegistered` for duplicate names.
    pub fn register_lock_with_timeout(
        &self,
        name: impl Into<String>,
        timeout: Duration,
    ) -> Result<(), LockError> {
        self.register_lock_entry(name.into(), Some(timeout))
    }

    fn register_lock_entry(&self, name: String, timeout: Option<Duration>) -> Result<(), LockError> {
        let mut tables = self.inner.tables.lock();
        if tables.locks.contains_key(&name) {
            return Err(LockError::AlreadyRegistered(name));
        }
        tables.locks.insert(name, LockEntry::new(timeout));
        Ok(())
    }

    /// Remove a lock from the manager.
    ///
    /// # Errors
    ///
    /// `NotRegistered` for unknown names; `InUse` while the lock is held or
    /// has queued waiters.
    pub fn unregister_lock(&self, name: &str) -> Result<(), LockError> {
        let mut tables = self.inner.tables.lock();
        let entry = tables
            .locks
            .get(name)
            .ok_or_else(|| LockError::NotRegistered(name.to_string()))?;
        if entry.holder.is_some() || !entry.waiters.is_empty() {
            return Err(LockError::InUse(name.to_string()));
        }
        tables.locks.remove(name);
        Ok(())
    }

    /// Acquire `name` for `holder`, waiting up to the deadline.
    ///
    /// The effective deadline is the earlier of the caller deadline and the
    /// per-lock timeout (falling back to the manager default).
    ///
    /// # Errors
    ///
    /// `NotRegistered`, `DeadlockDetected` (without blocking), or
    /// `Timeout` when the effective deadline elapses in the queue.
    pub async fn acquire(
        &self,
        deadline: Deadline,
        name: &str,
        holder: &str,
    ) -> Result<(), LockError> {
        let token = CancellationToken::new();
        self.acquire_cancellable(deadline, name, holder, &token).await
    }

    /// [`LockManager::acquire`] with an out-of-band cancellation token.
    ///
    /// # Errors
    ///
    /// As `acquire`, plus `Cancelled` when the token fires first.
    pub async fn acquire_cancellable(
        &self,
        deadline: Deadline,
        name: &str,
        holder: &str,
        cancel: &CancellationToken,
    ) -> Result<(), LockError> {
        let (effective, seq, rx) = {
            let mut tables = self.inner.tables.lock();
            let entry = tables
                .locks
                .get(name)
                .ok_or_else(|| LockError::NotRegistered(name.to_string()))?;
            let effective =
                deadline.earliest(Deadline::after(entry.timeout.unwrap_or(self.inner.default_timeout)));

            if entry.holder.is_none() && entry.waiters.is_empty() {
                Self::grant_in_place(
                    tables
                        .locks
                        .get_mut(name)
                        .ok_or_else(|| LockError::NotRegistered(name.to_string()))?,
                    holder,
                );
                return Ok(());
            }

            if self.inner.detect_deadlocks && would_deadlock(&tables, holder, name) {
                warn!(lock = name, holder, "deadlock detected, rejecting acquisition");
                return Err(LockError::DeadlockDetected {
                    lock: name.to_string(),
                    holder: holder.to_string(),
                });
            }

            let seq = tables.next_seq;
            tables.next_seq += 1;
            let (tx, rx) = oneshot::channel();
            let entry = tables
                .locks
                .get_mut(name)
                .ok_or_else(|| LockError::NotRegistered(name.to_string()))?;
            let waiter = Waiter {
                holder: holder.to_string(),
                deadline: effective,
                seq,
                tx,
            };
            let position = entry
                .waiters
                .iter()
                .position(|queued| (queued.deadline, queued.seq) > (effective, seq))
                .unwrap_or(entry.waiters.len());
            entry.waiters.insert(position, waiter);
            entry.stats.contentions += 1;
            tables
                .waits_for
                .insert(holder.to_string(), name.to_string());
            (effective, seq, rx)
        };

        debug!(lock = name, holder, deadline = %effective, "queued for lock");

        enum WaitOutcome {
            Granted,
            TimedOut,
            Cancelled,
        }

        let outcome = tokio::select! {
            granted = rx => {
                if granted.is_ok() {
                    WaitOutcome::Granted
                } else {
                    // Sender dropped without a grant; treat as timeout.
                    WaitOutcome::TimedOut
                }
            }
            _ = tokio::time::sleep_until(effective.instant()) => WaitOutcome::TimedOut,
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
        };

        let mut tables = self.inner.tables.lock();
        tables.waits_for.remove(holder);

        match outcome {
            WaitOutcome::Granted => Ok(()),
            WaitOutcome::TimedOut | WaitOutcome::Cancelled => {
                let mut granted_in_race = false;
                if let Some(entry) = tables.locks.get_mut(name) {
                    if let Some(position) =
                        entry.waiters.iter().position(|queued| queued.seq == seq)
                    {
                        entry.waiters.remove(position);
                    } else {
                        granted_in_race = entry.holder.as_deref() == Some(holder);
                    }
                }
                if granted_in_race {
                    // Granted in the window between the timer firing and
                    // re-locking the tables: give the lock back.
                    Self::release_holder(&mut tables, name, holder);
                }
                match outcome {
                    WaitOutcome::Cancelled => Err(LockError::Cancelled(name.to_string())),
                    _ => Err(LockError::Timeout {
                        lock: name.to_string(),
                        holder: holder.to_string(),
                    }),
                }
            }
        }
    }

    /// Non-blocking acquisition attempt.
    ///
    /// Returns `Ok(true)` on acquisition, `Ok(false)` when the lock is held
    /// or queued.
    ///
    /// # Errors
    ///
    /// `NotRegistered`, or `DeadlockDetected` when blocking here would have
    /// closed a cycle.
    pub fn try_acquire(&self, name: &str, holder: &str) -> Result<bool, LockError> {
        let mut tables = self.inner.tables.lock();
        let entry = tables
            .locks
            .get(name)
            .ok_or_else(|| LockError::NotRegistered(name.to_string()))?;
        if entry.holder.is_none() && entry.waiters.is_empty() {
            Self::grant_in_place(
                tables
                    .locks
                    .get_mut(name)
                    .ok_or_else(|| LockError::NotRegistered(name.to_string()))?,
                holder,
            );
            return Ok(true);
        }
        if self.inner.detect_deadlocks && would_deadlock(&tables, holder, name) {
            return Err(LockError::DeadlockDetected {
                lock: name.to_string(),
                holder: holder.to_string(),
            });
        }
        Ok(false)
    }

    /// Release `name` held by `holder`, handing off to the best waiter.
    ///
    /// # Errors
    ///
    /// `NotRegistered`, or `WrongHolder` if the caller is not the recorded
    /// holder.
    pub fn release(&self, name: &str, holder: &str) -> Result<(), LockError> {
        let mut tables = self.inner.tables.lock();
        let entry = tables
            .locks
            .get(name)
            .ok_or_else(|| LockError::NotRegistered(name.to_string()))?;
        if entry.holder.as_deref() != Some(holder) {
            return Err(LockError::WrongHolder {
                lock: name.to_string(),
                holder: holder.to_string(),
            });
        }
        Self::release_holder(&mut tables, name, holder);
        Ok(())
    }

    /// Current holder of the lock.
    ///
    /// # Errors
    ///
    /// `NotRegistered` for unknown names.
    pub fn holder(&self, name: &str) -> Result<Option<String>, LockError> {
        let tables = self.inner.tables.lock();
        tables
            .locks
            .get(name)
            .map(|entry| entry.holder.clone())
            .ok_or_else(|| LockError::NotRegistered(name.to_string()))
    }

    /// Whether the lock is currently held.
    pub fn is_held(&self, name: &str) -> bool {
        self.inner
            .tables
            .lock()
            .locks
            .get(name)
            .is_some_and(|entry| entry.holder.is_some())
    }

    /// Observability record for a single lock.
    ///
    /// # Errors
    ///
    /// `NotRegistered` for unknown names.
    pub fn record(&self, name: &str) -> Result<LockRecord, LockError> {
        let tables = self.inner.tables.lock();
        let entry = tables
            .locks
            .get(name)
            .ok_or_else(|| LockError::NotRegistered(name.to_string()))?;
        Ok(LockRecord {
            name: name.to_string(),
            holder: entry.holder.clone(),
            is_held: entry.holder.is_some(),
            held_for: entry.acquired_at.map(|at| at.elapsed()),
            waiters: entry.waiters.len(),
            stats: entry.stats.clone(),
        })
    }

    /// Number of registered locks.
    pub fn lock_count(&self) -> usize {
        self.inner.tables.lock().locks.len()
    }

    fn grant_in_place(entry: &mut LockEntry, holder: &str) {
        entry.holder = Some(holder.to_string());
        entry.acquired_at = Some(Instant::now());
        entry.stats.acquisitions += 1;
        entry.stats.last_acquired = Some(Utc::now());
    }

    /// Clear the holder, update statistics and hand off to the next waiter.
    /// Must run under the tables mutex.
    fn release_holder(tables: &mut LockTables, name: &str, holder: &str) {
        let entry = match tables.locks.get_mut(name) {
            Some(entry) => entry,
            None => return,
        };
        debug_assert_eq!(entry.holder.as_deref(), Some(holder));
        if let Some(acquired_at) = entry.acquired_at.take() {
            entry.stats.total_held += acquired_at.elapsed();
        }
        entry.stats.last_released = Some(Utc::now());
        entry.holder = None;

        // Hand off to the first waiter that is still listening.
        while !entry.waiters.is_empty() {
            let waiter = entry.waiters.remove(0);
            entry.holder = Some(waiter.holder.clone());
            entry.acquired_at = Some(Instant::now());
            if waiter.tx.send(()).is_ok() {
                entry.stats.acquisitions += 1;
                entry.stats.last_acquired = Some(Utc::now());
                tables.waits_for.remove(&waiter.holder);
                return;
            }
            // Waiter gave up (timeout/cancel); revert and try the next one.
            entry.holder = None;
            entry.acquired_at = None;
        }
    }
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("locks", &self.lock_count())
            .field("detect_deadlocks", &self.inner.detect_deadlocks)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn manager() -> LockManager {
        LockManager::new(DEFAULT_LOCK_TIMEOUT)
    }

    #[tokio::test]
    async fn test_register_acquire_release() {
        let locks = manager();
        locks.register_lock("orders").unwrap();
        locks
            .acquire(Deadline::never(), "orders", "engine")
            .await
            .unwrap();
        assert_eq!(locks.holder("orders").unwrap().as_deref(), Some("engine"));
        locks.release("orders", "engine").unwrap();
        assert!(!locks.is_held("orders"));
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let locks = manager();
        locks.register_lock("orders").unwrap();
        assert!(matches!(
            locks.register_lock("orders"),
            Err(LockError::AlreadyRegistered(_))
        ));
    }

    #[tokio::test]
    async fn test_unregister_refused_while_held() {
        let locks = manager();
        locks.register_lock("orders").unwrap();
        locks
            .acquire(Deadline::never(), "orders", "engine")
            .await
            .unwrap();
        assert!(matches!(
            locks.unregister_lock("orders"),
            Err(LockError::InUse(_))
        ));
        locks.release("orders", "engine").unwrap();
        locks.unregister_lock("orders").unwrap();
        assert_eq!(locks.lock_count(), 0);
    }

    #[tokio::test]
    async fn test_wrong_holder_release() {
        let locks = manager();
        locks.register_lock("orders").unwrap();
        locks
            .acquire(Deadline::never(), "orders", "engine")
            .await
            .unwrap();
        assert!(matches!(
            locks.release("orders", "intruder"),
            Err(LockError::WrongHolder { .. })
        ));
    }

    #[tokio::test]
    async fn test_acquire_unregistered() {
        let locks = manager();
        assert!(matches!(
            locks.acquire(Deadline::never(), "ghost", "h").await,
            Err(LockError::NotRegistered(_))
        ));
    }

    #[tokio::test]
    async fn test_acquire_timeout_under_contention() {
        let locks = manager();
        locks.register_lock("orders").unwrap();
        locks
            .acquire(Deadline::never(), "orders", "first")
            .await
            .unwrap();

        let result = locks
            .acquire(
                Deadline::after(Duration::from_millis(20)),
                "orders",
                "second",
            )
            .await;
        assert!(matches!(result, Err(LockError::Timeout { .. })));
        // The queue must be clean afterwards.
        assert_eq!(locks.record("orders").unwrap().waiters, 0);
    }

    #[tokio::test]
    async fn test_handoff_to_waiter() {
        let locks = manager();
        locks.register_lock("orders").unwrap();
        locks
            .acquire(Deadline::never(), "orders", "first")
            .await
            .unwrap();

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                locks
                    .acquire(Deadline::after(Duration::from_secs(5)), "orders", "second")
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        locks.release("orders", "first").unwrap();
        contender.await.unwrap().unwrap();
        assert_eq!(locks.holder("orders").unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_deadline_ordered_handoff() {
        let locks = manager();
        locks.register_lock("orders").unwrap();
        locks
            .acquire(Deadline::never(), "orders", "first")
            .await
            .unwrap();

        // Queue a far-deadline waiter, then a near-deadline waiter; the
        // near-deadline waiter must be served first.
        let far = {
            let locks = locks.clone();
            tokio::spawn(async move {
                locks
                    .acquire(Deadline::after(Duration::from_secs(8)), "orders", "far")
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let near = {
            let locks = locks.clone();
            tokio::spawn(async move {
                locks
                    .acquire(Deadline::after(Duration::from_secs(2)), "orders", "near")
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        locks.release("orders", "first").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(locks.holder("orders").unwrap().as_deref(), Some("near"));
        near.await.unwrap().unwrap();

        locks.release("orders", "near").unwrap();
        far.await.unwrap().unwrap();
        locks.release("orders", "far").unwrap();
    }

    #[tokio::test]
    async fn test_deadlock_detected_synchronously() {
        let locks = manager();
        locks.register_lock("l1").unwrap();
        locks.register_lock("l2").unwrap();
        locks.acquire(Deadline::never(), "l1", "h1").await.unwrap();
        locks.acquire(Deadline::never(), "l2", "h2").await.unwrap();

        // h1 blocks on l2.
        let blocked = {
            let locks = locks.clone();
            tokio::spawn(async move {
                locks
                    .acquire(Deadline::after(Duration::from_secs(5)), "l2", "h1")
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // h2 asking for l1 must fail fast, without blocking.
        let started = tokio::time::Instant::now();
        let result = locks
            .acquire(Deadline::after(Duration::from_secs(5)), "l1", "h2")
            .await;
        assert!(matches!(result, Err(LockError::DeadlockDetected { .. })));
        assert!(started.elapsed() < Duration::from_millis(100));

        // Unwind: h2 releases l2, h1 gets it.
        locks.release("l2", "h2").unwrap();
        blocked.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_try_acquire() {
        let locks = manager();
        locks.register_lock("orders").unwrap();
        assert!(locks.try_acquire("orders", "first").unwrap());
        assert!(!locks.try_acquire("orders", "second").unwrap());
        // Self re-acquire through try_acquire is a detected cycle.
        assert!(matches!(
            locks.try_acquire("orders", "first"),
            Err(LockError::DeadlockDetected { .. })
        ));
        locks.release("orders", "first").unwrap();
        assert!(locks.try_acquire("orders", "second").unwrap());
    }

    #[tokio::test]
    async fn test_cancellation() {
        let locks = manager();
        locks.register_lock("orders").unwrap();
        locks
            .acquire(Deadline::never(), "orders", "first")
            .await
            .unwrap();

        let token = CancellationToken::new();
        let waiting = {
            let locks = locks.clone();
            let token = token.clone();
            tokio::spawn(async move {
                locks
                    .acquire_cancellable(
                        Deadline::after(Duration::from_secs(30)),
                        "orders",
                        "second",
                        &token,
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        let result = waiting.await.unwrap();
        assert!(matches!(result, Err(LockError::Cancelled(_))));
        assert_eq!(locks.record("orders").unwrap().waiters, 0);
    }

    #[tokio::test]
    async fn test_statistics() {
        let locks = manager();
        locks.register_lock("orders").unwrap();
        locks
            .acquire(Deadline::never(), "orders", "engine")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        locks.release("orders", "engine").unwrap();

        let record = locks.record("orders").unwrap();
        assert_eq!(record.stats.acquisitions, 1);
        assert!(record.stats.total_held >= Duration::from_millis(5));
        assert!(record.stats.last_acquired.is_some());
        assert!(record.stats.last_released.is_some());
        assert!(!record.is_held);
    }

    #[tokio::test]
    async fn test_per_lock_timeout_bounds_wait() {
        let locks = manager();
        locks
            .register_lock_with_timeout("orders", Duration::from_millis(30))
            .unwrap();
        locks
            .acquire(Deadline::never(), "orders", "first")
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        let result = locks.acquire(Deadline::never(), "orders", "second").await;
        assert!(matches!(result, Err(LockError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
