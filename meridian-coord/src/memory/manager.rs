//! Byte-budget accounting and idle-component eviction.
//!
//! The accountant tracks per-component memory estimates against a global
//! limit, classifies pressure, and selects eviction candidates. Eviction
//! *execution* goes through an [`EvictionSink`] implemented by the
//! coordinator, so provider teardown never runs under the accountant's
//! mutex.

// Layer 1: Standard library imports
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

// Layer 3: Internal module imports
use super::error::MemoryError;
use super::pressure::{MemoryPressure, MemorySnapshot, PressureThresholds};

/// Executes the eviction of a single component.
///
/// Implemented by the coordinator: it re-checks that the component is
/// `Ready` with no live leases, runs the provider's teardown and releases
/// the reservation. Returns `true` only when memory was actually freed.
#[async_trait]
pub trait EvictionSink: Send + Sync {
    async fn evict(&self, name: &str) -> bool;
}

#[derive(Debug)]
struct Account {
    kind: String,
    estimate: u64,
    reserved: u64,
    priority: u32,
    refcount: u32,
    last_access: Instant,
}

#[derive(Debug, Default)]
struct Accounts {
    entries: HashMap<String, Account>,
    total_usage: u64,
}

struct MemoryInner {
    total_limit: u64,
    component_cap: Option<u64>,
    min_idle_time: Duration,
    thresholds: PressureThresholds,
    accounts: Mutex<Accounts>,
    sink: RwLock<Option<Weak<dyn EvictionSink>>>,
}

/// Tracks the platform memory budget and evicts idle components under
/// pressure.
///
/// All operations are O(1) except eviction, which sorts candidates by
/// `(priority desc, last_access asc, name asc)` for deterministic order.
/// Byte arithmetic is unsigned and saturates at zero on underflow; an
/// underflow is a bug but must never corrupt the accountant.
///
/// Cheap to clone; clones share the same accounts.
#[derive(Clone)]
pub struct MemoryManager {
    inner: Arc<MemoryInner>,
}

impl MemoryManager {
    /// Create an accountant for a budget of `total_limit` bytes.
    ///
    /// `component_cap` rejects unreasonable estimates at registration;
    /// `min_idle_time` is how long a component must sit idle before it
    /// becomes an eviction candidate.
    pub fn new(
        total_limit: u64,
        component_cap: Option<u64>,
        thresholds: PressureThresholds,
        min_idle_time: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                total_limit,
                component_cap,
                min_idle_time,
                thresholds,
                accounts: Mutex::new(Accounts::default()),
                sink: RwLock::new(None),
            }),
        }
    }

    /// Bind the eviction executor. Held weakly so the accountant never keeps
    /// the coordinator alive.
    pub fn bind_sink(&self, sink: Weak<dyn EvictionSink>) {
        *self.inner.sink.write() = Some(sink);
    }

    /// Register a component for accounting.
    ///
    /// # Errors
    ///
    /// `EstimateExceedsCap` if the estimate is above the per-component cap;
    /// `AlreadyRegistered` for duplicate names.
    pub fn register(
        &self,
        name: impl Into<String>,
        kind: impl Into<String>,
        estimate: u64,
        priority: u32,
    ) -> Result<(), MemoryError> {
        let name = name.into();
        if let Some(cap) = self.inner.component_cap {
            if estimate > cap {
                return Err(MemoryError::EstimateExceedsCap {
                    name,
                    estimate,
                    cap,
                });
            }
        }
        let mut accounts = self.inner.accounts.lock();
        if accounts.entries.contains_key(&name) {
            return Err(MemoryError::AlreadyRegistered(name));
        }
        accounts.entries.insert(
            name,
            Account {
                kind: kind.into(),
                estimate,
                reserved: 0,
                priority,
                refcount: 0,
                last_access: Instant::now(),
            },
        );
        Ok(())
    }

    /// Remove a component from accounting, releasing any live reservation.
    ///
    /// # Errors
    ///
    /// `NotRegistered` if the name is unknown.
    pub fn unregister(&self, name: &str) -> Result<(), MemoryError> {
        let mut accounts = self.inner.accounts.lock();
        match accounts.entries.remove(name) {
            Some(account) => {
                accounts.total_usage = accounts.total_usage.saturating_sub(account.reserved);
                Ok(())
            }
            None => Err(MemoryError::NotRegistered(name.to_string())),
        }
    }

    /// Try to reserve `estimate` bytes for `name`.
    ///
    /// Returns `true` and charges the budget iff the reservation fits.
    /// Re-reserving while a reservation is live is a no-op returning `true`.
    ///
    /// # Errors
    ///
    /// `NotRegistered` if the name is unknown.
    pub fn reserve(&self, name: &str, estimate: u64) -> Result<bool, MemoryError> {
        let mut accounts = self.inner.accounts.lock();
        let total_usage = accounts.total_usage;
        let account = accounts
            .entries
            .get_mut(name)
            .ok_or_else(|| MemoryError::NotRegistered(name.to_string()))?;
        if account.reserved > 0 {
            return Ok(true);
        }
        let projected = total_usage.saturating_add(estimate);
        if projected > self.inner.total_limit {
            return Ok(false);
        }
        account.reserved = estimate;
        accounts.total_usage = projected;
        Ok(true)
    }

    /// Return a previous reservation to the budget.
    ///
    /// Tolerant of unknown names and double release so rollback paths can
    /// call it unconditionally.
    pub fn release(&self, name: &str) {
        let mut accounts = self.inner.accounts.lock();
        if let Some(account) = accounts.entries.get_mut(name) {
            let reserved = std::mem::take(&mut account.reserved);
            accounts.total_usage = accounts.total_usage.saturating_sub(reserved);
        }
    }

    /// Record a new live lease on the component.
    pub fn mark_in_use(&self, name: &str) {
        let mut accounts = self.inner.accounts.lock();
        if let Some(account) = accounts.entries.get_mut(name) {
            account.refcount = account.refcount.saturating_add(1);
            account.last_access = Instant::now();
        }
    }

    /// Record a dropped lease on the component.
    pub fn mark_idle(&self, name: &str) {
        let mut accounts = self.inner.accounts.lock();
        if let Some(account) = accounts.entries.get_mut(name) {
            if account.refcount == 0 {
                warn!(component = name, "mark_idle on component with zero refcount");
            }
            account.refcount = account.refcount.saturating_sub(1);
            account.last_access = Instant::now();
        }
    }

    /// Whether any lease on the component is live.
    pub fn is_in_use(&self, name: &str) -> bool {
        self.refcount(name) > 0
    }

    /// Current lease count for the component.
    pub fn refcount(&self, name: &str) -> u32 {
        self.inner
            .accounts
            .lock()
            .entries
            .get(name)
            .map(|account| account.refcount)
            .unwrap_or(0)
    }

    /// How long the component has been idle, if registered.
    pub fn idle_for(&self, name: &str) -> Option<Duration> {
        self.inner
            .accounts
            .lock()
            .entries
            .get(name)
            .map(|account| account.last_access.elapsed())
    }

    /// Total bytes currently reserved.
    pub fn usage(&self) -> u64 {
        self.inner.accounts.lock().total_usage
    }

    /// The configured budget in bytes.
    pub fn limit(&self) -> u64 {
        self.inner.total_limit
    }

    /// Current pressure classification.
    pub fn pressure_level(&self) -> MemoryPressure {
        self.inner
            .thresholds
            .classify(self.usage(), self.inner.total_limit)
    }

    /// Whether usage is past the forced-eviction watermark.
    pub fn needs_forced_eviction(&self) -> bool {
        self.inner
            .thresholds
            .forces_eviction(self.usage(), self.inner.total_limit)
    }

    /// Point-in-time budget view.
    pub fn snapshot(&self) -> MemorySnapshot {
        let usage = self.usage();
        MemorySnapshot {
            total_limit: self.inner.total_limit,
            total_usage: usage,
            pressure: self.inner.thresholds.classify(usage, self.inner.total_limit),
        }
    }

    /// Evict idle components until `bytes_needed` are freed or candidates
    /// run out; returns the bytes actually freed.
    ///
    /// With `bytes_needed == 0` this is the opportunistic trim used by the
    /// background monitor: it keeps evicting while pressure stays at
    /// `Medium` or above.
    ///
    /// Candidates have no live lease and have been idle at least
    /// `min_idle_time`; ordering is deterministic: highest priority number
    /// first, then oldest access, then lexicographic name.
    pub async fn evict_idle_until(&self, bytes_needed: u64) -> u64 {
        let sink = match self.upgrade_sink() {
            Some(sink) => sink,
            None => return 0,
        };

        let mut freed: u64 = 0;
        let mut attempted: HashSet<String> = HashSet::new();

        loop {
            if bytes_needed > 0 {
                if freed >= bytes_needed {
                    break;
                }
            } else if self.pressure_level() < MemoryPressure::Medium {
                break;
            }

            let candidate = self.next_candidate(&attempted);
            let (name, kind, estimate) = match candidate {
                Some(found) => found,
                None => break,
            };
            attempted.insert(name.clone());

            debug!(component = %name, estimate, "attempting eviction");
            if sink.evict(&name).await {
                freed = freed.saturating_add(estimate);
                info!(component = %name, %kind, freed_bytes = estimate, "evicted idle component");
            }
        }

        freed
    }

    fn upgrade_sink(&self) -> Option<Arc<dyn EvictionSink>> {
        self.inner.sink.read().as_ref().and_then(Weak::upgrade)
    }

    /// Best eviction candidate not yet attempted, under the deterministic
    /// ordering. Runs entirely under the accounts mutex.
    fn next_candidate(&self, attempted: &HashSet<String>) -> Option<(String, String, u64)> {
        let accounts = self.inner.accounts.lock();
        let now = Instant::now();
        let mut candidates: Vec<(&String, &Account)> = accounts
            .entries
            .iter()
            .filter(|(name, account)| {
                account.reserved > 0
                    && account.refcount == 0
                    && now.saturating_duration_since(account.last_access)
                        >= self.inner.min_idle_time
                    && !attempted.contains(*name)
            })
            .collect();
        candidates.sort_by(|(name_a, a), (name_b, b)| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.last_access.cmp(&b.last_access))
                .then_with(|| name_a.cmp(name_b))
        });
        candidates
            .first()
            .map(|(name, account)| ((*name).clone(), account.kind.clone(), account.estimate))
    }
}

impl std::fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("MemoryManager")
            .field("total_limit", &snapshot.total_limit)
            .field("total_usage", &snapshot.total_usage)
            .field("pressure", &snapshot.pressure)
            .finish()
    }
}
