//! Integration tests for memory-pressure eviction:
//! eviction under pressure, priority tie-breaks, protection of in-use
//! components and the background trim.

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use meridian_coord::prelude::*;
use meridian_coord::adapters::{ProviderSpec, SubsystemProvider};
use meridian_coord::CoordinatorConfig;

const MB: u64 = 1024 * 1024;

struct CountingProvider {
    estimate: u64,
    priority: u32,
    teardowns: Arc<AtomicUsize>,
    teardown_log: Arc<Mutex<Vec<String>>>,
    label: String,
}

impl CountingProvider {
    fn new(label: &str, estimate: u64, priority: u32, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            estimate,
            priority,
            teardowns: Arc::new(AtomicUsize::new(0)),
            teardown_log: Arc::clone(log),
            label: label.to_string(),
        })
    }
}

#[async_trait]
impl LazyProvider for CountingProvider {
    async fn build(&self, _ctx: &BuildContext) -> anyhow::Result<SharedInstance> {
        Ok(Arc::new(self.label.clone()))
    }

    async fn teardown(&self, _instance: SharedInstance) -> anyhow::Result<()> {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        self.teardown_log.lock().push(self.label.clone());
        Ok(())
    }

    fn memory_estimate(&self) -> u64 {
        self.estimate
    }

    fn priority(&self) -> u32 {
        self.priority
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn coordinator(limit: u64) -> Coordinator {
    init_tracing();
    let config = CoordinatorConfig::builder(limit)
        .with_min_idle_time(Duration::ZERO)
        .with_auto_unload(false)
        .build()
        .unwrap();
    Coordinator::new(config)
}

fn far() -> Deadline {
    Deadline::after(Duration::from_secs(30))
}

/// Initialize a component and immediately release the lease, with a short
/// pause so last-access ordering between components is unambiguous.
async fn warm(coordinator: &Coordinator, name: &str) {
    let lease = coordinator.get_component(far(), name).await.unwrap();
    drop(lease);
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// ============================================================================
// Eviction under pressure
// ============================================================================

#[tokio::test]
async fn test_oldest_idle_component_evicted_under_pressure() {
    let coordinator = coordinator(100 * MB);
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut providers = Vec::new();
    for name in ["c1", "c2", "c3", "c4", "c5"] {
        let provider = CountingProvider::new(name, 20 * MB, 90, &log);
        providers.push(Arc::clone(&provider));
        coordinator
            .register(name, "cache", provider, vec![])
            .unwrap();
    }
    for name in ["c1", "c2", "c3", "c4", "c5"] {
        warm(&coordinator, name).await;
    }
    assert_eq!(coordinator.memory().usage(), 100 * MB);
    assert_eq!(coordinator.memory().pressure_level(), MemoryPressure::Critical);

    let provider_c6 = CountingProvider::new("c6", 20 * MB, 90, &log);
    coordinator
        .register("c6", "cache", provider_c6, vec![])
        .unwrap();
    coordinator.get_component(far(), "c6").await.unwrap();

    // c1 was the least recently used; exactly one eviction covers the need.
    assert_eq!(*log.lock(), vec!["c1".to_string()]);
    assert_eq!(providers[0].teardowns.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.memory().usage(), 100 * MB);
    assert_eq!(
        coordinator.component_info("c1").unwrap().state,
        ComponentState::Registered
    );
    for name in ["c2", "c3", "c4", "c5", "c6"] {
        assert_eq!(
            coordinator.component_info(name).unwrap().state,
            ComponentState::Ready,
            "{name} should have survived"
        );
    }
}

// ============================================================================
// Priority and age tie-breaks
// ============================================================================

#[tokio::test]
async fn test_eviction_priority_and_age_tie_break() {
    let coordinator = coordinator(100 * MB);
    let log = Arc::new(Mutex::new(Vec::new()));

    // c3 is precious (priority 10) and oldest; c1/c2 share priority 90.
    coordinator
        .register("c3", "engine", CountingProvider::new("c3", 30 * MB, 10, &log), vec![])
        .unwrap();
    coordinator
        .register("c1", "cache", CountingProvider::new("c1", 30 * MB, 90, &log), vec![])
        .unwrap();
    coordinator
        .register("c2", "cache", CountingProvider::new("c2", 30 * MB, 90, &log), vec![])
        .unwrap();

    // Access order: c3 (oldest), then c1, then c2 (freshest).
    warm(&coordinator, "c3").await;
    warm(&coordinator, "c1").await;
    warm(&coordinator, "c2").await;
    assert_eq!(coordinator.memory().usage(), 90 * MB);

    // The newcomer needs 40MB: c1 goes first (highest priority number,
    // older than c2), then c2. c3 is never evicted ahead of them.
    coordinator
        .register("c4", "engine", CountingProvider::new("c4", 40 * MB, 50, &log), vec![])
        .unwrap();
    coordinator.get_component(far(), "c4").await.unwrap();

    assert_eq!(*log.lock(), vec!["c1".to_string(), "c2".to_string()]);
    assert_eq!(
        coordinator.component_info("c3").unwrap().state,
        ComponentState::Ready
    );
    assert_eq!(
        coordinator.component_info("c4").unwrap().state,
        ComponentState::Ready
    );
}

// ============================================================================
// No eviction of live components
// ============================================================================

#[tokio::test]
async fn test_in_use_component_never_evicted() {
    let coordinator = coordinator(100 * MB);
    let log = Arc::new(Mutex::new(Vec::new()));

    coordinator
        .register("held", "engine", CountingProvider::new("held", 50 * MB, 90, &log), vec![])
        .unwrap();
    coordinator
        .register("idle", "cache", CountingProvider::new("idle", 50 * MB, 10, &log), vec![])
        .unwrap();

    // Keep a live lease on "held" for the whole test.
    let held_lease = coordinator.get_component(far(), "held").await.unwrap();
    warm(&coordinator, "idle").await;
    assert_eq!(coordinator.memory().usage(), 100 * MB);

    coordinator
        .register("new", "engine", CountingProvider::new("new", 50 * MB, 50, &log), vec![])
        .unwrap();
    coordinator.get_component(far(), "new").await.unwrap();

    // Only the idle component was sacrificed, despite its lower (more
    // precious) priority being the only alternative.
    assert_eq!(*log.lock(), vec!["idle".to_string()]);
    assert_eq!(
        coordinator.component_info("held").unwrap().state,
        ComponentState::Ready
    );
    assert!(coordinator.component_info("held").unwrap().in_use);
    drop(held_lease);
}

#[tokio::test]
async fn test_min_idle_time_protects_fresh_components() {
    let config = CoordinatorConfig::builder(100 * MB)
        .with_min_idle_time(Duration::from_secs(3600))
        .with_auto_unload(false)
        .build()
        .unwrap();
    let coordinator = Coordinator::new(config);
    let log = Arc::new(Mutex::new(Vec::new()));

    coordinator
        .register("fresh", "cache", CountingProvider::new("fresh", 60 * MB, 90, &log), vec![])
        .unwrap();
    warm(&coordinator, "fresh").await;

    coordinator
        .register("new", "engine", CountingProvider::new("new", 60 * MB, 50, &log), vec![])
        .unwrap();
    let result = coordinator.get_component(far(), "new").await;
    assert!(matches!(
        result,
        Err(CoordinatorError::Memory(MemoryError::InsufficientMemory { .. }))
    ));
    assert!(log.lock().is_empty());
}

// ============================================================================
// Budget safety under churn
// ============================================================================

#[tokio::test]
async fn test_usage_never_exceeds_limit() {
    let coordinator = coordinator(100 * MB);
    let log = Arc::new(Mutex::new(Vec::new()));

    for (index, name) in ["a", "b", "c", "d", "e", "f", "g"].iter().enumerate() {
        let estimate = ((index as u64 % 3) + 1) * 15 * MB;
        coordinator
            .register(*name, "cache", CountingProvider::new(name, estimate, 90, &log), vec![])
            .unwrap();
    }
    for name in ["a", "b", "c", "d", "e", "f", "g"] {
        let result = coordinator.get_component(far(), name).await;
        assert!(result.is_ok(), "acquiring {name} failed: {result:?}");
        assert!(
            coordinator.memory().usage() <= 100 * MB,
            "budget exceeded after {name}"
        );
    }
}

// ============================================================================
// Background monitor trim
// ============================================================================

#[tokio::test]
async fn test_background_monitor_trims_idle_components() {
    let config = CoordinatorConfig::builder(100 * MB)
        .with_min_idle_time(Duration::ZERO)
        .with_auto_unload(true)
        .with_check_interval(Duration::from_millis(50))
        .build()
        .unwrap();
    let coordinator = Coordinator::new(config);
    let log = Arc::new(Mutex::new(Vec::new()));

    // 80% usage puts pressure at High; the monitor should trim back below
    // Medium (60%). Warm everything before the first monitor check fires.
    for name in ["a", "b", "c", "d"] {
        coordinator
            .register(name, "cache", CountingProvider::new(name, 20 * MB, 90, &log), vec![])
            .unwrap();
        drop(coordinator.get_component(far(), name).await.unwrap());
    }
    assert!(coordinator.memory().pressure_level() >= MemoryPressure::High);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(coordinator.memory().pressure_level() < MemoryPressure::Medium);
    assert!(!log.lock().is_empty());
}

// ============================================================================
// Adapter integration
// ============================================================================

#[tokio::test]
async fn test_subsystem_adapter_full_lifecycle() {
    struct RiskEngine {
        max_exposure: u64,
    }

    let coordinator = coordinator(100 * MB);
    let teardowns = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&teardowns);

    let provider = SubsystemProvider::new(
        ProviderSpec::new(10 * MB).with_priority(20),
        || Ok(RiskEngine { max_exposure: 1_000_000 }),
    )
    .with_teardown(move |_engine| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    coordinator
        .register("risk-engine", "risk", Arc::new(provider), vec![])
        .unwrap();

    let lease = coordinator.get_component(far(), "risk-engine").await.unwrap();
    let engine: Arc<RiskEngine> = lease.downcast().unwrap();
    assert_eq!(engine.max_exposure, 1_000_000);
    drop(lease);

    coordinator.shutdown_component(far(), "risk-engine").await.unwrap();
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
}
