//! Component lifecycle management with state transitions.
//!
//! Provides the component state machine and lifecycle tracking used by the
//! coordinator registry.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use serde::Serialize;

// Layer 3: Internal module imports
// (none)

/// Component state in the lifecycle state machine.
///
/// # State Transitions
///
/// ```text
/// Registered -> Initializing -> Ready -> ShuttingDown -> Registered
///                   |                         |
///                   v                         v
///                 Failed  <-------------------+
///                   |
///                   v
///               Registered (explicit reset)
/// ```
///
/// A component never transitions `Ready -> Initializing` directly; it must
/// pass through `ShuttingDown` first. A timed-out build rolls back
/// `Initializing -> Registered` so the next acquisition attempts a fresh
/// build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComponentState {
    /// Registered but not initialized; acquirable.
    Registered,

    /// A build is in flight.
    Initializing,

    /// Initialized; the registry holds a live instance.
    Ready,

    /// Teardown in progress.
    ShuttingDown,

    /// Build or teardown failed; surfaced on every acquisition until an
    /// explicit shutdown resets the component.
    Failed,
}

impl ComponentState {
    /// Whether the state machine permits `self -> next`.
    pub fn can_transition_to(self, next: ComponentState) -> bool {
        use ComponentState::*;
        matches!(
            (self, next),
            (Registered, Initializing)
                | (Initializing, Ready)
                | (Initializing, Failed)
                | (Initializing, Registered)
                | (Ready, ShuttingDown)
                | (ShuttingDown, Registered)
                | (ShuttingDown, Failed)
                | (Failed, Registered)
        )
    }

    /// Whether the component holds a live instance.
    pub fn is_ready(self) -> bool {
        self == ComponentState::Ready
    }

    /// Whether the component is in the sticky failure state.
    pub fn is_failed(self) -> bool {
        self == ComponentState::Failed
    }
}

impl Default for ComponentState {
    fn default() -> Self {
        Self::Registered
    }
}

impl std::fmt::Display for ComponentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ComponentState::Registered => "registered",
            ComponentState::Initializing => "initializing",
            ComponentState::Ready => "ready",
            ComponentState::ShuttingDown => "shutting-down",
            ComponentState::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// Component lifecycle tracker with state management.
///
/// Tracks the current state, the wall-clock timestamp of the last
/// transition, and the build epoch (how many times the component entered
/// `Initializing`). A fresh epoch starts after every shutdown, so instances
/// are never reused across epochs.
#[derive(Debug, Clone)]
pub struct ComponentLifecycle {
    state: ComponentState,
    last_state_change: DateTime<Utc>,
    build_epochs: u32,
}

impl ComponentLifecycle {
    /// Create a new lifecycle tracker in `Registered` state.
    pub fn new() -> Self {
        Self {
            state: ComponentState::Registered,
            last_state_change: Utc::now(),
            build_epochs: 0,
        }
    }

    /// Transition to a new state, recording the transition timestamp.
    ///
    /// Entering `Initializing` starts a new build epoch. Invalid transitions
    /// indicate a coordinator bug; they are asserted in debug builds and
    /// applied verbatim in release builds so the registry never wedges.
    pub fn transition_to(&mut self, next: ComponentState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid component transition {} -> {}",
            self.state,
            next
        );
        if next == ComponentState::Initializing {
            self.build_epochs += 1;
        }
        self.state = next;
        self.last_state_change = Utc::now();
    }

    /// Current component state.
    pub fn state(&self) -> ComponentState {
        self.state
    }

    /// Wall-clock timestamp of the last state change.
    pub fn last_state_change(&self) -> DateTime<Utc> {
        self.last_state_change
    }

    /// Number of build epochs started so far.
    pub fn build_epochs(&self) -> u32 {
        self.build_epochs
    }
}

impl Default for ComponentLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
