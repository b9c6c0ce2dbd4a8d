//! Absolute monotonic deadlines for cooperative cancellation.
//!
//! Every blocking operation in the runtime carries an explicit [`Deadline`];
//! there is no implicit global timeout.

// Layer 1: Standard library imports
use std::fmt;
use std::time::Duration;

// Layer 2: Third-party crate imports
use tokio::time::Instant;

// Layer 3: Internal module imports
// (none)

/// Upper bound used by [`Deadline::never`] so arithmetic cannot overflow.
const NEVER_HORIZON: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// An absolute point in monotonic time by which an operation must complete.
///
/// Deadlines compose through [`Deadline::earliest`] and shrink through
/// [`Deadline::budget_slice`]; they never extend. Built on the tokio clock so
/// `tokio::time::pause` works in tests.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use meridian_coord::Deadline;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let deadline = Deadline::after(Duration::from_secs(5));
/// assert!(!deadline.is_elapsed());
/// assert!(deadline.remaining() <= Duration::from_secs(5));
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    /// Deadline at an absolute instant.
    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    /// Deadline `duration` from now.
    pub fn after(duration: Duration) -> Self {
        Self(Instant::now() + duration)
    }

    /// A deadline far enough in the future to never fire in practice.
    pub fn never() -> Self {
        Self(Instant::now() + NEVER_HORIZON)
    }

    /// The underlying monotonic instant.
    pub fn instant(&self) -> Instant {
        self.0
    }

    /// Time left before the deadline, zero if already elapsed.
    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed.
    pub fn is_elapsed(&self) -> bool {
        self.0 <= Instant::now()
    }

    /// The earlier of two deadlines.
    pub fn earliest(self, other: Deadline) -> Deadline {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    /// A deadline covering `1/divisor` of the remaining budget.
    ///
    /// Used to split a caller deadline across pending work items so that no
    /// single item consumes the whole budget. A zero divisor yields the
    /// deadline itself.
    pub fn budget_slice(&self, divisor: u32) -> Deadline {
        if divisor <= 1 {
            return *self;
        }
        let slice = self.remaining() / divisor;
        Deadline(Instant::now() + slice)
    }
}

impl fmt::Display for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_elapsed() {
            write!(f, "elapsed")
        } else {
            write!(f, "in {:?}", self.remaining())
        }
    }
}
