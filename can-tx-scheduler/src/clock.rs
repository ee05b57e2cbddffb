//! Time sources for the scheduler
//!
//! The scheduler only needs a monotonic "time since start". Real deployments
//! use [`MonotonicClock`]; tests drive a [`SimulatedClock`] by hand so tick
//! counts can be asserted exactly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source
pub trait Clock: Send {
    /// Time elapsed since the clock's origin
    fn now(&self) -> Duration;
}

/// Wall-clock backed monotonic time
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Manually advanced clock
///
/// Clones share the same time, so a test can keep one copy and hand the other
/// to the scheduler.
#[derive(Debug, Clone, Default)]
pub struct SimulatedClock {
    nanos: Arc<AtomicU64>,
}

impl SimulatedClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `step`
    pub fn advance(&self, step: Duration) {
        self.nanos.fetch_add(step.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Jump to an absolute time; never moves backwards
    pub fn set(&self, now: Duration) {
        self.nanos.fetch_max(now.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}
