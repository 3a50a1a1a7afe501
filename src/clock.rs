//! Time source abstraction for the throttle hot path
//!
//! The throttle computes reservation targets in wall-clock nanoseconds and
//! suspends callers with microsecond sleeps. Both are behind one trait so
//! tests can substitute a deterministic double that records sleeps instead
//! of taking them.

use std::time::{Duration, Instant};

/// Monotonic clock and sleep provider
pub trait Clock: Send + Sync {
    /// Current time in nanoseconds since an arbitrary fixed epoch
    fn now_ns(&self) -> u64;

    /// Suspend the calling thread for `us` microseconds
    fn sleep_us(&self, us: u64);
}

/// Clock backed by `Instant`, anchored at construction
///
/// Anchoring keeps the nanosecond values small enough that a u64 holds
/// centuries of uptime, and guarantees monotonicity.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock anchored at the current instant
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    fn sleep_us(&self, us: u64) {
        std::thread::sleep(Duration::from_micros(us));
    }
}
