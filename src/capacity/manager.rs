//! Connection-scoped capacity state and flusher lifecycle
//!
//! `CapacityManager` owns everything the throttle needs: the per-class
//! capacities and reservation clocks, the written-bytes accumulator, the
//! flusher's condition, and the flusher thread handle. The engine holds one
//! manager per connection and passes it explicitly to every call site.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::clock::{Clock, SystemClock};
use crate::session::SessionFactory;

use super::config::CapacityConfig;
use super::error::CapacityResult;
use super::flusher;
use super::reservation::ReservationClock;
use super::stats::CapacityStats;
use super::{ThrottleClass, FLUSH_WAIT_US};

/// State shared between caller threads and the flusher
pub(crate) struct CapacityShared {
    /// Aggregate budget in bytes/sec, 0 = uncapped
    pub(crate) capacity_total: AtomicU64,
    /// Per-class budgets in bytes/sec, 0 = class uncapped
    pub(crate) capacity: [AtomicU64; ThrottleClass::COUNT],
    /// Per-class reservation clocks
    pub(crate) reservation: [ReservationClock; ThrottleClass::COUNT],
    /// Aggregate reservation clock
    pub(crate) reservation_total: ReservationClock,
    /// Bytes written since the last background flush
    pub(crate) written: AtomicU64,
    /// Written bytes that trigger a background flush, 0 = flusher disabled
    pub(crate) threshold: AtomicU64,
    /// A flush signal is in flight; cleared by the flusher on pickup
    pub(crate) signalled: AtomicBool,
    /// Connection is in crash recovery; throttling suspended
    pub(crate) recovering: AtomicBool,
    /// Flusher run flag
    pub(crate) running: AtomicBool,
    /// Flusher condition-wait interval in microseconds, 0 while stopped
    pub(crate) wait_us: AtomicU64,
    /// Pending-wake flag under the flusher condition
    pub(crate) wake: Mutex<bool>,
    pub(crate) cond: Condvar,
    pub(crate) stats: CapacityStats,
    pub(crate) clock: Arc<dyn Clock>,
}

impl CapacityShared {
    fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            capacity_total: AtomicU64::new(0),
            capacity: Default::default(),
            reservation: Default::default(),
            reservation_total: ReservationClock::new(),
            written: AtomicU64::new(0),
            threshold: AtomicU64::new(0),
            signalled: AtomicBool::new(false),
            recovering: AtomicBool::new(false),
            running: AtomicBool::new(false),
            wait_us: AtomicU64::new(0),
            wake: Mutex::new(false),
            cond: Condvar::new(),
            stats: CapacityStats::new(),
            clock,
        }
    }

    /// Budget for one class in bytes/sec
    #[inline]
    pub(crate) fn capacity(&self, class: ThrottleClass) -> u64 {
        self.capacity[class as usize].load(Ordering::Relaxed)
    }

    /// Reservation clock for one class
    #[inline]
    pub(crate) fn reservation(&self, class: ThrottleClass) -> &ReservationClock {
        &self.reservation[class as usize]
    }
}

/// I/O capacity throttle and background flusher for one connection
pub struct CapacityManager {
    pub(crate) shared: Arc<CapacityShared>,
    sessions: Arc<dyn SessionFactory>,
    flusher: Option<JoinHandle<()>>,
    read_only: bool,
}

impl CapacityManager {
    /// Create an uncapped manager using the system clock
    pub fn new(sessions: Arc<dyn SessionFactory>) -> Self {
        Self::with_clock(sessions, Arc::new(SystemClock::new()))
    }

    /// Create an uncapped manager with an injected clock
    pub fn with_clock(sessions: Arc<dyn SessionFactory>, clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(CapacityShared::new(clock)),
            sessions,
            flusher: None,
            read_only: false,
        }
    }

    /// Capacity counters
    pub fn stats(&self) -> &CapacityStats {
        &self.shared.stats
    }

    /// Bytes written since the last background flush
    pub fn pending_bytes(&self) -> u64 {
        self.shared.written.load(Ordering::Acquire)
    }

    /// Mark the connection read-only; configuration becomes a no-op
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Toggle crash-recovery mode; throttling is suspended while set
    pub fn set_recovering(&self, recovering: bool) {
        self.shared.recovering.store(recovering, Ordering::Release);
    }

    /// Apply a capacity configuration, bouncing the flusher
    ///
    /// Any running flusher is stopped first so configuration never races a
    /// running server and start always sees a blank slate. The flusher is
    /// restarted iff the derived flush threshold is non-zero. On error no
    /// state changes and no flusher is left half-initialised.
    pub fn reconfigure(&mut self, config: &CapacityConfig) -> CapacityResult<()> {
        if self.read_only {
            return Ok(());
        }
        let resolved = config.resolve()?;

        self.destroy();

        let s = &self.shared;
        s.capacity_total.store(resolved.total, Ordering::SeqCst);
        for (slot, cap) in s.capacity.iter().zip(resolved.classes) {
            slot.store(cap, Ordering::SeqCst);
        }
        s.threshold.store(resolved.threshold, Ordering::SeqCst);
        s.stats.threshold.store(resolved.threshold, Ordering::Relaxed);
        tracing::debug!(
            total = resolved.total,
            threshold = resolved.threshold,
            "I/O capacity configured"
        );

        if resolved.threshold != 0 {
            self.start_flusher()?;
        }
        Ok(())
    }

    fn start_flusher(&mut self) -> CapacityResult<()> {
        let session = self.sessions.open_internal_session("capacity-flusher")?;

        let s = &self.shared;
        s.signalled.store(false, Ordering::SeqCst);
        s.wait_us.store(FLUSH_WAIT_US, Ordering::SeqCst);
        s.running.store(true, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("capacity-flusher".into())
            .spawn(move || flusher::run(shared, session));
        match spawned {
            Ok(handle) => {
                self.flusher = Some(handle);
                Ok(())
            }
            Err(err) => {
                s.running.store(false, Ordering::SeqCst);
                s.wait_us.store(0, Ordering::SeqCst);
                Err(err.into())
            }
        }
    }

    /// Stop the flusher and clear the lifecycle state. Idempotent.
    pub fn destroy(&mut self) {
        let s = &self.shared;
        s.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.flusher.take() {
            {
                let mut wake = s.wake.lock();
                *wake = true;
                s.cond.notify_one();
            }
            if handle.join().is_err() {
                tracing::error!("capacity flusher thread panicked");
            }
        }
        s.signalled.store(false, Ordering::SeqCst);
        s.wait_us.store(0, Ordering::SeqCst);
        *s.wake.lock() = false;
    }

    /// Hint the flusher that written bytes may have crossed the threshold
    ///
    /// Wakes the condition only when the threshold is crossed and no signal
    /// is already in flight, so back-to-back callers coalesce to one wake.
    pub fn signal(&self) {
        let s = &self.shared;
        s.stats.signal_calls.fetch_add(1, Ordering::Relaxed);

        let threshold = s.threshold.load(Ordering::Acquire);
        if threshold == 0 || !s.running.load(Ordering::Acquire) {
            return;
        }
        if s.written.load(Ordering::Acquire) >= threshold
            && s.signalled
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            {
                let mut wake = s.wake.lock();
                *wake = true;
                s.cond.notify_one();
            }
            s.stats.signals.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Whether the flusher thread is running
    pub fn flusher_running(&self) -> bool {
        self.flusher.is_some() && self.shared.running.load(Ordering::Acquire)
    }
}

impl Drop for CapacityManager {
    fn drop(&mut self) {
        self.destroy();
    }
}
