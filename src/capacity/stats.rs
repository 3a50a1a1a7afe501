//! Capacity statistics counters
//!
//! Monotonic counters and gauges for the throttle and flusher, readable as
//! a plain snapshot for export.

use std::sync::atomic::{AtomicU64, Ordering};

use super::ThrottleClass;

/// Atomic counters for the capacity subsystem
#[derive(Debug, Default)]
pub struct CapacityStats {
    /// Configured flush threshold in bytes (gauge)
    pub threshold: AtomicU64,
    /// Flusher wakeups caused by the wait interval elapsing
    pub timeout_wakes: AtomicU64,
    /// Flusher wakeups caused by a signal
    pub signal_wakes: AtomicU64,
    /// Calls to `signal`, woken or not
    pub signal_calls: AtomicU64,
    /// Signals that actually woke the condition
    pub signals: AtomicU64,
    /// Bytes passed to non-read throttle calls
    pub bytes_written: AtomicU64,
    /// Bytes passed to read throttle calls
    pub bytes_read: AtomicU64,
    /// Flusher cycles that found too few bytes to flush
    pub fsync_notyet: AtomicU64,
    /// Throttle calls that waited on the aggregate clock
    pub total_throttles: AtomicU64,
    /// Microseconds of wait charged to the aggregate clock
    pub total_time_us: AtomicU64,

    /// Throttle calls per class
    calls: [AtomicU64; ThrottleClass::COUNT],
    /// Throttle calls per class that computed a future wait target
    throttles: [AtomicU64; ThrottleClass::COUNT],
    /// Microseconds of wait charged per class
    time_us: [AtomicU64; ThrottleClass::COUNT],
}

impl CapacityStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a throttle call on entry
    pub fn record_call(&self, class: ThrottleClass, bytes: u64) {
        self.calls[class as usize].fetch_add(1, Ordering::Relaxed);
        if class.is_write() {
            self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
        } else {
            self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
        }
    }

    /// Record a future wait target charged to a class clock
    pub fn record_throttle(&self, class: ThrottleClass, wait_us: u64) {
        self.throttles[class as usize].fetch_add(1, Ordering::Relaxed);
        self.time_us[class as usize].fetch_add(wait_us, Ordering::Relaxed);
    }

    /// Record a future wait target charged to the aggregate clock
    pub fn record_total_throttle(&self, wait_us: u64) {
        self.total_throttles.fetch_add(1, Ordering::Relaxed);
        self.total_time_us.fetch_add(wait_us, Ordering::Relaxed);
    }

    /// Calls recorded for a class
    pub fn calls(&self, class: ThrottleClass) -> u64 {
        self.calls[class as usize].load(Ordering::Relaxed)
    }

    /// Throttled calls recorded for a class
    pub fn throttles(&self, class: ThrottleClass) -> u64 {
        self.throttles[class as usize].load(Ordering::Relaxed)
    }

    /// Wait microseconds recorded for a class
    pub fn time_us(&self, class: ThrottleClass) -> u64 {
        self.time_us[class as usize].load(Ordering::Relaxed)
    }

    /// Take a point-in-time snapshot of every counter
    pub fn snapshot(&self) -> CapacityStatsSnapshot {
        let load = |a: &AtomicU64| a.load(Ordering::Relaxed);
        CapacityStatsSnapshot {
            threshold: load(&self.threshold),
            timeout_wakes: load(&self.timeout_wakes),
            signal_wakes: load(&self.signal_wakes),
            signal_calls: load(&self.signal_calls),
            signals: load(&self.signals),
            bytes_written: load(&self.bytes_written),
            bytes_read: load(&self.bytes_read),
            fsync_notyet: load(&self.fsync_notyet),
            total_throttles: load(&self.total_throttles),
            total_time_us: load(&self.total_time_us),
            calls: [
                load(&self.calls[0]),
                load(&self.calls[1]),
                load(&self.calls[2]),
                load(&self.calls[3]),
            ],
            throttles: [
                load(&self.throttles[0]),
                load(&self.throttles[1]),
                load(&self.throttles[2]),
                load(&self.throttles[3]),
            ],
            time_us: [
                load(&self.time_us[0]),
                load(&self.time_us[1]),
                load(&self.time_us[2]),
                load(&self.time_us[3]),
            ],
        }
    }
}

/// Point-in-time copy of the capacity counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityStatsSnapshot {
    pub threshold: u64,
    pub timeout_wakes: u64,
    pub signal_wakes: u64,
    pub signal_calls: u64,
    pub signals: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub fsync_notyet: u64,
    pub total_throttles: u64,
    pub total_time_us: u64,
    /// Indexed by `ThrottleClass as usize`
    pub calls: [u64; ThrottleClass::COUNT],
    pub throttles: [u64; ThrottleClass::COUNT],
    pub time_us: [u64; ThrottleClass::COUNT],
}
