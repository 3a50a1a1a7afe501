//! Background capacity flusher
//!
//! A dedicated thread that wakes on signal or every wait interval and
//! issues an asynchronous fsync of all dirty files once the bytes written
//! since the last flush exceed the configured threshold.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::session::FlushSession;

use super::manager::CapacityShared;

/// What ended a condition wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WakeCause {
    Signal,
    Timeout,
}

/// Flusher thread body. Runs until the run flag clears; the session drops
/// with the thread.
pub(crate) fn run(shared: Arc<CapacityShared>, mut session: Box<dyn FlushSession>) {
    tracing::debug!("capacity flusher started");

    loop {
        match wait(&shared) {
            WakeCause::Signal => shared.stats.signal_wakes.fetch_add(1, Ordering::Relaxed),
            WakeCause::Timeout => shared.stats.timeout_wakes.fetch_add(1, Ordering::Relaxed),
        };

        // Quitting or being reconfigured
        if !shared.running.load(Ordering::Acquire) {
            break;
        }

        // Take ownership of any in-flight signal before reading the byte
        // count, so a signal raised during the flush wakes the next cycle.
        shared.signalled.store(false, Ordering::Release);

        let written = shared.written.load(Ordering::Acquire);
        if written > shared.threshold.load(Ordering::Acquire) {
            if let Err(err) = session.fsync_all_background() {
                tracing::error!(error = %err, "capacity flusher fatal error");
                panic!("capacity flusher: background fsync failed: {err}");
            }
            shared.written.store(0, Ordering::Release);
        } else {
            shared.stats.fsync_notyet.fetch_add(1, Ordering::Relaxed);
        }
    }

    tracing::debug!("capacity flusher shutting down");
}

/// Wait for a signal or the wait interval, whichever comes first
fn wait(shared: &CapacityShared) -> WakeCause {
    let timeout = Duration::from_micros(shared.wait_us.load(Ordering::Acquire).max(1));

    let mut pending = shared.wake.lock();
    if !shared.running.load(Ordering::Acquire) {
        return WakeCause::Signal;
    }
    if *pending {
        *pending = false;
        return WakeCause::Signal;
    }
    let timed_out = shared.cond.wait_for(&mut pending, timeout).timed_out();
    if *pending {
        *pending = false;
        WakeCause::Signal
    } else if timed_out {
        WakeCause::Timeout
    } else {
        // Spurious wake; treat as a signal so the threshold is re-checked
        WakeCause::Signal
    }
}
