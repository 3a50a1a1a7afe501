//! Hot-path throttle operation
//!
//! Every engine write path calls `throttle` before or after its I/O. The
//! call reserves a time slot on the class's reservation clock (and on the
//! aggregate clock), optionally steals a bounded slice of an idle sibling's
//! budget, then sleeps until the reserved slot arrives. Coordination is
//! fetch-add on the clocks plus a single compare-and-swap for the steal;
//! there is no mutual exclusion.

use std::sync::atomic::Ordering;

use super::manager::CapacityManager;
use super::reservation::slot_ns;
use super::{
    ThrottleClass, MAX_THROTTLE_BYTES, NANOS_PER_SEC, STEAL_IDLE_NS, STEAL_SLICE_DIVISOR,
    THROTTLE_SLEEP_CUTOFF_US,
};

/// Result of one steal attempt
enum StealOutcome {
    /// Victim clock advanced; holds the caller's rewound reservation tail
    Stolen(u64),
    /// Another thread advanced the victim clock first
    Contested,
    /// No peer was idle enough, or the chosen peer is uncapped
    NoVictim,
}

impl CapacityManager {
    /// Reserve a time slot to perform `bytes` of I/O for `class`, and wait
    /// until that slot arrives.
    ///
    /// The slot length is proportional to `bytes`, sized so reservations
    /// for exactly the configured capacity fit in one second. Returns
    /// without waiting when the class and the aggregate are both uncapped,
    /// or while the connection is recovering.
    pub fn throttle(&self, class: ThrottleClass, bytes: u64) {
        // Larger sizes would overflow the slot computation
        debug_assert!(bytes < MAX_THROTTLE_BYTES);

        let s = &self.shared;
        s.stats.record_call(class, bytes);

        let capacity = s.capacity(class);
        let capacity_total = s.capacity_total.load(Ordering::Relaxed);
        if (capacity == 0 && capacity_total == 0) || s.recovering.load(Ordering::Acquire) {
            return;
        }

        if class.is_write() {
            s.written.fetch_add(bytes, Ordering::Release);
            self.signal();
        }

        let now_ns = s.clock.now_ns();
        let mut steal_attempted = false;
        let (mut res_value, res_total) = loop {
            let res_value = s.reservation(class).reserve(bytes, capacity, now_ns);
            let res_total = s.reservation_total.reserve(bytes, capacity_total, now_ns);

            // If our own class is backed up while the aggregate has room,
            // try once to buy budget back from an idle sibling.
            if !steal_attempted
                && capacity_total != 0
                && res_value > now_ns
                && res_total < now_ns
            {
                steal_attempted = true;
                match self.steal(class, bytes, capacity, now_ns) {
                    StealOutcome::Stolen(rewound) => break (rewound, res_total),
                    StealOutcome::Contested => {
                        // Lost the victim to a racing thread: return both
                        // reservations and re-reserve. The steal itself is
                        // not retried, so the slow path stays bounded.
                        s.reservation(class).release(bytes, capacity);
                        s.reservation_total.release(bytes, capacity_total);
                        continue;
                    }
                    StealOutcome::NoVictim => {}
                }
            }
            break (res_value, res_total);
        };

        // The aggregate clock caps the sum of the class budgets; whichever
        // reservation is later is the wait target. Equality after folding
        // marks the aggregate as the limiter for accounting.
        if res_value < res_total {
            res_value = res_total;
        }

        if res_value > now_ns {
            let sleep_us = (res_value - now_ns) / 1_000;
            if res_value == res_total {
                s.stats.record_total_throttle(sleep_us);
            } else {
                s.stats.record_throttle(class, sleep_us);
            }
            if sleep_us > THROTTLE_SLEEP_CUTOFF_US {
                tracing::trace!(?class, bytes, sleep_us, "throttled");
                s.clock.sleep_us(sleep_us);
            }
        }
    }

    /// Try to steal a bounded slice of an idle sibling's budget
    ///
    /// The victim is the peer class with the lowest reservation clock, and
    /// only qualifies if that clock is at least half a second in the past.
    /// On success the victim's clock is pushed forward by a sixteenth of a
    /// second plus the caller's slot, and the caller's own clock is rewound
    /// by the equivalent stolen bytes.
    fn steal(
        &self,
        class: ThrottleClass,
        bytes: u64,
        capacity: u64,
        now_ns: u64,
    ) -> StealOutcome {
        let s = &self.shared;

        let mut best = now_ns.saturating_sub(STEAL_IDLE_NS);
        let mut victim = None;
        for peer in ThrottleClass::all() {
            if peer == class {
                continue;
            }
            let res = s.reservation(peer).load();
            if res < best {
                best = res;
                victim = Some(peer);
            }
        }
        let Some(victim) = victim else {
            return StealOutcome::NoVictim;
        };
        let victim_cap = s.capacity(victim);
        if victim_cap == 0 {
            return StealOutcome::NoVictim;
        }

        // Charge the victim from no further than a second in the past, the
        // same staleness bound the reservation clocks keep.
        let base = best.max(now_ns.saturating_sub(NANOS_PER_SEC));
        let target = base + NANOS_PER_SEC / STEAL_SLICE_DIVISOR + slot_ns(bytes, victim_cap);
        if !s.reservation(victim).try_advance(best, target) {
            return StealOutcome::Contested;
        }

        // The victim paid a sixteenth of a second of its budget; credit the
        // equivalent bytes back against our own clock.
        let stolen_bytes = victim_cap / STEAL_SLICE_DIVISOR;
        StealOutcome::Stolen(s.reservation(class).rewind(stolen_bytes, capacity))
    }
}
