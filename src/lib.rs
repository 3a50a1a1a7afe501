//! iocap - I/O capacity throttling for embedded storage engines
//!
//! Features:
//! - Per-class byte budgets (checkpoint, eviction, log, read) enforced by
//!   lock-free reservation clocks, with an aggregate ceiling
//! - Bounded cross-class capacity stealing for bursty workloads
//! - Background flusher issuing async fsync past a written-bytes threshold

pub mod capacity;
pub mod clock;
pub mod session;
