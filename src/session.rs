//! Engine collaborator traits for the background flusher
//!
//! The flusher does not perform file I/O itself; the engine hands it an
//! internal session whose `fsync_all_background` schedules an asynchronous
//! flush of every dirty file. The session is opened when the flusher starts
//! and dropped when its thread exits.

use crate::capacity::error::CapacityResult;

/// A session the flusher uses to issue background fsyncs
///
/// `fsync_all_background` must be idempotent: invoking it while a prior
/// flush is still in flight is a no-op for already-clean files.
pub trait FlushSession: Send {
    /// Schedule an asynchronous fsync of all dirty files
    fn fsync_all_background(&mut self) -> CapacityResult<()>;
}

/// Opens internal sessions on behalf of background servers
pub trait SessionFactory: Send + Sync {
    /// Open a named internal session
    fn open_internal_session(&self, name: &str) -> CapacityResult<Box<dyn FlushSession>>;
}
