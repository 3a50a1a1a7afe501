//! Capacity subsystem error types

use thiserror::Error;

/// Errors surfaced by the capacity subsystem
#[derive(Error, Debug)]
pub enum CapacityError {
    /// A configured capacity is non-zero but below the engine minimum
    #[error("I/O capacity value {value} below minimum {minimum}")]
    BelowMinimum { value: u64, minimum: u64 },

    /// Opening the flusher's internal session failed
    #[error("failed to open internal session: {0}")]
    Session(String),

    /// Standard IO error from a flush collaborator
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for capacity operations
pub type CapacityResult<T> = Result<T, CapacityError>;
