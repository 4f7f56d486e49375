//! Core error types.
//!
//! Per the error-handling design, only the "programmer-visible assertion"
//! class (invariant breaks that should halt the run with a diagnostic)
//! surfaces as a `Result`. Random loss, queue overflow, and stale ACK/NACK
//! lookups are normal control flow and never produce an error here.

/// An invariant the simulation engine checked and found broken.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("link queue invariant violated: {0}")]
    QueueInvariant(String),

    #[error("packet size {size} exceeds MSS {mss} outside padding/probe path")]
    OversizedPacket { size: usize, mss: usize },

    #[error("rtt state invariant violated: {0}")]
    RttInvariant(String),

    #[error("{0}")]
    InvariantViolated(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
