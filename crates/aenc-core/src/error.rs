//! Error types for the decision engine.

use thiserror::Error;

/// Engine error types.
#[derive(Debug, Error)]
pub enum AencError {
    /// Configuration constraint violated at construction.
    #[error("invalid parameter: {0}")]
    InvalidParams(String),

    /// Operation not permitted in the engine's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Scene analyzer rejected its configuration.
    #[error("analyzer initialization failed: {0}")]
    InitFailed(String),

    /// A fixed-capacity output list overflowed; the frame is lost.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// An unreachable internal combination was reached; the frame is lost.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, AencError>;
