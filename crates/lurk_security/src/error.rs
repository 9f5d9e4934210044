//! # Movement Error Types

use lurk_shared::ParticipantId;
use thiserror::Error;

/// Errors raised by the movement restrictor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MovementError {
    /// No movement state was registered for this participant.
    #[error("participant not registered with the movement restrictor: {0}")]
    UnknownParticipant(ParticipantId),

    /// Malformed input (non-finite position, negative speed).
    #[error("invalid movement input: {0}")]
    InvalidInput(String),
}

/// Result type for movement operations.
pub type MovementResult<T> = Result<T, MovementError>;
