//! # Room Error Types
//!
//! Everything a `Room` operation can fail with. Component errors are wrapped
//! unchanged.

use lurk_camouflage::CamouflageError;
use lurk_security::MovementError;
use lurk_shared::{ParticipantId, Role};
use thiserror::Error;

use crate::interaction::InteractionError;
use crate::persistence::PersistenceError;

/// Errors returned by the room facade.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RoomError {
    /// The participant's role does not allow the operation.
    #[error("{participant} ({role}) may not {operation}")]
    RoleViolation {
        /// Caller.
        participant: ParticipantId,
        /// Caller's role.
        role: Role,
        /// Rejected operation.
        operation: &'static str,
    },

    /// No such participant in the room.
    #[error("unknown participant: {0}")]
    UnknownParticipant(ParticipantId),

    /// The id is already taken.
    #[error("participant already registered: {0}")]
    AlreadyRegistered(ParticipantId),

    /// A discovered hider cannot disguise again until reset.
    #[error("{0} has been discovered")]
    AlreadyDiscovered(ParticipantId),

    /// Configuration rejected by validation.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Malformed input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Disguise pipeline or appearance failure.
    #[error(transparent)]
    Camouflage(#[from] CamouflageError),

    /// Movement restrictor failure.
    #[error(transparent)]
    Movement(#[from] MovementError),

    /// Interaction gateway failure.
    #[error(transparent)]
    Interaction(#[from] InteractionError),

    /// Storage failure.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Result type for room operations.
pub type RoomResult<T> = Result<T, RoomError>;

impl RoomError {
    /// True for role violations.
    #[must_use]
    pub const fn is_role_violation(&self) -> bool {
        matches!(self, Self::RoleViolation { .. })
    }
}
