//! # Camouflage Error Types
//!
//! All errors that can occur while generating or managing disguises.

use lurk_shared::ParticipantId;
use thiserror::Error;

/// Failure reported by the appearance collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("appearance collaborator failed: {0}")]
pub struct AppearanceError(pub String);

/// Errors that can occur in the camouflage system.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CamouflageError {
    /// The scan produced no option above the believability threshold.
    #[error("no disguise available for {participant}")]
    NoDisguiseAvailable {
        /// Participant that asked.
        participant: ParticipantId,
    },

    /// The appearance collaborator rejected apply/revert.
    #[error("appearance {operation} failed for {participant}: {reason}")]
    TransformationFailed {
        /// `apply` or `revert`.
        operation: &'static str,
        /// Participant whose appearance was being changed.
        participant: ParticipantId,
        /// Collaborator's explanation.
        reason: String,
    },

    /// A collaborator call exceeded its budget.
    #[error("appearance {operation} for {participant} timed out after {budget_ms} ms")]
    Timeout {
        /// `apply` or `revert`.
        operation: &'static str,
        /// Participant whose appearance was being changed.
        participant: ParticipantId,
        /// Budget that was exceeded.
        budget_ms: u64,
    },

    /// Malformed input (non-finite position, empty id).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for camouflage operations.
pub type CamouflageResult<T> = Result<T, CamouflageError>;
