//! Shared event types between the room and its observers.
//!
//! These events are what telemetry, the HUD and the network transport see.
//! Payload shapes are stable: fields are only ever added, never renamed.
//! Timestamps are epoch milliseconds, positions are `{x,y,z}`.

use crate::math::Vec3;
use crate::protocol::{ParticipantId, TimestampMs};
use serde::{Deserialize, Serialize};

/// Event type discriminator
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A disguise was applied
    Activated = 0,
    /// A disguise was removed
    Deactivated = 1,
    /// A disguised participant was uncovered
    Discovered = 2,
    /// An active interaction resolved
    InteractionResult = 3,
    /// A movement request broke the active restrictions
    Violation = 4,
}

impl EventType {
    /// Stable event name used by subscribers.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Activated => "activated",
            Self::Deactivated => "deactivated",
            Self::Discovered => "discovered",
            Self::InteractionResult => "interaction_result",
            Self::Violation => "violation",
        }
    }
}

/// How a discovery came about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    /// A seeker probed the target.
    Interaction,
    /// A seeker lingered within the proximity radius.
    Proximity,
    /// The hider moved abruptly near a seeker.
    Movement,
    /// The disguise outlived the maximum disguise time.
    Timeout,
}

/// Why a disguise ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeactivationReason {
    /// The hider asked for it.
    Requested,
    /// The disguise passed its expiry time.
    Expired,
    /// The hider was discovered.
    Discovered,
    /// A new activation replaced it.
    Replaced,
    /// The participant left the room.
    Unregistered,
}

/// A single discovery. Append-only: once logged it is never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryEvent {
    /// Monotonic id within the room.
    pub id: u64,
    /// The participant who was uncovered.
    pub participant: ParticipantId,
    /// The seeker credited with the discovery (none for timeouts).
    pub discoverer: Option<ParticipantId>,
    /// Detection channel.
    pub method: DiscoveryMethod,
    /// Where the hider was.
    pub position: Vec3,
    /// When it happened.
    pub timestamp: TimestampMs,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
}

/// Events that leave the room
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SharedEvent {
    /// A disguise was applied
    Activated {
        /// Disguised participant
        participant: ParticipantId,
        /// Generated disguise id
        disguise_id: String,
        /// Object kind the hider now looks like
        object_kind: String,
        /// Difficulty label
        difficulty: String,
        /// Believability of the chosen disguise
        believability: f32,
        /// Where the disguise is anchored
        position: Vec3,
        /// Session start
        started_at: TimestampMs,
        /// Scheduled expiry
        expires_at: TimestampMs,
    },

    /// A disguise was removed
    Deactivated {
        /// Participant whose disguise ended
        participant: ParticipantId,
        /// Generated disguise id
        disguise_id: String,
        /// Why it ended
        reason: DeactivationReason,
        /// Session end
        ended_at: TimestampMs,
    },

    /// A hider was uncovered (delivered after the notification delay)
    Discovered {
        /// The logged discovery
        discovery: DiscoveryEvent,
    },

    /// An interaction resolved
    InteractionResult {
        /// Seeker who interacted
        seeker: ParticipantId,
        /// Target registry id
        target_id: String,
        /// Whether the probe succeeded
        success: bool,
        /// Confidence in `[0, 1]`
        confidence: f32,
        /// Participant uncovered by this probe, if any
        discovered: Option<ParticipantId>,
        /// Resolution time
        timestamp: TimestampMs,
    },

    /// A movement request was corrected
    Violation {
        /// Offending participant
        participant: ParticipantId,
        /// Speed implied by the request
        implied_speed: f32,
        /// Speed the participant is allowed
        allowed_speed: f32,
        /// Total violations for this participant so far
        violations: u32,
        /// When it happened
        timestamp: TimestampMs,
    },
}

impl SharedEvent {
    /// Returns the event type
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::Activated { .. } => EventType::Activated,
            Self::Deactivated { .. } => EventType::Deactivated,
            Self::Discovered { .. } => EventType::Discovered,
            Self::InteractionResult { .. } => EventType::InteractionResult,
            Self::Violation { .. } => EventType::Violation,
        }
    }

    /// Returns the stable event name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.event_type().name()
    }

    /// Returns the participant this event is about (the seeker for interactions)
    #[must_use]
    pub fn participant(&self) -> ParticipantId {
        match self {
            Self::Activated { participant, .. }
            | Self::Deactivated { participant, .. }
            | Self::Violation { participant, .. } => *participant,
            Self::Discovered { discovery } => discovery.participant,
            Self::InteractionResult { seeker, .. } => *seeker,
        }
    }

    /// Serializes the event for the transport.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if a payload contains a non-finite float.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
