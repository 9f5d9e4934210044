//! Protocol values shared between the room components and the transport.
//!
//! These types are serialized and sent over the network.
//! Every component of a room must agree on these definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliseconds since the Unix epoch.
pub type TimestampMs = u64;

/// Clamps a score or confidence into `[0, 1]`.
///
/// NaN collapses to `0.0` so a bad factor can never leak out of a pipeline.
#[inline]
#[must_use]
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Participant identifier, unique within a room.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub u32);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Gameplay role of a participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Disguises themselves as environment objects.
    Hider,
    /// Tries to uncover disguised hiders.
    Seeker,
    /// Watches; may not disguise or interact.
    Spectator,
}

impl Role {
    /// Stable lowercase name used in logs and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hider => "hider",
            Self::Seeker => "seeker",
            Self::Spectator => "spectator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discrete player actions that a disguise may forbid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerAction {
    /// Vertical hop.
    Jump,
    /// Running above walking speed.
    Sprint,
    /// Using objects in the world.
    Interact,
}

/// A single constraint imposed while disguised.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MovementRestriction {
    /// Caps speed to `base_speed * multiplier`.
    Speed {
        /// Multiplier in `[0, 1]`.
        multiplier: f32,
    },
    /// Scales the lateral part of every move relative to the locked heading.
    Direction {
        /// Fraction of lateral displacement kept, in `[0, 1]`.
        lateral_cap: f32,
    },
    /// Forbids an action outright.
    Action {
        /// The forbidden action.
        action: PlayerAction,
    },
}

impl MovementRestriction {
    /// Speed multiplier carried by this restriction, if it is a speed cap.
    #[must_use]
    pub fn speed_multiplier(&self) -> Option<f32> {
        match self {
            Self::Speed { multiplier } => Some(clamp_unit(*multiplier)),
            _ => None,
        }
    }

    /// Lateral cap carried by this restriction, if it is a direction cap.
    #[must_use]
    pub fn lateral_cap(&self) -> Option<f32> {
        match self {
            Self::Direction { lateral_cap } => Some(clamp_unit(*lateral_cap)),
            _ => None,
        }
    }

    /// Returns true if this restriction forbids `action`.
    #[must_use]
    pub fn forbids(&self, action: PlayerAction) -> bool {
        matches!(self, Self::Action { action: a } if *a == action)
    }
}
