//! # LURK Shared
//!
//! Common types used by every camouflage and discovery component.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER contain gameplay decisions. It holds:
//! - math (`Vec3`)
//! - identifiers, roles and movement restriction values
//! - wire events (JSON-compatible, epoch-millisecond timestamps)
//! - the typed publish/subscribe bus
//!
//! If you need a scoring rule or a timer, put it in the crate that owns it.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod bus;
pub mod constants;
pub mod events;
pub mod math;
pub mod protocol;

pub use bus::{EventBus, EventReceiver, SubscriptionId};
pub use events::{DiscoveryEvent, DiscoveryMethod, EventType, SharedEvent};
pub use math::Vec3;
pub use protocol::{
    clamp_unit, MovementRestriction, ParticipantId, PlayerAction, Role, TimestampMs,
};
