//! # LURK
//!
//! The room crate, integrating every camouflage and discovery component.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                  ROOM                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐   │
//! │  │   Camouflage    │     │   Security      │     │   Interaction   │   │
//! │  │                 │────>│                 │     │   Gateway       │   │
//! │  │  • Scanner      │     │  • Speed caps   │     │                 │   │
//! │  │  • Generator    │     │  • Axis lock    │     │  • Probes       │   │
//! │  │  • Sessions     │     │  • Violations   │     │  • Cooldowns    │   │
//! │  └────────┬────────┘     └─────────────────┘     └────────┬────────┘   │
//! │           │                                               │            │
//! │           │              ┌─────────────────┐              │            │
//! │           └─────────────>│   Discovery     │<─────────────┘            │
//! │                          │   Engine        │                           │
//! │                          │                 │                           │
//! │                          │  • Dwell timers │                           │
//! │                          │  • Movement     │                           │
//! │                          │  • Timeouts     │                           │
//! │                          └─────────────────┘                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `room`: the facade; role checks, maintenance tick, event bridge
//! - `interaction`: seekers probing targets
//! - `discovery`: passive detection and the discovery log
//! - `config`: TOML room configuration
//! - `persistence`: snapshots to an async blob store
//! - `clock` / `timers`: injected time and cancellable deadlines

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod clock;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod interaction;
pub mod persistence;
pub mod room;
pub mod timers;

// Re-export the components
pub use lurk_camouflage as camouflage;
pub use lurk_security as security;
pub use lurk_shared as shared;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RoomConfig;
pub use discovery::{DiscoveryConfig, DiscoveryEngine, DiscoveryTick, ProximityHint};
pub use error::{RoomError, RoomResult};
pub use interaction::{
    InteractionConfig, InteractionError, InteractionGateway, InteractionOutcome,
    InteractionResult, InteractionStats, InteractionTarget, InteractionType, PendingInteraction,
    TargetKind,
};
pub use persistence::{
    load_snapshot, save_snapshot, BlobStore, MemoryBlobStore, PersistenceError, RoomSnapshot,
};
pub use room::{ParticipantProfile, Room, TickReport};
pub use timers::TimerWheel;
