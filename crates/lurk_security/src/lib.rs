//! # LURK Security - The Leash
//!
//! Server-side movement validation for disguised participants.
//!
//! ## Features
//!
//! - **Speed Caps**: current speed = base speed x tightest speed multiplier
//! - **Direction Caps**: lateral displacement scaled against a locked heading
//! - **Action Locks**: jump/sprint/interact forbidden per disguise
//! - **Violation Tracking**: per-participant counters, aggregate statistics,
//!   and a typed event stream for anti-cheat collaborators
//!
//! ## Architecture
//!
//! ```text
//! CLIENT REQUEST                    RESTRICTOR
//!     │                                │
//!     │─── requested position ────────►│ implied speed = |Δ| / dt
//!     │                                │
//!     │                                ├── over cap? clamp along Δ, count violation
//!     │                                ├── direction cap? scale lateral part
//!     │                                │
//!     │◄─── corrected position ────────┤
//!     │                                │
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod movement;
pub mod stats;

pub use error::{MovementError, MovementResult};
pub use movement::{MovementCheck, MovementRestrictor, MovementState, RestrictorConfig, ViolationEvent};
pub use stats::ViolationStats;
