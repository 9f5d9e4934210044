//! # LURK Camouflage System
//!
//! Disguise generation and lifecycle for the LURK hide-and-seek engine.
//!
//! ## The Pipeline
//!
//! ```text
//! hider position ──> EnvironmentScanner ──> ranked candidates
//!                                               │
//!                                               ▼
//!                    DisguiseGenerator  ──> options (filtered, diversified, labeled)
//!                                               │
//!                                               ▼
//!                    DisguiseSessionManager ──> appearance.apply() ──> session record
//! ```
//!
//! ## Design Principles
//!
//! 1. **Pure scoring** - Scanner and generator never mutate world state
//! 2. **Clamped values** - Every score lives in `[0, 1]`
//! 3. **At most one session per participant** - re-activation replaces
//! 4. **No partial state** - a failed appearance call leaves no record
//!
//! ## Example
//!
//! ```rust,ignore
//! use lurk_camouflage::{DisguiseSessionManager, ActivationRequest};
//!
//! let mut sessions = DisguiseSessionManager::new(config, world, appearance);
//! let activation = sessions.activate(ActivationRequest::new(hider, position, snapshot, now)).await?;
//! restrictor.apply_restrictions(hider, &activation.record.restrictions)?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod appearance;
pub mod error;
pub mod generator;
pub mod object;
pub mod scanner;
pub mod session;
pub mod tables;
pub mod world;

pub use appearance::{AppearanceCall, AppearanceSnapshot, AppearanceTransformer, ScriptedAppearance};
pub use error::{AppearanceError, CamouflageError, CamouflageResult};
pub use generator::{
    Difficulty, DisguiseGenerator, DisguiseOption, GeneratedDisguise, GenerationRequest,
    GeneratorConfig,
};
pub use object::{ObjectId, ObjectKind, SpatialObject};
pub use scanner::{AnalyzedCandidate, EnvironmentScanner, ScannerConfig};
pub use session::{
    Activation, ActivationRequest, DisguiseSessionManager, DisguiseSessionRecord, SessionConfig,
    SessionEvent,
};
pub use world::{InMemoryWorld, WorldQuery};
