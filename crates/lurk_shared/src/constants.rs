//! # Gameplay Defaults
//!
//! Baseline tuning for the camouflage and discovery loop.
//!
//! **NOTE:** These are defaults only. Every value is overridable through the
//! room configuration file; components never read these directly at runtime.

// =============================================================================
// SCANNING & GENERATION
// =============================================================================

/// Radius of the environment scan around a hider.
pub const DEFAULT_SCAN_RADIUS: f32 = 10.0;

/// Maximum disguise options offered per activation.
pub const DEFAULT_MAX_OPTIONS: usize = 6;

/// Minimum believability a candidate must reach to become an option.
pub const DEFAULT_MIN_BELIEVABILITY: f32 = 0.35;

/// Base disguise duration for a perfect score (ms).
pub const BASE_DISGUISE_DURATION_MS: u64 = 30_000;

/// Shortest disguise ever issued (ms).
pub const MIN_DISGUISE_DURATION_MS: u64 = 10_000;

/// Longest disguise ever issued (ms).
pub const MAX_DISGUISE_DURATION_MS: u64 = 60_000;

// =============================================================================
// DISCOVERY
// =============================================================================

/// Seeker-to-hider distance that starts a proximity dwell.
pub const DEFAULT_PROXIMITY_RADIUS: f32 = 1.0;

/// Time a seeker must linger before a proximity discovery (ms).
pub const DEFAULT_PROXIMITY_DWELL_MS: u64 = 3_000;

/// Confidence attached to a proximity discovery.
pub const DEFAULT_PROXIMITY_CONFIDENCE: f32 = 0.7;

/// Displacement per sample that counts as suspicious movement.
pub const DEFAULT_MOVEMENT_SENSITIVITY: f32 = 0.5;

/// A disguise older than this is discovered automatically (ms).
pub const DEFAULT_MAX_DISGUISE_TIME_MS: u64 = 60_000;

/// Delay between a discovery and its broadcast (ms).
pub const DEFAULT_NOTIFICATION_DELAY_MS: u64 = 500;

/// Maximum seeker-to-target distance for an active interaction.
pub const DEFAULT_MAX_INTERACTION_DISTANCE: f32 = 3.0;

// =============================================================================
// MOVEMENT
// =============================================================================

/// Walking speed of an undisguised participant (units/sec).
pub const DEFAULT_BASE_SPEED: f32 = 5.0;

/// Slack allowed above the current speed before a move is a violation.
pub const DEFAULT_SPEED_TOLERANCE: f32 = 0.1;

// =============================================================================
// COLLABORATORS
// =============================================================================

/// Budget for a single appearance or storage call (ms).
pub const DEFAULT_COLLABORATOR_TIMEOUT_MS: u64 = 2_000;
