//! # Room Configuration
//!
//! One TOML document configures a room. Every table is optional and every
//! missing key takes its default.
//!
//! ```toml
//! rng_seed = 42
//!
//! [scanner]
//! radius = 12.0
//!
//! [generator]
//! max_options = 5
//!
//! [discovery]
//! proximity_dwell_ms = 2500
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use lurk_camouflage::{GeneratorConfig, ScannerConfig, SessionConfig};
use lurk_security::RestrictorConfig;

use crate::discovery::DiscoveryConfig;
use crate::error::{RoomError, RoomResult};
use crate::interaction::InteractionConfig;

/// Full room configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Seed of the room's random source.
    pub rng_seed: u64,
    /// Minimum gap between cache maintenance passes.
    pub maintenance_interval_ms: u64,
    /// Environment scanner.
    pub scanner: ScannerConfig,
    /// Disguise generator.
    pub generator: GeneratorConfig,
    /// Session manager.
    pub session: SessionConfig,
    /// Movement restrictor.
    pub movement: RestrictorConfig,
    /// Interaction gateway.
    pub interaction: InteractionConfig,
    /// Discovery engine.
    pub discovery: DiscoveryConfig,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            rng_seed: 0x5EED,
            maintenance_interval_ms: 1_000,
            scanner: ScannerConfig::default(),
            generator: GeneratorConfig::default(),
            session: SessionConfig::default(),
            movement: RestrictorConfig::default(),
            interaction: InteractionConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl RoomConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` on a parse or validation failure.
    pub fn from_toml_str(text: &str) -> RoomResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| RoomError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> RoomResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RoomError::InvalidConfig(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "room config loaded");
        Ok(config)
    }

    /// Renders the config as TOML.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if a value cannot be represented.
    pub fn to_toml_string(&self) -> RoomResult<String> {
        toml::to_string(self).map_err(|e| RoomError::InvalidConfig(e.to_string()))
    }

    /// Rejects values no room can run with.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` naming the first offending key.
    pub fn validate(&self) -> RoomResult<()> {
        let fail = |key: &str, why: &str| Err(RoomError::InvalidConfig(format!("{key}: {why}")));

        if !(self.scanner.radius.is_finite() && self.scanner.radius > 0.0) {
            return fail("scanner.radius", "must be positive");
        }
        if let Some(target) = self.scanner.target_footprint {
            if !(target.is_finite() && target > 0.0) {
                return fail("scanner.target_footprint", "must be positive");
            }
        }
        if !(5..=8).contains(&self.generator.max_options) {
            return fail("generator.max_options", "must be within 5..=8");
        }
        if !(0.3..=0.4).contains(&self.generator.min_believability) {
            return fail("generator.min_believability", "must be within 0.3..=0.4");
        }
        if !(self.generator.diversity_factor > 0.0 && self.generator.diversity_factor <= 1.0) {
            return fail("generator.diversity_factor", "must be within (0, 1]");
        }
        if !(self.movement.speed_tolerance.is_finite() && self.movement.speed_tolerance >= 0.0) {
            return fail("movement.speed_tolerance", "must be non-negative");
        }
        if !(self.movement.default_base_speed.is_finite() && self.movement.default_base_speed >= 0.0)
        {
            return fail("movement.default_base_speed", "must be non-negative");
        }
        if !(self.interaction.max_distance.is_finite() && self.interaction.max_distance > 0.0) {
            return fail("interaction.max_distance", "must be positive");
        }
        if !(self.discovery.proximity_radius.is_finite() && self.discovery.proximity_radius > 0.0) {
            return fail("discovery.proximity_radius", "must be positive");
        }
        if !(0.0..=1.0).contains(&self.discovery.proximity_confidence)
            || !(0.0..=1.0).contains(&self.discovery.timeout_confidence)
        {
            return fail("discovery confidences", "must be within [0, 1]");
        }
        if self.session.collaborator_timeout_ms == 0 {
            return fail("session.collaborator_timeout_ms", "must be positive");
        }
        Ok(())
    }
}
