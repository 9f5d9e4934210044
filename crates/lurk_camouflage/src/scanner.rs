//! # Environment Scanner
//!
//! Scores every disguisable object around a hider. The score is a product of
//! independently capped factors:
//!
//! | factor | formula |
//! |---|---|
//! | distance | `max(0, 1 - d / radius)` |
//! | size (optional) | `max(0.2, 1 - |footprint - target| / target)` |
//! | kind | [`tables::believability`] |
//! | cover | `min(1, cover_base + cover_per_neighbor * n)` |
//! | lighting (advanced) | `1 - 0.3 * luminance` |
//! | angle (advanced) | `max(0.5, cos(elevation))` |
//!
//! The scanner holds no state between calls.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use lurk_shared::constants::DEFAULT_SCAN_RADIUS;
use lurk_shared::{clamp_unit, Vec3};

use crate::object::SpatialObject;
use crate::tables;
use crate::world::WorldQuery;

/// Scoring knobs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Scan sphere radius.
    pub radius: f32,
    /// Preferred footprint; `None` disables the size factor.
    pub target_footprint: Option<f32>,
    /// Radius around a candidate in which clutter counts as cover.
    pub cover_radius: f32,
    /// Cover factor with no clutter.
    pub cover_base: f32,
    /// Cover bonus per collidable neighbor.
    pub cover_per_neighbor: f32,
    /// Enables the lighting and approach-angle factors.
    pub advanced: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            radius: DEFAULT_SCAN_RADIUS,
            target_footprint: None,
            cover_radius: 3.0,
            cover_base: 0.8,
            cover_per_neighbor: 0.05,
            advanced: false,
        }
    }
}

/// A scored scan hit.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalyzedCandidate {
    /// The object.
    pub object: SpatialObject,
    /// Center distance from the hider.
    pub distance: f32,
    /// Believability score in `[0, 1]`.
    pub score: f32,
    /// Copied from the object.
    pub can_disguise: bool,
}

/// Stateless scorer over a [`WorldQuery`].
#[derive(Clone, Debug, Default)]
pub struct EnvironmentScanner {
    config: ScannerConfig,
}

impl EnvironmentScanner {
    /// Creates a scanner.
    #[must_use]
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Current config.
    #[must_use]
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Scans around `center` and returns candidates sorted by score, best first.
    ///
    /// Ties are broken by object id so the order is stable.
    pub fn scan(&self, world: &dyn WorldQuery, center: Vec3) -> Vec<AnalyzedCandidate> {
        if !center.is_finite() || self.config.radius.is_nan() || self.config.radius <= 0.0 {
            return Vec::new();
        }

        let mut candidates: Vec<AnalyzedCandidate> = world
            .disguisable_within(center, self.config.radius)
            .into_iter()
            .filter(|o| o.can_disguise)
            .map(|object| {
                let distance = object.position.distance(center);
                let neighbors = world.collidable_count_near(
                    object.position,
                    self.config.cover_radius,
                    Some(object.id),
                );
                let score = self.score(&object, center, distance, neighbors);
                AnalyzedCandidate {
                    can_disguise: object.can_disguise,
                    object,
                    distance,
                    score,
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.object.id.cmp(&b.object.id))
        });

        tracing::debug!(
            found = candidates.len(),
            radius = self.config.radius,
            "environment scan complete"
        );
        candidates
    }

    /// Score of one object seen from `center`.
    #[must_use]
    pub fn score(&self, object: &SpatialObject, center: Vec3, distance: f32, neighbors: usize) -> f32 {
        let cfg = &self.config;

        let distance_factor = (1.0 - distance / cfg.radius).max(0.0);

        let size_factor = match cfg.target_footprint {
            Some(target) if target > 0.0 => {
                (1.0 - (object.footprint() - target).abs() / target).max(0.2)
            }
            _ => 1.0,
        };

        let kind_factor = tables::believability(object.kind);

        let cover_factor = (cfg.cover_base + cfg.cover_per_neighbor * neighbors as f32).min(1.0);

        let mut score = distance_factor * size_factor * kind_factor * cover_factor;

        if cfg.advanced {
            let lighting = 1.0 - 0.3 * object.luminance();
            let offset = object.position - center;
            let horizontal = offset.horizontal().length();
            let angle = if horizontal <= f32::EPSILON && offset.y.abs() <= f32::EPSILON {
                1.0
            } else {
                offset.y.atan2(horizontal).cos().max(0.5)
            };
            score *= lighting * angle;
        }

        clamp_unit(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ObjectId, ObjectKind};
    use crate::world::InMemoryWorld;

    fn cube(id: u64, kind: ObjectKind, at: Vec3, edge: f32) -> SpatialObject {
        SpatialObject::new(id, kind, at, Vec3::new(edge, edge, edge))
    }

    #[test]
    fn test_single_box_scores() {
        let world = InMemoryWorld::with_objects(vec![cube(
            1,
            ObjectKind::Box,
            Vec3::new(1.0, 0.0, 1.0),
            2.0,
        )]);
        let scanner = EnvironmentScanner::default();
        let hits = scanner.scan(&world, Vec3::ZERO);

        assert_eq!(hits.len(), 1);
        let expected = (1.0 - 2.0_f32.sqrt() / 10.0) * 0.75 * 0.8;
        assert!((hits[0].score - expected).abs() < 1e-5, "{}", hits[0].score);
    }

    #[test]
    fn test_sorted_and_clamped() {
        let world = InMemoryWorld::with_objects(vec![
            cube(1, ObjectKind::Wall, Vec3::new(2.0, 0.0, 0.0), 1.0),
            cube(2, ObjectKind::Tree, Vec3::new(2.0, 0.0, 0.0), 1.0),
            cube(3, ObjectKind::Box, Vec3::new(8.0, 0.0, 0.0), 1.0),
            cube(4, ObjectKind::Rock, Vec3::new(0.0, 0.0, 9.5), 1.0),
        ]);
        let scanner = EnvironmentScanner::default();
        let hits = scanner.scan(&world, Vec3::ZERO);

        assert_eq!(hits.len(), 4);
        assert_eq!(hits[0].object.id, ObjectId(2));
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        for hit in &hits {
            assert!((0.0..=1.0).contains(&hit.score));
        }
    }

    #[test]
    fn test_cover_rewards_clutter() {
        let scanner = EnvironmentScanner::default();
        let obj = cube(1, ObjectKind::Crate, Vec3::new(3.0, 0.0, 0.0), 1.0);
        let alone = scanner.score(&obj, Vec3::ZERO, 3.0, 0);
        let cluttered = scanner.score(&obj, Vec3::ZERO, 3.0, 3);
        assert!(cluttered > alone);
        // Cover saturates at 1.
        let saturated = scanner.score(&obj, Vec3::ZERO, 3.0, 100);
        let expected = (1.0 - 0.3) * 0.7;
        assert!((saturated - expected).abs() < 1e-5);
    }

    #[test]
    fn test_size_factor_floor() {
        let scanner = EnvironmentScanner::new(ScannerConfig {
            target_footprint: Some(1.0),
            ..ScannerConfig::default()
        });
        let huge = cube(1, ObjectKind::Rock, Vec3::ZERO, 50.0);
        let fitted = cube(2, ObjectKind::Rock, Vec3::ZERO, 1.0);
        let huge_score = scanner.score(&huge, Vec3::ZERO, 0.0, 0);
        let fitted_score = scanner.score(&fitted, Vec3::ZERO, 0.0, 0);
        assert!((huge_score / fitted_score - 0.2).abs() < 1e-4);
    }

    #[test]
    fn test_advanced_mode_penalizes_bright_overhead() {
        let plain = EnvironmentScanner::default();
        let advanced = EnvironmentScanner::new(ScannerConfig {
            advanced: true,
            ..ScannerConfig::default()
        });
        let bright = cube(1, ObjectKind::Lamp, Vec3::new(1.0, 3.0, 0.0), 1.0)
            .with_color([1.0, 1.0, 1.0]);
        let d = bright.position.length();
        assert!(advanced.score(&bright, Vec3::ZERO, d, 0) < plain.score(&bright, Vec3::ZERO, d, 0));
    }

    #[test]
    fn test_empty_world_and_bad_input() {
        let scanner = EnvironmentScanner::default();
        let world = InMemoryWorld::new();
        assert!(scanner.scan(&world, Vec3::ZERO).is_empty());
        let world = InMemoryWorld::with_objects(vec![cube(1, ObjectKind::Box, Vec3::ZERO, 1.0)]);
        assert!(scanner.scan(&world, Vec3::new(f32::NAN, 0.0, 0.0)).is_empty());
    }
}
