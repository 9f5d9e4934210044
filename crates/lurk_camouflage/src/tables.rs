//! # Per-Kind Tuning Tables
//!
//! Static balance data, one row per [`ObjectKind`]. Every lookup is a single
//! `match`, no allocation.

use crate::object::ObjectKind;

/// Baseline believability of imitating a kind.
///
/// Natural objects blend in, walls do not.
#[inline]
#[must_use]
pub const fn believability(kind: ObjectKind) -> f32 {
    match kind {
        ObjectKind::Tree | ObjectKind::Bush => 0.9,
        ObjectKind::Rock => 0.85,
        ObjectKind::Plant => 0.8,
        ObjectKind::Box => 0.75,
        ObjectKind::Crate | ObjectKind::Barrel => 0.7,
        ObjectKind::Chair => 0.6,
        ObjectKind::Table => 0.55,
        ObjectKind::Lamp | ObjectKind::Unknown => 0.5,
        ObjectKind::Wall => 0.3,
    }
}

/// Speed multiplier imposed while disguised as a kind.
#[inline]
#[must_use]
pub const fn speed_multiplier(kind: ObjectKind) -> f32 {
    match kind {
        ObjectKind::Lamp => 0.6,
        ObjectKind::Chair => 0.55,
        ObjectKind::Box | ObjectKind::Barrel | ObjectKind::Plant => 0.5,
        ObjectKind::Crate => 0.45,
        ObjectKind::Table | ObjectKind::Unknown => 0.4,
        ObjectKind::Bush => 0.35,
        ObjectKind::Rock => 0.15,
        ObjectKind::Tree => 0.1,
        ObjectKind::Wall => 0.05,
    }
}

/// Flavor tag describing where a kind belongs.
#[inline]
#[must_use]
pub const fn flavor(kind: ObjectKind) -> &'static str {
    match kind {
        ObjectKind::Tree | ObjectKind::Bush | ObjectKind::Rock | ObjectKind::Plant => "natural",
        ObjectKind::Box | ObjectKind::Crate | ObjectKind::Barrel => "container",
        ObjectKind::Chair | ObjectKind::Table | ObjectKind::Lamp => "furniture",
        ObjectKind::Wall => "structural",
        ObjectKind::Unknown => "generic",
    }
}

/// Visual model reference handed to the appearance collaborator.
#[must_use]
pub fn model_ref(kind: ObjectKind) -> String {
    format!("props/{}.glb", kind.as_str())
}

/// Size class tag from a footprint.
#[inline]
#[must_use]
pub fn size_class(footprint: f32) -> &'static str {
    if footprint < 1.0 {
        "small"
    } else if footprint < 2.5 {
        "medium"
    } else {
        "large"
    }
}

/// Quality class tag from a believability score.
#[inline]
#[must_use]
pub fn quality_class(score: f32) -> &'static str {
    if score >= 0.8 {
        "excellent"
    } else if score >= 0.6 {
        "good"
    } else {
        "fair"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_stay_in_unit_range() {
        for kind in ObjectKind::ALL {
            assert!((0.0..=1.0).contains(&believability(kind)), "{kind}");
            assert!((0.0..=1.0).contains(&speed_multiplier(kind)), "{kind}");
        }
    }

    #[test]
    fn test_anchor_values() {
        assert!((believability(ObjectKind::Wall) - 0.3).abs() < f32::EPSILON);
        assert!((believability(ObjectKind::Tree) - 0.9).abs() < f32::EPSILON);
        assert!((believability(ObjectKind::Unknown) - 0.5).abs() < f32::EPSILON);
        assert_eq!(model_ref(ObjectKind::Box), "props/box.glb");
    }
}
