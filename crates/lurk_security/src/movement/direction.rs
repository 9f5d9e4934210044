//! Direction caps.
//!
//! A direction restriction is an axis lock: when restrictions are applied the
//! participant's current horizontal heading becomes the locked axis. For every
//! later move, the horizontal displacement splits into a part along that axis
//! and a lateral part perpendicular to it. The lateral part is scaled by
//! `lateral_cap` (`0` = rails, `1` = free). Vertical displacement is untouched.
//!
//! Scaling a perpendicular component by a factor in `[0, 1]` can only shorten
//! the vector, so a capped move never becomes faster.

use lurk_shared::{clamp_unit, Vec3};

/// Scales the lateral part of `delta` relative to `axis`.
#[must_use]
pub fn cap_lateral(delta: Vec3, axis: Vec3, lateral_cap: f32) -> Vec3 {
    let Some(axis) = axis.horizontal().normalized() else {
        return delta;
    };
    let cap = clamp_unit(lateral_cap);

    let horizontal = delta.horizontal();
    let along = axis * horizontal.dot(axis);
    let lateral = horizontal - along;
    let capped = along + lateral * cap;

    Vec3::new(capped.x, delta.y, capped.z)
}
