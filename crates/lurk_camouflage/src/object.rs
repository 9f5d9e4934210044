//! # Spatial Objects
//!
//! Read-only view of the scene objects a hider can imitate. Owned by the
//! world collaborator; this crate never mutates them.

use lurk_shared::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scene object identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj{}", self.0)
    }
}

/// Object type tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// Cardboard or wooden box.
    Box,
    /// Shipping crate.
    Crate,
    /// Barrel.
    Barrel,
    /// Tree.
    Tree,
    /// Bush.
    Bush,
    /// Rock or boulder.
    Rock,
    /// Potted plant.
    Plant,
    /// Wall segment.
    Wall,
    /// Chair.
    Chair,
    /// Table.
    Table,
    /// Lamp or light post.
    Lamp,
    /// Anything the tables do not know.
    #[serde(other)]
    Unknown,
}

impl ObjectKind {
    /// Every kind, in table order.
    pub const ALL: [Self; 12] = [
        Self::Box,
        Self::Crate,
        Self::Barrel,
        Self::Tree,
        Self::Bush,
        Self::Rock,
        Self::Plant,
        Self::Wall,
        Self::Chair,
        Self::Table,
        Self::Lamp,
        Self::Unknown,
    ];

    /// Stable lowercase tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Box => "box",
            Self::Crate => "crate",
            Self::Barrel => "barrel",
            Self::Tree => "tree",
            Self::Bush => "bush",
            Self::Rock => "rock",
            Self::Plant => "plant",
            Self::Wall => "wall",
            Self::Chair => "chair",
            Self::Table => "table",
            Self::Lamp => "lamp",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a scene tag; unrecognised tags map to `Unknown`.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(tag.trim()))
            .unwrap_or(Self::Unknown)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scene object as reported by the world collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpatialObject {
    /// Object id.
    pub id: ObjectId,
    /// Type tag.
    pub kind: ObjectKind,
    /// Center position.
    pub position: Vec3,
    /// Full extents along x, y, z.
    pub size: Vec3,
    /// Albedo, each channel in `[0, 1]`.
    pub color: [f32; 3],
    /// Whether a hider may imitate it.
    pub can_disguise: bool,
    /// Whether it blocks movement (counts as cover clutter).
    pub collidable: bool,
}

impl SpatialObject {
    /// Creates a disguisable, collidable object with a neutral grey color.
    #[must_use]
    pub fn new(id: u64, kind: ObjectKind, position: Vec3, size: Vec3) -> Self {
        Self {
            id: ObjectId(id),
            kind,
            position,
            size,
            color: [0.5, 0.5, 0.5],
            can_disguise: true,
            collidable: true,
        }
    }

    /// Sets the color.
    #[must_use]
    pub const fn with_color(mut self, color: [f32; 3]) -> Self {
        self.color = color;
        self
    }

    /// Sets the disguisable flag.
    #[must_use]
    pub const fn with_can_disguise(mut self, can_disguise: bool) -> Self {
        self.can_disguise = can_disguise;
        self
    }

    /// Sets the collidable flag.
    #[must_use]
    pub const fn with_collidable(mut self, collidable: bool) -> Self {
        self.collidable = collidable;
        self
    }

    /// Footprint: the mean of the three extents.
    #[must_use]
    pub fn footprint(&self) -> f32 {
        (self.size.x.abs() + self.size.y.abs() + self.size.z.abs()) / 3.0
    }

    /// Shortest distance from `point` to the object's bounding box.
    #[must_use]
    pub fn distance_to_bounds(&self, point: Vec3) -> f32 {
        let half = self.size * 0.5;
        let d = point - self.position;
        let outside = Vec3::new(
            (d.x.abs() - half.x.abs()).max(0.0),
            (d.y.abs() - half.y.abs()).max(0.0),
            (d.z.abs() - half.z.abs()).max(0.0),
        );
        outside.length()
    }

    /// Perceived brightness of the object's color in `[0, 1]`.
    #[must_use]
    pub fn luminance(&self) -> f32 {
        let [r, g, b] = self.color;
        lurk_shared::clamp_unit(0.2126 * r + 0.7152 * g + 0.0722 * b)
    }
}
