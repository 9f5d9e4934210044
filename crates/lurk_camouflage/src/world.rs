//! # World Collaborator
//!
//! The scene graph is consumed as a read-only spatial query source.

use lurk_shared::Vec3;

use crate::object::{ObjectId, SpatialObject};

/// Read-only spatial queries against the scene.
pub trait WorldQuery: Send + Sync {
    /// Disguisable objects whose bounds intersect `sphere(center, radius)`.
    fn disguisable_within(&self, center: Vec3, radius: f32) -> Vec<SpatialObject>;

    /// Number of collidable objects whose bounds intersect `sphere(center, radius)`,
    /// not counting `exclude`.
    fn collidable_count_near(&self, center: Vec3, radius: f32, exclude: Option<ObjectId>) -> usize;
}

/// Flat list of objects, linear scans. Fine for tests, tools and small rooms.
#[derive(Clone, Debug, Default)]
pub struct InMemoryWorld {
    objects: Vec<SpatialObject>,
}

impl InMemoryWorld {
    /// Creates an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a world from a list of objects.
    #[must_use]
    pub fn with_objects(objects: Vec<SpatialObject>) -> Self {
        Self { objects }
    }

    /// Adds (or replaces by id) an object.
    pub fn insert(&mut self, object: SpatialObject) {
        self.objects.retain(|o| o.id != object.id);
        self.objects.push(object);
    }

    /// Removes an object. Returns `false` if it was not present.
    pub fn remove(&mut self, id: ObjectId) -> bool {
        let before = self.objects.len();
        self.objects.retain(|o| o.id != id);
        before != self.objects.len()
    }

    /// Number of objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True if the world has no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl WorldQuery for InMemoryWorld {
    fn disguisable_within(&self, center: Vec3, radius: f32) -> Vec<SpatialObject> {
        self.objects
            .iter()
            .filter(|o| o.can_disguise && o.distance_to_bounds(center) <= radius)
            .cloned()
            .collect()
    }

    fn collidable_count_near(&self, center: Vec3, radius: f32, exclude: Option<ObjectId>) -> usize {
        self.objects
            .iter()
            .filter(|o| o.collidable && Some(o.id) != exclude)
            .filter(|o| o.distance_to_bounds(center) <= radius)
            .count()
    }
}
