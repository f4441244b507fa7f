use glam::DVec3;
use serde::{Deserialize, Serialize};

use super::{body::LinkRef, types::Transform};
use crate::utils::allocator::Handle;

pub type ColliderId = Handle<Collider>;

/// Enumeration of supported collider geometries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ColliderShape {
    Sphere {
        radius: f64,
    },
    Box {
        half_extents: DVec3,
    },
    /// Infinite plane `{x : normal · x = offset}` in the collider frame; the
    /// solid lies on the side opposite the normal.
    Plane {
        normal: DVec3,
        offset: f64,
    },
}

impl ColliderShape {
    /// Radius of a sphere around the collider origin enclosing the shape.
    /// Infinite for planes.
    pub fn bounding_radius(&self) -> f64 {
        match self {
            ColliderShape::Sphere { radius } => *radius,
            ColliderShape::Box { half_extents } => half_extents.length(),
            ColliderShape::Plane { .. } => f64::INFINITY,
        }
    }
}

/// Geometry attached to a single link.
#[derive(Debug, Clone, PartialEq)]
pub struct Collider {
    pub link: LinkRef,
    pub shape: ColliderShape,
    /// Pose of the geometry relative to the link frame.
    pub offset: Transform,
}

impl Collider {
    pub fn new(link: LinkRef, shape: ColliderShape) -> Self {
        Self {
            link,
            shape,
            offset: Transform::IDENTITY,
        }
    }

    pub fn sphere(link: LinkRef, radius: f64) -> Self {
        Self::new(link, ColliderShape::Sphere { radius })
    }

    pub fn cuboid(link: LinkRef, half_extents: DVec3) -> Self {
        Self::new(link, ColliderShape::Box { half_extents })
    }

    pub fn plane(link: LinkRef, normal: DVec3, offset: f64) -> Self {
        Self::new(
            link,
            ColliderShape::Plane {
                normal: normal.normalize(),
                offset,
            },
        )
    }

    pub fn with_offset(mut self, offset: Transform) -> Self {
        self.offset = offset;
        self
    }

    pub fn world_transform(&self, link_pose: &Transform) -> Transform {
        link_pose.combine(&self.offset)
    }

    pub fn bounding_radius(&self) -> f64 {
        self.shape.bounding_radius()
    }
}
