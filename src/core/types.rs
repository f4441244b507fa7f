use glam::{DMat3, DQuat, DVec3};
use serde::{Deserialize, Serialize};

/// Rigid placement of a frame: position and orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: DVec3,
    pub rotation: DQuat,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: DVec3::ZERO,
        rotation: DQuat::IDENTITY,
    };

    pub fn new(position: DVec3, rotation: DQuat) -> Self {
        Self { position, rotation }
    }

    pub fn from_position(position: DVec3) -> Self {
        Self {
            position,
            rotation: DQuat::IDENTITY,
        }
    }

    /// Applies another transform on top of this one, returning the composition.
    pub fn combine(&self, other: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * other.position,
            rotation: (self.rotation * other.rotation).normalize(),
        }
    }

    pub fn transform_point(&self, local: DVec3) -> DVec3 {
        self.position + self.rotation * local
    }

    pub fn transform_vector(&self, local: DVec3) -> DVec3 {
        self.rotation * local
    }

    pub fn inverse_transform_point(&self, world: DVec3) -> DVec3 {
        self.rotation.conjugate() * (world - self.position)
    }

    /// Pose a fraction `t` of the way from `self` to `other`.
    pub fn interpolate(&self, other: &Transform, t: f64) -> Transform {
        Transform {
            position: self.position.lerp(other.position, t),
            rotation: self.rotation.slerp(other.rotation, t),
        }
    }
}

/// Linear and angular velocity of a rigid body (world frame, linear velocity of the center of mass).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub linear: DVec3,
    pub angular: DVec3,
}

impl Velocity {
    pub fn new(linear: DVec3, angular: DVec3) -> Self {
        Self { linear, angular }
    }
}

/// Mass and body-frame inertia tensor about the center of mass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: f64,
    pub inertia: DMat3,
}

impl Default for MassProperties {
    fn default() -> Self {
        Self {
            mass: 1.0,
            inertia: DMat3::IDENTITY,
        }
    }
}

impl MassProperties {
    pub fn new(mass: f64, inertia: DMat3) -> Self {
        Self { mass, inertia }
    }

    pub fn solid_sphere(radius: f64, mass: f64) -> Self {
        Self::new(mass, DMat3::for_solid_sphere(radius, mass))
    }

    pub fn solid_box(half_extents: DVec3, mass: f64) -> Self {
        Self::new(mass, DMat3::for_solid_box(half_extents, mass))
    }

    /// Infinite mass: the body never moves.
    pub fn infinite() -> Self {
        Self {
            mass: f64::INFINITY,
            inertia: DMat3::ZERO,
        }
    }

    pub fn inverse_mass(&self) -> f64 {
        if !self.mass.is_finite() || self.mass <= f64::EPSILON {
            0.0
        } else {
            1.0 / self.mass
        }
    }

    pub fn inverse_inertia(&self) -> DMat3 {
        if self.inertia.determinant().abs() <= f64::EPSILON {
            DMat3::ZERO
        } else {
            self.inertia.inverse()
        }
    }
}

/// Helper methods for inertia calculations.
pub trait InertiaTensorExt {
    fn for_solid_box(half_extents: DVec3, mass: f64) -> DMat3;
    fn for_solid_sphere(radius: f64, mass: f64) -> DMat3;
}

impl InertiaTensorExt for DMat3 {
    fn for_solid_box(half_extents: DVec3, mass: f64) -> DMat3 {
        crate::utils::math::inertia_box(half_extents, mass)
    }

    fn for_solid_sphere(radius: f64, mass: f64) -> DMat3 {
        crate::utils::math::inertia_sphere(radius, mass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_then_inverse_round_trips_points() {
        let parent = Transform::new(
            DVec3::new(1.0, 2.0, 3.0),
            DQuat::from_rotation_y(std::f64::consts::FRAC_PI_2),
        );
        let child = Transform::new(DVec3::new(0.5, 0.0, 0.0), DQuat::from_rotation_x(0.3));
        let world = parent.combine(&child);
        let local = DVec3::new(0.1, -0.2, 0.3);
        let p = world.transform_point(local);
        assert!((p - parent.transform_point(child.transform_point(local))).length() < 1e-12);
        assert!((world.inverse_transform_point(p) - local).length() < 1e-12);
    }

    #[test]
    fn infinite_mass_has_zero_inverses() {
        let props = MassProperties::infinite();
        assert_eq!(props.inverse_mass(), 0.0);
        assert_eq!(props.inverse_inertia(), DMat3::ZERO);
        let sphere = MassProperties::solid_sphere(0.5, 2.0);
        assert!((sphere.inverse_mass() - 0.5).abs() < 1e-12);
        assert!((sphere.inertia.x_axis.x - 0.2).abs() < 1e-12);
    }
}
