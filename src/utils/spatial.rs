use glam::DVec3;
use serde::{Deserialize, Serialize};

/// A 6D spatial vector combining angular and linear components.
/// In motion space, angular is velocity and linear is translation.
/// In force space, angular is torque (or moment) and linear is force.
///
/// Contact impulses are stored as force-space vectors expressed about the
/// world origin, so impulses from different events can simply be summed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialVec {
    pub ang: DVec3,
    pub lin: DVec3,
}

impl SpatialVec {
    pub const ZERO: Self = Self {
        ang: DVec3::ZERO,
        lin: DVec3::ZERO,
    };

    pub fn new(ang: DVec3, lin: DVec3) -> Self {
        Self { ang, lin }
    }

    /// Force-space vector of a pure force applied at `point`, taken about the origin.
    pub fn from_force_at(force: DVec3, point: DVec3) -> Self {
        Self {
            ang: point.cross(force),
            lin: force,
        }
    }

    pub fn dot(&self, other: &SpatialVec) -> f64 {
        self.ang.dot(other.ang) + self.lin.dot(other.lin)
    }

    /// Moment of this force-space vector about `point` instead of the origin.
    pub fn moment_about(&self, point: DVec3) -> DVec3 {
        self.ang - point.cross(self.lin)
    }

    pub fn is_finite(&self) -> bool {
        self.ang.is_finite() && self.lin.is_finite()
    }
}

impl std::ops::Add for SpatialVec {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            ang: self.ang + other.ang,
            lin: self.lin + other.lin,
        }
    }
}

impl std::ops::AddAssign for SpatialVec {
    fn add_assign(&mut self, other: Self) {
        self.ang += other.ang;
        self.lin += other.lin;
    }
}

impl std::ops::Sub for SpatialVec {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self {
            ang: self.ang - other.ang,
            lin: self.lin - other.lin,
        }
    }
}

impl std::ops::Neg for SpatialVec {
    type Output = Self;
    fn neg(self) -> Self {
        Self {
            ang: -self.ang,
            lin: -self.lin,
        }
    }
}

impl std::ops::Mul<f64> for SpatialVec {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self {
            ang: self.ang * rhs,
            lin: self.lin * rhs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moment_about_contact_point_vanishes_for_pure_force() {
        let point = DVec3::new(1.0, 2.0, -0.5);
        let impulse = SpatialVec::from_force_at(DVec3::new(0.0, 3.0, 0.0), point);
        assert!(impulse.moment_about(point).length() < 1e-12);
        assert!((impulse.moment_about(DVec3::ZERO) - impulse.ang).length() < 1e-12);
    }
}
