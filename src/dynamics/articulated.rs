//! Recursive Newton–Euler dynamics for fixed-base mechanisms.
//!
//! All quantities are expressed in world coordinates. Gravity enters as an
//! upward acceleration of the base, so link forces are simply `m * a`.

use glam::DVec3;

use crate::{
    core::articulations::{JointType, Multibody},
    utils::linalg::{MatrixN, VectorN},
};

/// Velocity and acceleration state of one link.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinkMotion {
    pub omega: DVec3,
    pub alpha: DVec3,
    pub com_velocity: DVec3,
    pub com_acceleration: DVec3,
}

pub struct NewtonEuler;

impl NewtonEuler {
    /// Outward pass: link velocities and accelerations for the given joint
    /// rates, with the base accelerating at `base_acceleration`.
    pub fn forward_pass(
        mb: &Multibody,
        qd: &[f64],
        qdd: &[f64],
        base_acceleration: DVec3,
    ) -> Vec<LinkMotion> {
        let mut motion: Vec<LinkMotion> = Vec::with_capacity(mb.links.len());
        for (i, link) in mb.links.iter().enumerate() {
            let (parent, parent_com) = match link.parent_idx {
                Some(p) => (motion[p], mb.world_com(p)),
                None => (
                    LinkMotion {
                        com_acceleration: base_acceleration,
                        ..LinkMotion::default()
                    },
                    mb.base.position,
                ),
            };
            let origin = mb.world_transform(i).position;
            let r = origin - parent_com;
            let mut origin_velocity = parent.com_velocity + parent.omega.cross(r);
            let mut origin_acceleration = parent.com_acceleration
                + parent.alpha.cross(r)
                + parent.omega.cross(parent.omega.cross(r));
            let mut omega = parent.omega;
            let mut alpha = parent.alpha;

            if let Some(axis) = mb.world_axis(i) {
                let rate = qd[link.q_offset];
                let accel = qdd[link.q_offset];
                match link.joint_type {
                    JointType::Revolute { .. } => {
                        omega += axis * rate;
                        alpha += parent.omega.cross(axis * rate) + axis * accel;
                    }
                    JointType::Prismatic { .. } => {
                        origin_velocity += axis * rate;
                        origin_acceleration += parent.omega.cross(axis * rate) * 2.0 + axis * accel;
                    }
                    JointType::Fixed => {}
                }
            }

            let d = mb.world_com(i) - origin;
            motion.push(LinkMotion {
                omega,
                alpha,
                com_velocity: origin_velocity + omega.cross(d),
                com_acceleration: origin_acceleration + alpha.cross(d) + omega.cross(omega.cross(d)),
            });
        }
        motion
    }

    /// Joint forces needed to produce `qdd` at velocity `qd` under `gravity`.
    pub fn inverse_dynamics(mb: &Multibody, qd: &[f64], qdd: &[f64], gravity: DVec3) -> VectorN {
        let n = mb.links.len();
        let motion = Self::forward_pass(mb, qd, qdd, -gravity);
        let mut force_acc = vec![DVec3::ZERO; n];
        let mut moment_acc = vec![DVec3::ZERO; n];
        let mut tau = VectorN::zeros(mb.total_dofs);

        for i in (0..n).rev() {
            let link = &mb.links[i];
            let m = motion[i];
            let inertia = mb.world_link_inertia(i);
            let origin = mb.world_transform(i).position;
            let d = mb.world_com(i) - origin;

            let f = m.com_acceleration * link.mass;
            let n_com = inertia * m.alpha + m.omega.cross(inertia * m.omega);
            let force = f + force_acc[i];
            let moment = n_com + d.cross(f) + moment_acc[i];

            if let Some(axis) = mb.world_axis(i) {
                tau[link.q_offset] = match link.joint_type {
                    JointType::Revolute { .. } => axis.dot(moment),
                    JointType::Prismatic { .. } => axis.dot(force),
                    JointType::Fixed => 0.0,
                };
            }

            if let Some(p) = link.parent_idx {
                let parent_origin = mb.world_transform(p).position;
                force_acc[p] += force;
                moment_acc[p] += moment + (origin - parent_origin).cross(force);
            }
        }
        tau
    }

    /// Joint-space inertia, one unit-acceleration column at a time.
    pub fn mass_matrix(mb: &Multibody) -> MatrixN {
        let n = mb.total_dofs;
        let zero = vec![0.0; n];
        let columns: Vec<VectorN> = (0..n)
            .map(|k| {
                let unit = VectorN::basis(n, k);
                Self::inverse_dynamics(mb, &zero, &unit, DVec3::ZERO)
            })
            .collect();
        MatrixN::from_columns(&columns)
    }

    /// Coriolis, centrifugal and gravity forces at the current state.
    pub fn bias_forces(mb: &Multibody, gravity: DVec3) -> VectorN {
        let zero = vec![0.0; mb.total_dofs];
        Self::inverse_dynamics(mb, mb.dq(), &zero, gravity)
    }

    /// Solves `M qdd = tau - bias`; `None` if the mass matrix is singular.
    pub fn forward_dynamics(mb: &Multibody, gravity: DVec3) -> Option<VectorN> {
        use crate::core::body::DynamicBody;

        let rhs = mb.generalized_force().sub(&Self::bias_forces(mb, gravity));
        mb.generalized_inertia().solve(&rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        articulations::Link,
        body::{CoordinateType, DynamicBody},
        types::Transform,
    };
    use glam::DMat3;

    fn point_mass_pendulum(length: f64, mass: f64) -> Multibody {
        let mut mb = Multibody::new(Transform::IDENTITY);
        mb.add_link(
            Link::new("bob", None, JointType::Revolute { axis: DVec3::Z })
                .with_mass(mass, DVec3::new(length, 0.0, 0.0), DMat3::ZERO),
        );
        mb
    }

    #[test]
    fn point_mass_inertia_is_m_l_squared() {
        let mb = point_mass_pendulum(2.0, 3.0);
        let m = NewtonEuler::mass_matrix(&mb);
        assert!((m[(0, 0)] - 12.0).abs() < 1e-12);
    }

    #[test]
    fn horizontal_pendulum_falls_at_g_over_l() {
        let mut mb = point_mass_pendulum(2.0, 3.0);
        mb.calc_fwd_dyn(DVec3::new(0.0, -9.81, 0.0));
        let qdd = mb.generalized_acceleration();
        // Gravity pulls the horizontal arm clockwise about +Z.
        assert!((qdd[0] + 9.81 / 2.0).abs() < 1e-9);
    }

    #[test]
    fn spinning_point_mass_needs_no_joint_torque() {
        let mut mb = point_mass_pendulum(1.0, 1.0);
        mb.set_generalized_velocity(CoordinateType::Spatial, &VectorN::from_slice(&[2.0]));
        let bias = NewtonEuler::bias_forces(&mb, DVec3::ZERO);
        assert!(bias[0].abs() < 1e-12);
        assert!((mb.kinetic_energy() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn two_link_mass_matrix_is_symmetric() {
        let mut mb = Multibody::new(Transform::IDENTITY);
        let root = mb.add_link(
            Link::new("upper", None, JointType::Revolute { axis: DVec3::Z })
                .with_mass(1.0, DVec3::new(0.5, 0.0, 0.0), DMat3::from_diagonal(DVec3::splat(0.1))),
        );
        mb.add_link(
            Link::new("slider", Some(root), JointType::Prismatic { axis: DVec3::X })
                .with_parent_offset(Transform::from_position(DVec3::new(1.0, 0.0, 0.0)))
                .with_mass(0.5, DVec3::new(0.2, 0.0, 0.0), DMat3::from_diagonal(DVec3::splat(0.05))),
        );
        mb.set_q(&[0.3, 0.2]);
        let m = NewtonEuler::mass_matrix(&mb);
        assert!((m[(0, 1)] - m[(1, 0)]).abs() < 1e-12);
        assert!(m[(0, 0)] > 0.0 && m[(1, 1)] > 0.0);
    }
}
