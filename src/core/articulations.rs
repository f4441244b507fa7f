use glam::{DMat3, DQuat, DVec3};
use log::warn;
use serde::{Deserialize, Serialize};

use super::{
    body::{CoordinateType, DynamicBody},
    types::Transform,
};
use crate::{
    dynamics::articulated::{LinkMotion, NewtonEuler},
    utils::{
        linalg::{MatrixN, VectorN},
        math::world_inertia,
    },
};

/// Type of joint connecting a link to its parent in reduced coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum JointType {
    /// 1-DOF rotation about `axis` (joint frame).
    Revolute { axis: DVec3 },
    /// 1-DOF translation along `axis` (joint frame).
    Prismatic { axis: DVec3 },
    /// 0-DOF rigid connection.
    Fixed,
}

impl JointType {
    /// Returns the number of degrees of freedom for this joint type.
    pub fn dofs(&self) -> usize {
        match self {
            JointType::Revolute { .. } | JointType::Prismatic { .. } => 1,
            JointType::Fixed => 0,
        }
    }

    /// Local transform across the joint for coordinate `q`.
    pub fn transform(&self, q: f64) -> Transform {
        match self {
            JointType::Revolute { axis } => Transform {
                position: DVec3::ZERO,
                rotation: DQuat::from_axis_angle(axis.normalize(), q),
            },
            JointType::Prismatic { axis } => Transform::from_position(axis.normalize() * q),
            JointType::Fixed => Transform::IDENTITY,
        }
    }

    pub fn axis(&self) -> Option<DVec3> {
        match self {
            JointType::Revolute { axis } | JointType::Prismatic { axis } => Some(axis.normalize()),
            JointType::Fixed => None,
        }
    }
}

/// Position limits of a single-DOF joint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointLimit {
    pub lower: f64,
    pub upper: f64,
    /// Restitution applied when the limit is hit.
    pub restitution: f64,
}

impl JointLimit {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self {
            lower,
            upper,
            restitution: 0.0,
        }
    }

    pub fn with_restitution(mut self, restitution: f64) -> Self {
        self.restitution = restitution;
        self
    }
}

/// A single node in the articulated body tree.
#[derive(Debug, Clone)]
pub struct Link {
    pub name: String,
    /// Index of the parent link. None if this link hangs from the fixed base.
    pub parent_idx: Option<usize>,
    /// The joint connecting this link to its parent.
    pub joint_type: JointType,
    /// The offset of the joint (q) indices in the multibody state vectors.
    pub q_offset: usize,
    /// Static transform from parent link frame to this link's joint frame (at q=0).
    pub parent_to_joint: Transform,
    pub mass: f64,
    /// Center of mass offset from the link frame.
    pub com_offset: DVec3,
    /// Rotational inertia tensor about the center of mass (link frame).
    pub inertia: DMat3,
    pub limit: Option<JointLimit>,
}

impl Link {
    pub fn new(name: &str, parent: Option<usize>, joint: JointType) -> Self {
        Self {
            name: name.into(),
            parent_idx: parent,
            joint_type: joint,
            q_offset: 0,
            parent_to_joint: Transform::default(),
            mass: 1.0,
            com_offset: DVec3::ZERO,
            inertia: DMat3::IDENTITY,
            limit: None,
        }
    }

    pub fn with_parent_offset(mut self, parent_to_joint: Transform) -> Self {
        self.parent_to_joint = parent_to_joint;
        self
    }

    pub fn with_mass(mut self, mass: f64, com_offset: DVec3, inertia: DMat3) -> Self {
        self.mass = mass;
        self.com_offset = com_offset;
        self.inertia = inertia;
        self
    }

    pub fn with_limit(mut self, limit: JointLimit) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A limited DOF that is reached within an interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitCrossing {
    pub link: usize,
    pub dof: usize,
    pub upper: bool,
    /// Fraction of the interval at which the limit is reached.
    pub t: f64,
    pub restitution: f64,
}

/// Fixed-base tree of links in reduced coordinates.
///
/// Links are ordered such that a parent always appears before its children.
#[derive(Debug, Clone)]
pub struct Multibody {
    pub base: Transform,
    pub links: Vec<Link>,
    pub total_dofs: usize,
    pub is_enabled: bool,
    q: VectorN,
    dq: VectorN,
    ddq: VectorN,
    tau: VectorN,
    world_transforms: Vec<Transform>,
    motion: Vec<LinkMotion>,
    mass_matrix: MatrixN,
}

impl Default for Multibody {
    fn default() -> Self {
        Self::new(Transform::IDENTITY)
    }
}

impl Multibody {
    pub fn new(base: Transform) -> Self {
        Self {
            base,
            links: Vec::new(),
            total_dofs: 0,
            is_enabled: true,
            q: VectorN::default(),
            dq: VectorN::default(),
            ddq: VectorN::default(),
            tau: VectorN::default(),
            world_transforms: Vec::new(),
            motion: Vec::new(),
            mass_matrix: MatrixN::default(),
        }
    }

    /// Adds a link and allocates its DOFs. The parent must already exist.
    pub fn add_link(&mut self, mut link: Link) -> usize {
        let idx = self.links.len();
        debug_assert!(link.parent_idx.map_or(true, |p| p < idx));
        link.q_offset = self.total_dofs;
        self.total_dofs += link.joint_type.dofs();
        self.links.push(link);

        for v in [&mut self.q, &mut self.dq, &mut self.ddq, &mut self.tau] {
            let mut values = std::mem::take(v).into_inner();
            values.resize(self.total_dofs, 0.0);
            *v = VectorN::from_vec(values);
        }
        self.update_kinematics();
        idx
    }

    pub fn q(&self) -> &VectorN {
        &self.q
    }

    pub fn dq(&self) -> &VectorN {
        &self.dq
    }

    pub fn set_q(&mut self, q: &[f64]) {
        self.q.copy_from_slice(q);
        self.update_kinematics();
    }

    pub fn set_dq(&mut self, dq: &[f64]) {
        self.dq.copy_from_slice(dq);
        self.update_motion();
    }

    pub fn world_transform(&self, link: usize) -> Transform {
        self.world_transforms
            .get(link)
            .copied()
            .unwrap_or(self.base)
    }

    /// World frame of the parent of `link` (the base for root links).
    pub fn parent_transform(&self, link: usize) -> Transform {
        self.links[link]
            .parent_idx
            .map(|p| self.world_transforms[p])
            .unwrap_or(self.base)
    }

    /// Joint axis of `link` in world coordinates.
    pub fn world_axis(&self, link: usize) -> Option<DVec3> {
        self.links[link]
            .joint_type
            .axis()
            .map(|axis| self.world_transforms[link].rotation * axis)
    }

    pub fn world_com(&self, link: usize) -> DVec3 {
        self.world_transforms[link].transform_point(self.links[link].com_offset)
    }

    pub fn world_link_inertia(&self, link: usize) -> DMat3 {
        world_inertia(self.world_transforms[link].rotation, self.links[link].inertia)
    }

    pub fn link_motion(&self, link: usize) -> LinkMotion {
        self.motion.get(link).copied().unwrap_or_default()
    }

    /// Updates world transforms and the mass matrix from `q`, then link motion.
    pub fn update_kinematics(&mut self) {
        self.world_transforms.clear();
        for i in 0..self.links.len() {
            let link = &self.links[i];
            let q = if link.joint_type.dofs() > 0 {
                self.q[link.q_offset]
            } else {
                0.0
            };
            let relative = link.parent_to_joint.combine(&link.joint_type.transform(q));
            let parent = link
                .parent_idx
                .map(|p| self.world_transforms[p])
                .unwrap_or(self.base);
            self.world_transforms.push(parent.combine(&relative));
        }
        self.mass_matrix = NewtonEuler::mass_matrix(self);
        self.update_motion();
    }

    fn update_motion(&mut self) {
        self.motion = NewtonEuler::forward_pass(self, &self.dq, &self.ddq, DVec3::ZERO);
    }

    /// Limit events for every limited DOF that sits on its limit at `q0` or
    /// crosses it on the way to `q1`.
    pub fn find_limit_events(&self, q0: &VectorN, q1: &VectorN, tolerance: f64) -> Vec<LimitCrossing> {
        let mut crossings = Vec::new();
        for (link_idx, link) in self.links.iter().enumerate() {
            let Some(limit) = link.limit else {
                continue;
            };
            if link.joint_type.dofs() == 0 {
                continue;
            }
            let dof = link.q_offset;
            let (start, end) = (q0[dof], q1[dof]);
            for upper in [true, false] {
                // Signed distance to the limit, positive inside the range.
                let gap = |q: f64| if upper { limit.upper - q } else { q - limit.lower };
                let (g0, g1) = (gap(start), gap(end));
                if g1 > tolerance {
                    continue;
                }
                let t = if g0 <= tolerance {
                    0.0
                } else {
                    (g0 / (g0 - g1)).clamp(0.0, 1.0)
                };
                crossings.push(LimitCrossing {
                    link: link_idx,
                    dof,
                    upper,
                    t,
                    restitution: limit.restitution,
                });
            }
        }
        crossings
    }
}

impl DynamicBody for Multibody {
    fn num_generalized_coordinates(&self, _kind: CoordinateType) -> usize {
        self.total_dofs
    }

    fn generalized_coordinates(&self, _kind: CoordinateType) -> VectorN {
        self.q.clone()
    }

    fn set_generalized_coordinates(&mut self, _kind: CoordinateType, q: &VectorN) {
        self.set_q(q);
    }

    fn generalized_velocity(&self, _kind: CoordinateType) -> VectorN {
        self.dq.clone()
    }

    fn set_generalized_velocity(&mut self, _kind: CoordinateType, qd: &VectorN) {
        self.set_dq(qd);
    }

    fn calc_fwd_dyn(&mut self, gravity: DVec3) {
        if !self.is_dynamic() {
            return;
        }
        self.ddq = match NewtonEuler::forward_dynamics(self, gravity) {
            Some(ddq) => ddq,
            None => {
                warn!("singular mass matrix in articulated body; accelerations zeroed");
                VectorN::zeros(self.total_dofs)
            }
        };
        self.update_motion();
    }

    fn generalized_acceleration(&self) -> VectorN {
        self.ddq.clone()
    }

    fn generalized_force(&self) -> VectorN {
        self.tau.clone()
    }

    fn set_generalized_force(&mut self, force: &VectorN) {
        self.tau.copy_from_slice(force);
    }

    fn add_generalized_force(&mut self, force: &VectorN) {
        self.tau.axpy(1.0, force);
    }

    fn reset_accumulators(&mut self) {
        self.tau.fill(0.0);
    }

    fn generalized_inertia(&self) -> MatrixN {
        self.mass_matrix.clone()
    }

    fn solve_generalized_inertia(&self, rhs: &VectorN) -> VectorN {
        if !self.is_dynamic() {
            return VectorN::zeros(self.total_dofs);
        }
        self.mass_matrix
            .solve(rhs)
            .unwrap_or_else(|| VectorN::zeros(self.total_dofs))
    }

    fn convert_to_generalized_force(
        &self,
        link: usize,
        point: DVec3,
        force: DVec3,
        torque: DVec3,
    ) -> VectorN {
        let mut tau = VectorN::zeros(self.total_dofs);
        let mut current = Some(link);
        while let Some(idx) = current {
            let joint = &self.links[idx];
            let origin = self.world_transforms[idx].position;
            if let Some(axis) = self.world_axis(idx) {
                tau[joint.q_offset] = match joint.joint_type {
                    JointType::Revolute { .. } => axis.dot((point - origin).cross(force) + torque),
                    JointType::Prismatic { .. } => axis.dot(force),
                    JointType::Fixed => 0.0,
                };
            }
            current = joint.parent_idx;
        }
        tau
    }

    fn link_pose(&self, link: usize) -> Transform {
        self.world_transform(link)
    }

    fn point_velocity(&self, link: usize, point: DVec3) -> DVec3 {
        let motion = self.link_motion(link);
        motion.com_velocity + motion.omega.cross(point - self.world_com(link))
    }

    fn point_acceleration(&self, link: usize, point: DVec3) -> DVec3 {
        let motion = self.link_motion(link);
        let r = point - self.world_com(link);
        motion.com_acceleration + motion.alpha.cross(r) + motion.omega.cross(motion.omega.cross(r))
    }

    fn angular_velocity(&self, link: usize) -> DVec3 {
        self.link_motion(link).omega
    }

    fn angular_acceleration(&self, link: usize) -> DVec3 {
        self.link_motion(link).alpha
    }

    fn kinetic_energy(&self) -> f64 {
        0.5 * self.dq.dot(&self.mass_matrix.mul_vec(&self.dq))
    }

    fn num_links(&self) -> usize {
        self.links.len()
    }

    fn is_dynamic(&self) -> bool {
        self.is_enabled && self.total_dofs > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pendulum() -> Multibody {
        let mut mb = Multibody::new(Transform::from_position(DVec3::new(0.0, 2.0, 0.0)));
        mb.add_link(
            Link::new("arm", None, JointType::Revolute { axis: DVec3::Z })
                .with_mass(2.0, DVec3::new(1.0, 0.0, 0.0), DMat3::from_diagonal(DVec3::splat(0.01)))
                .with_limit(JointLimit::new(-0.5, 0.5)),
        );
        mb
    }

    #[test]
    fn kinematics_places_com_on_rotated_arm() {
        let mut mb = pendulum();
        mb.set_q(&[std::f64::consts::FRAC_PI_2]);
        let com = mb.world_com(0);
        assert!((com - DVec3::new(0.0, 3.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn upper_limit_crossing_is_interpolated() {
        let mb = pendulum();
        let q0 = VectorN::from_slice(&[0.0]);
        let q1 = VectorN::from_slice(&[1.0]);
        let crossings = mb.find_limit_events(&q0, &q1, 1e-9);
        assert_eq!(crossings.len(), 1);
        assert!(crossings[0].upper);
        assert!((crossings[0].t - 0.5).abs() < 1e-12);
    }

    #[test]
    fn dof_resting_on_limit_reports_time_zero() {
        let mb = pendulum();
        let q0 = VectorN::from_slice(&[-0.5]);
        let q1 = VectorN::from_slice(&[-0.6]);
        let crossings = mb.find_limit_events(&q0, &q1, 1e-9);
        assert_eq!(crossings.len(), 1);
        assert!(!crossings[0].upper);
        assert_eq!(crossings[0].t, 0.0);
    }

    #[test]
    fn generalized_force_of_tip_force_is_moment_about_joint() {
        let mb = pendulum();
        let tip = DVec3::new(2.0, 2.0, 0.0);
        let tau = mb.convert_to_generalized_force(0, tip, DVec3::new(0.0, 3.0, 0.0), DVec3::ZERO);
        assert!((tau[0] - 6.0).abs() < 1e-12);
    }
}
