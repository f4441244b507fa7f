use glam::{DMat3, DQuat, DVec3};

use super::{
    body::{CoordinateType, DynamicBody},
    types::{MassProperties, Transform, Velocity},
};
use crate::utils::{
    linalg::{MatrixN, VectorN},
    math::{angular_velocity_from_derivative, quat_derivative, world_inertia},
};

/// Free-floating rigid body with six degrees of freedom.
///
/// Generalized coordinates are `[x, y, z, qx, qy, qz, qw]` in the Euler
/// representation and `[x, y, z, rx, ry, rz]` (scaled rotation axis) in the
/// spatial one. Generalized velocities and forces are `[linear, angular]` in
/// world coordinates, about the center of mass.
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub transform: Transform,
    pub velocity: Velocity,
    pub mass_properties: MassProperties,
    pub is_static: bool,
    pub is_enabled: bool,
    force: DVec3,
    torque: DVec3,
    linear_acceleration: DVec3,
    angular_acceleration: DVec3,
    inverse_mass: f64,
    inverse_inertia: DMat3,
}

impl Default for RigidBody {
    fn default() -> Self {
        let mut body = Self {
            transform: Transform::default(),
            velocity: Velocity::default(),
            mass_properties: MassProperties::default(),
            is_static: false,
            is_enabled: true,
            force: DVec3::ZERO,
            torque: DVec3::ZERO,
            linear_acceleration: DVec3::ZERO,
            angular_acceleration: DVec3::ZERO,
            inverse_mass: 1.0,
            inverse_inertia: DMat3::IDENTITY,
        };
        body.recompute_inverses();
        body
    }
}

impl RigidBody {
    pub fn new(transform: Transform, mass_properties: MassProperties) -> Self {
        let mut body = Self {
            transform,
            mass_properties,
            ..Self::default()
        };
        body.recompute_inverses();
        body
    }

    /// Immovable body, e.g. the ground.
    pub fn fixed(transform: Transform) -> Self {
        let mut body = Self::new(transform, MassProperties::infinite());
        body.is_static = true;
        body
    }

    pub fn with_velocity(mut self, linear: DVec3, angular: DVec3) -> Self {
        self.set_velocity(linear, angular);
        self
    }

    pub fn set_velocity(&mut self, linear: DVec3, angular: DVec3) {
        self.velocity.linear = linear;
        self.velocity.angular = angular;
    }

    pub fn apply_force(&mut self, force: DVec3) {
        if self.is_static {
            return;
        }
        self.force += force;
    }

    pub fn apply_force_at_point(&mut self, force: DVec3, point: DVec3) {
        if self.is_static {
            return;
        }
        self.force += force;
        self.torque += (point - self.transform.position).cross(force);
    }

    pub fn apply_torque(&mut self, torque: DVec3) {
        if self.is_static {
            return;
        }
        self.torque += torque;
    }

    pub fn apply_impulse(&mut self, impulse: DVec3, position: DVec3) {
        if self.is_static {
            return;
        }
        self.velocity.linear += impulse * self.inverse_mass;
        let torque = (position - self.transform.position).cross(impulse);
        self.velocity.angular += self.world_inverse_inertia() * torque;
    }

    pub fn set_mass_properties(&mut self, props: MassProperties) {
        self.mass_properties = props;
        self.recompute_inverses();
    }

    pub fn inverse_mass(&self) -> f64 {
        if self.is_static {
            0.0
        } else {
            self.inverse_mass
        }
    }

    pub fn world_inertia(&self) -> DMat3 {
        world_inertia(self.transform.rotation, self.mass_properties.inertia)
    }

    pub fn world_inverse_inertia(&self) -> DMat3 {
        if self.is_static {
            DMat3::ZERO
        } else {
            world_inertia(self.transform.rotation, self.inverse_inertia)
        }
    }

    pub fn linear_acceleration(&self) -> DVec3 {
        self.linear_acceleration
    }

    fn recompute_inverses(&mut self) {
        self.inverse_mass = self.mass_properties.inverse_mass();
        self.inverse_inertia = self.mass_properties.inverse_inertia();
    }

    fn lever(&self, point: DVec3) -> DVec3 {
        point - self.transform.position
    }
}

fn vec3_at(v: &VectorN, offset: usize) -> DVec3 {
    DVec3::new(v[offset], v[offset + 1], v[offset + 2])
}

impl DynamicBody for RigidBody {
    fn num_generalized_coordinates(&self, kind: CoordinateType) -> usize {
        match kind {
            CoordinateType::Euler => 7,
            CoordinateType::Spatial => 6,
        }
    }

    fn generalized_coordinates(&self, kind: CoordinateType) -> VectorN {
        let p = self.transform.position;
        let q = self.transform.rotation;
        match kind {
            CoordinateType::Euler => VectorN::from_vec(vec![p.x, p.y, p.z, q.x, q.y, q.z, q.w]),
            CoordinateType::Spatial => {
                let r = q.to_scaled_axis();
                VectorN::from_vec(vec![p.x, p.y, p.z, r.x, r.y, r.z])
            }
        }
    }

    fn set_generalized_coordinates(&mut self, kind: CoordinateType, q: &VectorN) {
        self.transform.position = vec3_at(q, 0);
        self.transform.rotation = match kind {
            CoordinateType::Euler => DQuat::from_xyzw(q[3], q[4], q[5], q[6]).normalize(),
            CoordinateType::Spatial => DQuat::from_scaled_axis(vec3_at(q, 3)),
        };
    }

    fn generalized_velocity(&self, kind: CoordinateType) -> VectorN {
        let v = self.velocity.linear;
        let w = self.velocity.angular;
        match kind {
            CoordinateType::Spatial => VectorN::from_vec(vec![v.x, v.y, v.z, w.x, w.y, w.z]),
            CoordinateType::Euler => {
                let qd = quat_derivative(self.transform.rotation, w);
                VectorN::from_vec(vec![v.x, v.y, v.z, qd.x, qd.y, qd.z, qd.w])
            }
        }
    }

    fn set_generalized_velocity(&mut self, kind: CoordinateType, qd: &VectorN) {
        if self.is_static {
            return;
        }
        self.velocity.linear = vec3_at(qd, 0);
        self.velocity.angular = match kind {
            CoordinateType::Spatial => vec3_at(qd, 3),
            CoordinateType::Euler => angular_velocity_from_derivative(
                self.transform.rotation,
                DQuat::from_xyzw(qd[3], qd[4], qd[5], qd[6]),
            ),
        };
    }

    fn calc_fwd_dyn(&mut self, gravity: DVec3) {
        if !self.is_dynamic() {
            self.linear_acceleration = DVec3::ZERO;
            self.angular_acceleration = DVec3::ZERO;
            return;
        }
        self.linear_acceleration = self.force * self.inverse_mass + gravity;
        let inertia = self.world_inertia();
        let omega = self.velocity.angular;
        let gyroscopic = omega.cross(inertia * omega);
        self.angular_acceleration = self.world_inverse_inertia() * (self.torque - gyroscopic);
    }

    fn generalized_acceleration(&self) -> VectorN {
        let a = self.linear_acceleration;
        let alpha = self.angular_acceleration;
        VectorN::from_vec(vec![a.x, a.y, a.z, alpha.x, alpha.y, alpha.z])
    }

    fn generalized_force(&self) -> VectorN {
        let f = self.force;
        let t = self.torque;
        VectorN::from_vec(vec![f.x, f.y, f.z, t.x, t.y, t.z])
    }

    fn set_generalized_force(&mut self, force: &VectorN) {
        self.force = vec3_at(force, 0);
        self.torque = vec3_at(force, 3);
    }

    fn add_generalized_force(&mut self, force: &VectorN) {
        if self.is_static {
            return;
        }
        self.force += vec3_at(force, 0);
        self.torque += vec3_at(force, 3);
    }

    fn reset_accumulators(&mut self) {
        self.force = DVec3::ZERO;
        self.torque = DVec3::ZERO;
    }

    fn generalized_inertia(&self) -> MatrixN {
        let mut m = MatrixN::zeros(6, 6);
        if self.is_static {
            return m;
        }
        let inertia = self.world_inertia();
        for i in 0..3 {
            m[(i, i)] = self.mass_properties.mass;
            for j in 0..3 {
                m[(3 + i, 3 + j)] = inertia.col(j)[i];
            }
        }
        m
    }

    fn solve_generalized_inertia(&self, rhs: &VectorN) -> VectorN {
        if !self.is_dynamic() {
            return VectorN::zeros(6);
        }
        let lin = vec3_at(rhs, 0) * self.inverse_mass;
        let ang = self.world_inverse_inertia() * vec3_at(rhs, 3);
        VectorN::from_vec(vec![lin.x, lin.y, lin.z, ang.x, ang.y, ang.z])
    }

    fn convert_to_generalized_force(
        &self,
        _link: usize,
        point: DVec3,
        force: DVec3,
        torque: DVec3,
    ) -> VectorN {
        let moment = self.lever(point).cross(force) + torque;
        VectorN::from_vec(vec![force.x, force.y, force.z, moment.x, moment.y, moment.z])
    }

    fn link_pose(&self, _link: usize) -> Transform {
        self.transform
    }

    fn point_velocity(&self, _link: usize, point: DVec3) -> DVec3 {
        self.velocity.linear + self.velocity.angular.cross(self.lever(point))
    }

    fn point_acceleration(&self, _link: usize, point: DVec3) -> DVec3 {
        let r = self.lever(point);
        let omega = self.velocity.angular;
        self.linear_acceleration + self.angular_acceleration.cross(r) + omega.cross(omega.cross(r))
    }

    fn angular_velocity(&self, _link: usize) -> DVec3 {
        self.velocity.angular
    }

    fn angular_acceleration(&self, _link: usize) -> DVec3 {
        self.angular_acceleration
    }

    fn kinetic_energy(&self) -> f64 {
        if self.is_static {
            return 0.0;
        }
        let v = self.velocity.linear;
        let w = self.velocity.angular;
        0.5 * self.mass_properties.mass * v.length_squared() + 0.5 * w.dot(self.world_inertia() * w)
    }

    fn num_links(&self) -> usize {
        1
    }

    fn is_dynamic(&self) -> bool {
        !self.is_static && self.is_enabled
    }
}
