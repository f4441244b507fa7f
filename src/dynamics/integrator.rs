use crate::{
    core::body::{BodyId, BodySet, CoordinateType},
    utils::linalg::VectorN,
};

/// Start state and swept path of one body over an integrated interval.
#[derive(Debug, Clone, PartialEq)]
pub struct PathState {
    pub id: BodyId,
    /// Euler coordinates at the start of the interval.
    pub coordinates: VectorN,
    /// Spatial velocity at the start of the interval.
    pub velocity: VectorN,
    /// Spatial acceleration used for the interval.
    pub acceleration: VectorN,
    /// Euler coordinate rate of the updated velocity.
    pub rate: VectorN,
    /// Spatial velocity at the end of the interval.
    pub end_velocity: VectorN,
}

/// Result of [`Integrator::integrate`]: enough to place every body anywhere
/// along the interval.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegratedPath {
    pub span: f64,
    pub states: Vec<PathState>,
}

impl IntegratedPath {
    pub fn get(&self, id: BodyId) -> Option<&PathState> {
        self.states.iter().find(|state| state.id == id)
    }

    /// Moves every body to elapsed time `h` along the path: positions on the
    /// swept line, velocities `v0 + a h`.
    pub fn place(&self, bodies: &mut BodySet, h: f64) {
        for state in &self.states {
            let Ok(dynamics) = bodies.dynamics_mut(state.id) else {
                continue;
            };
            let mut coordinates = state.coordinates.clone();
            coordinates.axpy(h, &state.rate);
            dynamics.set_generalized_coordinates(CoordinateType::Euler, &coordinates);
            let mut velocity = state.velocity.clone();
            velocity.axpy(h, &state.acceleration);
            dynamics.set_generalized_velocity(CoordinateType::Spatial, &velocity);
        }
    }

    /// Sets the end-of-interval velocities without moving the bodies.
    pub fn apply_end_velocities(&self, bodies: &mut BodySet) {
        for state in &self.states {
            if let Ok(dynamics) = bodies.dynamics_mut(state.id) {
                dynamics.set_generalized_velocity(CoordinateType::Spatial, &state.end_velocity);
            }
        }
    }

    /// Euler coordinates at the start and end of the interval for `id`.
    pub fn endpoints(&self, id: BodyId) -> Option<(VectorN, VectorN)> {
        let state = self.get(id)?;
        let mut end = state.coordinates.clone();
        end.axpy(self.span, &state.rate);
        Some((state.coordinates.clone(), end))
    }
}

/// Semi-implicit Euler: velocities are updated from the current accelerations
/// first, then positions follow the updated velocities.
#[derive(Debug, Clone, Copy, Default)]
pub struct Integrator;

impl Integrator {
    pub fn new() -> Self {
        Self
    }

    /// Advances every dynamic body by `span`. Accelerations must be current.
    pub fn integrate(&self, bodies: &mut BodySet, span: f64) -> IntegratedPath {
        let mut states = Vec::new();
        for (id, body) in bodies.iter_mut() {
            let dynamics = body.dynamics_mut();
            if !dynamics.is_dynamic() {
                continue;
            }
            let coordinates = dynamics.generalized_coordinates(CoordinateType::Euler);
            let velocity = dynamics.generalized_velocity(CoordinateType::Spatial);
            let acceleration = dynamics.generalized_acceleration();

            let mut end_velocity = velocity.clone();
            end_velocity.axpy(span, &acceleration);
            dynamics.set_generalized_velocity(CoordinateType::Spatial, &end_velocity);
            let rate = dynamics.generalized_velocity(CoordinateType::Euler);

            let mut end = coordinates.clone();
            end.axpy(span, &rate);
            dynamics.set_generalized_coordinates(CoordinateType::Euler, &end);

            states.push(PathState {
                id,
                coordinates,
                velocity,
                acceleration,
                rate,
                end_velocity,
            });
        }
        IntegratedPath { span, states }
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::*;
    use crate::core::{
        body::LinkRef,
        rigidbody::RigidBody,
        types::{MassProperties, Transform},
    };

    #[test]
    fn velocity_is_updated_before_position() {
        let mut bodies = BodySet::new();
        let id = bodies.insert_rigid(RigidBody::new(
            Transform::from_position(DVec3::new(0.0, 1.0, 0.0)),
            MassProperties::solid_sphere(0.5, 1.0),
        ));
        bodies.calc_fwd_dyn(DVec3::new(0.0, -10.0, 0.0));
        let path = Integrator::new().integrate(&mut bodies, 0.1);
        let link = LinkRef::root(id);
        // Symplectic Euler: y = 1 + (0 - 10 * 0.1) * 0.1.
        let pose = bodies.link_pose(link).unwrap();
        assert!((pose.position.y - 0.9).abs() < 1e-12);

        path.place(&mut bodies, 0.05);
        let pose = bodies.link_pose(link).unwrap();
        assert!((pose.position.y - 0.95).abs() < 1e-12);
        assert!((bodies.point_velocity(link, pose.position).y + 0.5).abs() < 1e-12);
    }

    #[test]
    fn static_bodies_are_not_part_of_the_path() {
        let mut bodies = BodySet::new();
        bodies.insert_rigid(RigidBody::fixed(Transform::IDENTITY));
        let path = Integrator::new().integrate(&mut bodies, 0.1);
        assert!(path.states.is_empty());
    }
}
