use glam::DVec3;

use crate::{
    core::body::{BodyId, BodySet, CoordinateType, SimBody},
    utils::linalg::VectorN,
};

/// Trait describing an external force generator applied to bodies at the
/// start of every step. Forces are accumulated as generalized forces.
pub trait ForceGenerator: Send + Sync {
    fn apply(&self, body: &mut SimBody);
}

/// Linear (Stokes) drag: `-b v` at the center of mass of every link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StokesDrag {
    pub linear: f64,
    /// Optional drag on angular velocity; zero in the classic model.
    pub angular: f64,
}

impl StokesDrag {
    pub fn new(linear: f64) -> Self {
        Self { linear, angular: 0.0 }
    }

    pub fn with_angular(mut self, angular: f64) -> Self {
        self.angular = angular;
        self
    }
}

impl ForceGenerator for StokesDrag {
    fn apply(&self, body: &mut SimBody) {
        apply_per_link(body, |velocity, omega| {
            (velocity * -self.linear, omega * -self.angular)
        });
    }
}

/// Quadratic drag resisting the direction of motion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragForce {
    pub drag_coefficient: f64,
}

impl DragForce {
    pub fn new(drag_coefficient: f64) -> Self {
        Self { drag_coefficient }
    }
}

impl ForceGenerator for DragForce {
    fn apply(&self, body: &mut SimBody) {
        apply_per_link(body, |velocity, _| {
            let speed = velocity.length();
            if speed < 1e-12 {
                return (DVec3::ZERO, DVec3::ZERO);
            }
            (-velocity * speed * self.drag_coefficient, DVec3::ZERO)
        });
    }
}

/// Evaluates `wrench(v_com, ω)` for every link and accumulates the resulting
/// force and torque, applied at the link's center of mass.
fn apply_per_link(body: &mut SimBody, wrench: impl Fn(DVec3, DVec3) -> (DVec3, DVec3)) {
    if !body.dynamics().is_dynamic() {
        return;
    }
    let links: Vec<(usize, DVec3)> = match body {
        SimBody::Rigid(rigid) => vec![(0, rigid.transform.position)],
        SimBody::Articulated(mechanism) => (0..mechanism.links.len())
            .map(|link| (link, mechanism.world_com(link)))
            .collect(),
    };
    let dynamics = body.dynamics_mut();
    let mut total = VectorN::zeros(dynamics.num_generalized_coordinates(CoordinateType::Spatial));
    for (link, com) in links {
        let velocity = dynamics.point_velocity(link, com);
        let omega = dynamics.angular_velocity(link);
        let (force, torque) = wrench(velocity, omega);
        total.axpy(1.0, &dynamics.convert_to_generalized_force(link, com, force, torque));
    }
    dynamics.add_generalized_force(&total);
}

/// Collection of forces applied at the start of every step, either to all
/// bodies or to a single one.
#[derive(Default)]
pub struct ForceRegistry {
    forces: Vec<Box<dyn ForceGenerator>>,
    targeted: Vec<(BodyId, Box<dyn ForceGenerator>)>,
}

impl ForceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_force<F: ForceGenerator + 'static>(&mut self, force: F) {
        self.forces.push(Box::new(force));
    }

    pub fn add_force_to<F: ForceGenerator + 'static>(&mut self, id: BodyId, force: F) {
        self.targeted.push((id, Box::new(force)));
    }

    pub fn len(&self) -> usize {
        self.forces.len() + self.targeted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn apply_all(&self, bodies: &mut BodySet) {
        for force in &self.forces {
            for (_, body) in bodies.iter_mut() {
                force.apply(body);
            }
        }
        for (id, force) in &self.targeted {
            if let Some(body) = bodies.get_mut(*id) {
                force.apply(body);
            }
        }
    }
}
