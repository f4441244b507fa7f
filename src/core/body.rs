//! The dynamics-provider contract and the simulator-owned body collection.

use std::collections::BTreeMap;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use super::{articulations::Multibody, rigidbody::RigidBody, types::Transform};
use crate::{
    error::SimulationError,
    utils::{
        allocator::{Arena, Handle},
        linalg::{MatrixN, VectorN},
    },
};

/// Handle of a top-level body: a free rigid body or an articulated mechanism.
pub type BodyId = Handle<SimBody>;

/// A single rigid link: link 0 of a free body, or one link of a mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkRef {
    pub body: BodyId,
    pub link: usize,
}

impl LinkRef {
    pub fn new(body: BodyId, link: usize) -> Self {
        Self { body, link }
    }

    /// The only link of a free rigid body.
    pub fn root(body: BodyId) -> Self {
        Self { body, link: 0 }
    }
}

/// Representation of generalized coordinates and velocities.
///
/// `Euler` is integration friendly (unit quaternions for free orientations, so
/// `q += qd * h` is meaningful); `Spatial` uses linear and angular velocity and
/// is the representation forces, inertia and impulses are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoordinateType {
    Euler,
    Spatial,
}

/// Everything the event pipeline needs from a body or mechanism.
pub trait DynamicBody {
    fn num_generalized_coordinates(&self, kind: CoordinateType) -> usize;
    fn generalized_coordinates(&self, kind: CoordinateType) -> VectorN;
    fn set_generalized_coordinates(&mut self, kind: CoordinateType, q: &VectorN);

    fn generalized_velocity(&self, kind: CoordinateType) -> VectorN;
    fn set_generalized_velocity(&mut self, kind: CoordinateType, qd: &VectorN);

    /// Computes accelerations from the current state and accumulated forces.
    fn calc_fwd_dyn(&mut self, gravity: DVec3);
    /// Acceleration from the last [`DynamicBody::calc_fwd_dyn`], spatial representation.
    fn generalized_acceleration(&self) -> VectorN;

    fn generalized_force(&self) -> VectorN;
    fn set_generalized_force(&mut self, force: &VectorN);
    fn add_generalized_force(&mut self, force: &VectorN);
    fn reset_accumulators(&mut self);

    fn generalized_inertia(&self) -> MatrixN;
    /// `M⁻¹ rhs`; zero for bodies that cannot move.
    fn solve_generalized_inertia(&self, rhs: &VectorN) -> VectorN;

    /// Generalized force produced by `force` and `torque` acting at the world
    /// point `point` on `link`.
    fn convert_to_generalized_force(
        &self,
        link: usize,
        point: DVec3,
        force: DVec3,
        torque: DVec3,
    ) -> VectorN;

    /// Applies a generalized impulse directly to the spatial velocity.
    fn apply_generalized_impulse(&mut self, impulse: &VectorN) {
        let delta = self.solve_generalized_inertia(impulse);
        let mut qd = self.generalized_velocity(CoordinateType::Spatial);
        qd.axpy(1.0, &delta);
        self.set_generalized_velocity(CoordinateType::Spatial, &qd);
    }

    fn link_pose(&self, link: usize) -> Transform;
    fn point_velocity(&self, link: usize, point: DVec3) -> DVec3;
    fn point_acceleration(&self, link: usize, point: DVec3) -> DVec3;
    fn angular_velocity(&self, link: usize) -> DVec3;
    fn angular_acceleration(&self, link: usize) -> DVec3;

    fn kinetic_energy(&self) -> f64;

    /// Number of enclosed rigid links (1 for a free body).
    fn num_links(&self) -> usize;

    /// Whether the body takes part in dynamics at all. Static and disabled
    /// bodies are never super bodies.
    fn is_dynamic(&self) -> bool;
}

/// A body owned by the simulator.
#[derive(Debug, Clone)]
pub enum SimBody {
    Rigid(RigidBody),
    Articulated(Multibody),
}

impl SimBody {
    pub fn dynamics(&self) -> &dyn DynamicBody {
        match self {
            SimBody::Rigid(body) => body,
            SimBody::Articulated(mechanism) => mechanism,
        }
    }

    pub fn dynamics_mut(&mut self) -> &mut dyn DynamicBody {
        match self {
            SimBody::Rigid(body) => body,
            SimBody::Articulated(mechanism) => mechanism,
        }
    }

    pub fn as_rigid(&self) -> Option<&RigidBody> {
        match self {
            SimBody::Rigid(body) => Some(body),
            SimBody::Articulated(_) => None,
        }
    }

    pub fn as_rigid_mut(&mut self) -> Option<&mut RigidBody> {
        match self {
            SimBody::Rigid(body) => Some(body),
            SimBody::Articulated(_) => None,
        }
    }

    pub fn as_multibody(&self) -> Option<&Multibody> {
        match self {
            SimBody::Articulated(mechanism) => Some(mechanism),
            SimBody::Rigid(_) => None,
        }
    }

    pub fn as_multibody_mut(&mut self) -> Option<&mut Multibody> {
        match self {
            SimBody::Articulated(mechanism) => Some(mechanism),
            SimBody::Rigid(_) => None,
        }
    }

    pub fn is_articulated(&self) -> bool {
        matches!(self, SimBody::Articulated(_))
    }
}

/// Saved coordinates, velocities and forces of one body.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyState {
    pub id: BodyId,
    /// Euler representation.
    pub coordinates: VectorN,
    /// Spatial representation.
    pub velocity: VectorN,
    pub force: VectorN,
}

/// State of every body at one instant, in arena order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodySnapshot {
    states: Vec<BodyState>,
}

impl BodySnapshot {
    pub fn get(&self, id: BodyId) -> Option<&BodyState> {
        self.states.iter().find(|state| state.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BodyState> {
        self.states.iter()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// World poses of every link at one configuration.
pub type PoseMap = BTreeMap<LinkRef, Transform>;

/// The canonical collection of bodies; everything else refers to them by handle.
#[derive(Default, Clone)]
pub struct BodySet {
    bodies: Arena<SimBody>,
}

impl BodySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_rigid(&mut self, body: RigidBody) -> BodyId {
        self.bodies.insert(SimBody::Rigid(body))
    }

    pub fn insert_multibody(&mut self, mechanism: Multibody) -> BodyId {
        self.bodies.insert(SimBody::Articulated(mechanism))
    }

    pub fn remove(&mut self, id: BodyId) -> Option<SimBody> {
        self.bodies.remove(id)
    }

    pub fn get(&self, id: BodyId) -> Option<&SimBody> {
        self.bodies.get(id)
    }

    pub fn get_mut(&mut self, id: BodyId) -> Option<&mut SimBody> {
        self.bodies.get_mut(id)
    }

    pub fn dynamics(&self, id: BodyId) -> Result<&dyn DynamicBody, SimulationError> {
        self.bodies
            .get(id)
            .map(SimBody::dynamics)
            .ok_or(SimulationError::UnknownBody(id))
    }

    pub fn dynamics_mut(&mut self, id: BodyId) -> Result<&mut dyn DynamicBody, SimulationError> {
        self.bodies
            .get_mut(id)
            .map(SimBody::dynamics_mut)
            .ok_or(SimulationError::UnknownBody(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (BodyId, &SimBody)> + '_ {
        self.bodies.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (BodyId, &mut SimBody)> + '_ {
        self.bodies.iter_mut()
    }

    pub fn ids(&self) -> impl Iterator<Item = BodyId> + '_ {
        self.bodies.ids()
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// The dynamic entity that governs `link`: the mechanism it belongs to or
    /// the free body itself. `None` for static, disabled or unknown bodies.
    pub fn super_body(&self, link: LinkRef) -> Option<BodyId> {
        self.bodies
            .get(link.body)
            .filter(|body| body.dynamics().is_dynamic())
            .map(|_| link.body)
    }

    pub fn link_pose(&self, link: LinkRef) -> Option<Transform> {
        self.bodies
            .get(link.body)
            .map(|body| body.dynamics().link_pose(link.link))
    }

    pub fn point_velocity(&self, link: LinkRef, point: DVec3) -> DVec3 {
        self.bodies
            .get(link.body)
            .map(|body| body.dynamics().point_velocity(link.link, point))
            .unwrap_or(DVec3::ZERO)
    }

    pub fn point_acceleration(&self, link: LinkRef, point: DVec3) -> DVec3 {
        self.bodies
            .get(link.body)
            .map(|body| body.dynamics().point_acceleration(link.link, point))
            .unwrap_or(DVec3::ZERO)
    }

    pub fn angular_velocity(&self, link: LinkRef) -> DVec3 {
        self.bodies
            .get(link.body)
            .map(|body| body.dynamics().angular_velocity(link.link))
            .unwrap_or(DVec3::ZERO)
    }

    pub fn angular_acceleration(&self, link: LinkRef) -> DVec3 {
        self.bodies
            .get(link.body)
            .map(|body| body.dynamics().angular_acceleration(link.link))
            .unwrap_or(DVec3::ZERO)
    }

    /// Recomputes forward dynamics of every dynamic body.
    pub fn calc_fwd_dyn(&mut self, gravity: DVec3) {
        for (_, body) in self.bodies.iter_mut() {
            let dynamics = body.dynamics_mut();
            if dynamics.is_dynamic() {
                dynamics.calc_fwd_dyn(gravity);
            }
        }
    }

    pub fn reset_accumulators(&mut self) {
        for (_, body) in self.bodies.iter_mut() {
            body.dynamics_mut().reset_accumulators();
        }
    }

    pub fn kinetic_energy(&self, ids: &[BodyId]) -> f64 {
        ids.iter()
            .filter_map(|id| self.bodies.get(*id))
            .map(|body| body.dynamics().kinetic_energy())
            .sum()
    }

    pub fn total_kinetic_energy(&self) -> f64 {
        self.bodies
            .iter()
            .map(|(_, body)| body.dynamics().kinetic_energy())
            .sum()
    }

    pub fn snapshot(&self) -> BodySnapshot {
        BodySnapshot {
            states: self
                .bodies
                .iter()
                .map(|(id, body)| {
                    let dynamics = body.dynamics();
                    BodyState {
                        id,
                        coordinates: dynamics.generalized_coordinates(CoordinateType::Euler),
                        velocity: dynamics.generalized_velocity(CoordinateType::Spatial),
                        force: dynamics.generalized_force(),
                    }
                })
                .collect(),
        }
    }

    /// Restores coordinates, velocities and forces saved by [`BodySet::snapshot`].
    pub fn restore(&mut self, snapshot: &BodySnapshot) {
        for state in snapshot.iter() {
            if let Some(body) = self.bodies.get_mut(state.id) {
                let dynamics = body.dynamics_mut();
                dynamics.set_generalized_coordinates(CoordinateType::Euler, &state.coordinates);
                dynamics.set_generalized_velocity(CoordinateType::Spatial, &state.velocity);
                dynamics.set_generalized_force(&state.force);
            }
        }
    }

    /// Link poses of the current configuration.
    pub fn poses(&self) -> PoseMap {
        let mut poses = PoseMap::new();
        for (id, body) in self.bodies.iter() {
            let dynamics = body.dynamics();
            for link in 0..dynamics.num_links() {
                poses.insert(LinkRef::new(id, link), dynamics.link_pose(link));
            }
        }
        poses
    }

    /// Link poses at the coordinates stored in `snapshot`; the current
    /// configuration is left untouched.
    pub fn poses_at(&mut self, snapshot: &BodySnapshot) -> PoseMap {
        let current: Vec<(BodyId, VectorN)> = snapshot
            .iter()
            .filter_map(|state| {
                let body = self.bodies.get_mut(state.id)?;
                let dynamics = body.dynamics_mut();
                let saved = dynamics.generalized_coordinates(CoordinateType::Euler);
                dynamics.set_generalized_coordinates(CoordinateType::Euler, &state.coordinates);
                Some((state.id, saved))
            })
            .collect();
        let poses = self.poses();
        for (id, coordinates) in current {
            if let Some(body) = self.bodies.get_mut(id) {
                body.dynamics_mut()
                    .set_generalized_coordinates(CoordinateType::Euler, &coordinates);
            }
        }
        poses
    }
}
