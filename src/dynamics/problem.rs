//! Assembly of the per-group constraint subproblem.
//!
//! Every event contributes one or more constraint rows. A row stores its
//! generalized Jacobian for each super body it touches and the response
//! `M⁻¹ Jᵀ` of that body; the coupling matrix is the sum over shared bodies
//! of `J_i · M⁻¹ J_jᵀ`, i.e. how a unit impulse along row `j` changes the
//! velocity of row `i`.

use glam::DVec3;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::friction::{slip_direction, FrictionPyramid};
use crate::{
    core::{
        body::{BodyId, BodySet, CoordinateType, LinkRef},
        constraints::Joint,
    },
    error::SimulationError,
    events::event::{Event, EventKind},
    utils::{
        allocator::Arena,
        linalg::{MatrixN, VectorN},
        logging::ScopedTimer,
    },
};

/// Rows above which the coupling matrix is assembled on the rayon pool.
#[cfg(feature = "parallel")]
const PARALLEL_ROW_THRESHOLD: usize = 32;

/// Level at which a group is resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolveMode {
    /// Velocity-level impulses, with or without Newton restitution.
    Impulse { restitution: bool },
    /// Force-level solve keeping constraints satisfied over `horizon` seconds.
    Force { horizon: f64 },
}

impl SolveMode {
    /// Factor turning a solved magnitude into an impulse.
    pub fn impulse_scale(&self) -> f64 {
        match *self {
            SolveMode::Impulse { .. } => 1.0,
            SolveMode::Force { horizon } => horizon,
        }
    }

    pub fn is_force(&self) -> bool {
        matches!(self, SolveMode::Force { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowKind {
    Normal,
    Tangent1,
    Tangent2,
    /// Along the sliding direction of a sliding contact.
    Slip,
    Limit,
    Bilateral,
}

/// How friction of a contact enters the complementarity problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrictionState {
    Frictionless,
    /// Full pyramid unknowns.
    Sticking,
    /// Friction fixed at `-μ cn` opposite the slip.
    Sliding,
}

#[derive(Debug, Clone)]
pub struct ProblemRow {
    /// Index of the owning event in the group.
    pub event: usize,
    pub kind: RowKind,
    /// Generalized force of a unit magnitude along this row, per super body.
    pub jacobian: Vec<(BodyId, VectorN)>,
    /// `M⁻¹` applied to each Jacobian block.
    pub response: Vec<(BodyId, VectorN)>,
    pub velocity: f64,
    pub acceleration: f64,
}

/// Row bookkeeping of one contact event.
#[derive(Debug, Clone)]
pub struct ContactBlock {
    pub event: usize,
    pub normal: usize,
    /// Tangent rows; present for every frictional contact.
    pub tangents: Option<[usize; 2]>,
    pub slip: Option<usize>,
    pub slip_direction: Option<DVec3>,
    /// Coulomb coefficient; bounds sticking and sliding friction alike.
    pub mu: f64,
    pub pyramid: Option<FrictionPyramid>,
    pub state: FrictionState,
    pub restitution: f64,
}

/// Assembled data of one event group.
#[derive(Debug, Clone)]
pub struct ContactProblem {
    pub mode: SolveMode,
    /// Super bodies taking part, sorted.
    pub bodies: Vec<BodyId>,
    pub rows: Vec<ProblemRow>,
    pub contacts: Vec<ContactBlock>,
    /// Rows of joint-limit events.
    pub limits: Vec<usize>,
    /// Rows of bilateral joint events.
    pub bilateral: Vec<usize>,
    pub coupling: MatrixN,
    pub rhs: VectorN,
}

impl ContactProblem {
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Unilateral normal directions: contacts and limits.
    pub fn num_normal(&self) -> usize {
        self.contacts.len() + self.limits.len()
    }

    pub fn num_sticking(&self) -> usize {
        self.contacts
            .iter()
            .filter(|block| block.state == FrictionState::Sticking)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row velocities after the row magnitudes `magnitudes` are applied.
    pub fn post_velocity(&self, magnitudes: &VectorN) -> VectorN {
        let mut post = self.coupling.mul_vec(magnitudes);
        post.axpy(1.0, &self.rhs);
        post
    }

    /// Accumulated generalized force of `magnitudes` per body. Bilateral rows
    /// are skipped unless `include_bilateral` is set.
    pub fn generalized_forces(&self, magnitudes: &VectorN, include_bilateral: bool) -> Vec<(BodyId, VectorN)> {
        let mut forces: Vec<(BodyId, VectorN)> = Vec::new();
        for (row, &magnitude) in self.rows.iter().zip(magnitudes.iter()) {
            if magnitude == 0.0 || (!include_bilateral && row.kind == RowKind::Bilateral) {
                continue;
            }
            for (id, jacobian) in &row.jacobian {
                match forces.iter_mut().find(|(other, _)| other == id) {
                    Some((_, force)) => force.axpy(magnitude, jacobian),
                    None => forces.push((*id, jacobian.scaled(magnitude))),
                }
            }
        }
        forces.sort_by_key(|(id, _)| *id);
        forces
    }
}

/// Builds [`ContactProblem`]s from event groups.
#[derive(Debug, Clone)]
pub struct ProblemBuilder {
    pub parallel: bool,
    /// Tangential speed above which a contact is treated as sliding.
    pub slip_tolerance: f64,
}

impl Default for ProblemBuilder {
    fn default() -> Self {
        Self {
            parallel: cfg!(feature = "parallel"),
            slip_tolerance: 1e-6,
        }
    }
}

impl ProblemBuilder {
    pub fn new(parallel: bool, slip_tolerance: f64) -> Self {
        Self {
            parallel,
            slip_tolerance,
        }
    }

    pub fn build(
        &self,
        events: &[Event],
        bodies: &BodySet,
        joints: &Arena<Joint>,
        mode: SolveMode,
    ) -> Result<ContactProblem, SimulationError> {
        let _timer = ScopedTimer::new("build contact problem");
        let mut rows = Vec::new();
        let mut contacts = Vec::new();
        let mut limits = Vec::new();
        let mut bilateral = Vec::new();
        let mut restitution_of_row = Vec::new();

        for (index, event) in events.iter().enumerate() {
            match &event.kind {
                EventKind::Contact(contact) => {
                    let relative_velocity = contact.relative_velocity(bodies);
                    let relative_acceleration = contact.relative_acceleration(bodies);
                    let mut push = |kind: RowKind, direction: DVec3| -> Result<usize, SimulationError> {
                        let jacobian = pair_jacobian(
                            bodies,
                            (contact.link_a, contact.point),
                            (contact.link_b, contact.point),
                            direction,
                            DVec3::ZERO,
                        )?;
                        rows.push(ProblemRow {
                            event: index,
                            kind,
                            jacobian,
                            response: Vec::new(),
                            velocity: direction.dot(relative_velocity),
                            acceleration: direction.dot(relative_acceleration),
                        });
                        restitution_of_row.push(contact.params.restitution);
                        Ok(rows.len() - 1)
                    };

                    let normal = push(RowKind::Normal, contact.normal)?;
                    let pyramid = if contact.params.is_frictionless() {
                        None
                    } else {
                        FrictionPyramid::from_edges(contact.params.friction_edges)
                    };
                    let mut block = ContactBlock {
                        event: index,
                        normal,
                        tangents: None,
                        slip: None,
                        slip_direction: None,
                        mu: contact.params.mu_coulomb,
                        pyramid,
                        state: FrictionState::Frictionless,
                        restitution: contact.params.restitution,
                    };
                    if pyramid.is_some() {
                        let t1 = push(RowKind::Tangent1, contact.tangent1)?;
                        let t2 = push(RowKind::Tangent2, contact.tangent2)?;
                        block.tangents = Some([t1, t2]);
                        block.state = FrictionState::Sticking;
                        if let Some(direction) =
                            slip_direction(relative_velocity, contact.normal, self.slip_tolerance)
                        {
                            let slip = push(RowKind::Slip, direction)?;
                            block.slip = Some(slip);
                            block.slip_direction = Some(direction);
                            block.state = FrictionState::Sliding;
                        }
                    }
                    contacts.push(block);
                }
                EventKind::JointLimit(limit) => {
                    let Some(id) = bodies.super_body(LinkRef::new(limit.body, limit.link)) else {
                        continue;
                    };
                    let dofs = bodies
                        .dynamics(id)?
                        .num_generalized_coordinates(CoordinateType::Spatial);
                    rows.push(ProblemRow {
                        event: index,
                        kind: RowKind::Limit,
                        jacobian: vec![(id, VectorN::basis(dofs, limit.dof).scaled(limit.sign()))],
                        response: Vec::new(),
                        velocity: limit.velocity(bodies),
                        acceleration: limit.acceleration(bodies),
                    });
                    restitution_of_row.push(limit.restitution);
                    limits.push(rows.len() - 1);
                }
                EventKind::Constraint(constraint) => {
                    let joint = joints
                        .get(constraint.joint)
                        .ok_or(SimulationError::UnknownJoint(constraint.joint))?;
                    let missing = || SimulationError::UnknownBody(joint.link_a.body);
                    let (anchor_a, anchor_b) = joint.world_anchors(bodies).ok_or_else(missing)?;
                    let joint_rows = joint.rows(bodies).ok_or_else(missing)?;
                    let velocities = joint.row_velocities(bodies).ok_or_else(missing)?;
                    let accelerations = joint.row_accelerations(bodies).ok_or_else(missing)?;
                    for ((row, velocity), acceleration) in joint_rows.iter().zip(velocities).zip(accelerations) {
                        let jacobian = pair_jacobian(
                            bodies,
                            (joint.link_a, anchor_a),
                            (joint.link_b, anchor_b),
                            row.linear,
                            row.angular,
                        )?;
                        rows.push(ProblemRow {
                            event: index,
                            kind: RowKind::Bilateral,
                            jacobian,
                            response: Vec::new(),
                            velocity,
                            acceleration,
                        });
                        restitution_of_row.push(0.0);
                        bilateral.push(rows.len() - 1);
                    }
                }
                EventKind::None => {}
            }
        }

        let mut participants = Vec::new();
        for row in &mut rows {
            row.response = row
                .jacobian
                .iter()
                .map(|(id, jacobian)| {
                    Ok((*id, bodies.dynamics(*id)?.solve_generalized_inertia(jacobian)))
                })
                .collect::<Result<_, SimulationError>>()?;
            participants.extend(row.jacobian.iter().map(|(id, _)| *id));
        }
        participants.sort();
        participants.dedup();

        let coupling = self.assemble_coupling(&rows);
        let rhs = rows
            .iter()
            .zip(&restitution_of_row)
            .map(|(row, &restitution)| match mode {
                SolveMode::Impulse { restitution: bounce } => {
                    let unilateral = matches!(row.kind, RowKind::Normal | RowKind::Limit);
                    if bounce && unilateral && row.velocity < 0.0 {
                        (1.0 + restitution) * row.velocity
                    } else {
                        row.velocity
                    }
                }
                SolveMode::Force { horizon } => row.velocity / horizon + row.acceleration,
            })
            .collect();

        Ok(ContactProblem {
            mode,
            bodies: participants,
            rows,
            contacts,
            limits,
            bilateral,
            coupling,
            rhs,
        })
    }

    fn assemble_coupling(&self, rows: &[ProblemRow]) -> MatrixN {
        let n = rows.len();
        #[cfg(feature = "parallel")]
        {
            if self.parallel && n >= PARALLEL_ROW_THRESHOLD {
                let assembled: Vec<VectorN> = (0..n)
                    .into_par_iter()
                    .map(|i| coupling_row(rows, i))
                    .collect();
                return MatrixN::from_rows(&assembled);
            }
        }
        let assembled: Vec<VectorN> = (0..n).map(|i| coupling_row(rows, i)).collect();
        MatrixN::from_rows(&assembled)
    }
}

fn coupling_row(rows: &[ProblemRow], i: usize) -> VectorN {
    rows.iter()
        .map(|other| {
            rows[i]
                .jacobian
                .iter()
                .flat_map(|(id, jacobian)| {
                    other
                        .response
                        .iter()
                        .filter(move |(other_id, _)| other_id == id)
                        .map(move |(_, response)| jacobian.dot(response))
                })
                .sum()
        })
        .collect()
}

/// Generalized Jacobian of a row acting `+(linear, angular)` on A at its
/// point and the negation on B. Sides without a super body are left out;
/// both sides on the same body are merged.
fn pair_jacobian(
    bodies: &BodySet,
    (link_a, point_a): (LinkRef, DVec3),
    (link_b, point_b): (LinkRef, DVec3),
    linear: DVec3,
    angular: DVec3,
) -> Result<Vec<(BodyId, VectorN)>, SimulationError> {
    let mut blocks: Vec<(BodyId, VectorN)> = Vec::with_capacity(2);
    for (link, point, sign) in [(link_a, point_a, 1.0), (link_b, point_b, -1.0)] {
        let Some(id) = bodies.super_body(link) else {
            continue;
        };
        let block = bodies
            .dynamics(id)?
            .convert_to_generalized_force(link.link, point, linear * sign, angular * sign);
        match blocks.iter_mut().find(|(other, _)| *other == id) {
            Some((_, existing)) => existing.axpy(1.0, &block),
            None => blocks.push((id, block)),
        }
    }
    Ok(blocks)
}
