//! Turns an assembled [`ContactProblem`] into a linear complementarity
//! problem, solves it and decodes the result into row magnitudes and event
//! impulses.
//!
//! Unknowns are laid out as
//! `[normals | β1+ | β2+ | β1- | β2- | facets | bilateral]`: one normal per
//! contact or limit, four signed tangential magnitudes per sticking contact,
//! one multiplier per pyramid facet, and one free multiplier per bilateral row.
//! Bilateral multipliers are eliminated with a Schur complement before pivoting.

use glam::DVec3;
use log::debug;

use super::{
    lcp::LemkeSolver,
    problem::{ContactProblem, FrictionState},
};
use crate::{
    config::LcpSettings,
    error::LcpError,
    events::event::{Event, EventKind},
    utils::{
        linalg::{MatrixN, VectorN},
        logging::ScopedTimer,
        spatial::SpatialVec,
    },
};

/// Output of [`ContactSolver::solve`].
#[derive(Debug, Clone, PartialEq)]
pub struct ContactSolution {
    /// Magnitude along every problem row.
    pub magnitudes: VectorN,
    /// Row velocities (or velocity rates in force mode) after application.
    pub post_velocity: VectorN,
    pub pivots: usize,
    /// Largest diagonal regularization that was needed.
    pub regularization: f64,
    /// Sliding contacts re-solved as sticking.
    pub transitions: usize,
}

/// Sparse description of every unknown of the complementarity problem.
#[derive(Debug, Default)]
struct Layout {
    /// Row contributions of a unit value of each unknown.
    applies: Vec<Vec<(usize, f64)>>,
    /// Row velocities each complementarity condition measures.
    measures: Vec<Vec<(usize, f64)>>,
    /// Constant couplings between unknowns (pyramid structure).
    constants: Vec<(usize, usize, f64)>,
    num_free: usize,
}

impl Layout {
    fn new(problem: &ContactProblem) -> Self {
        let mut layout = Layout::default();
        let mut normal_var = Vec::with_capacity(problem.contacts.len());

        for block in &problem.contacts {
            let mut applies = vec![(block.normal, 1.0)];
            if block.state == FrictionState::Sliding {
                if let Some(slip) = block.slip {
                    applies.push((slip, -block.mu));
                }
            }
            normal_var.push(layout.push(applies, vec![(block.normal, 1.0)]));
        }
        for &row in &problem.limits {
            layout.push(vec![(row, 1.0)], vec![(row, 1.0)]);
        }

        let sticking: Vec<_> = problem
            .contacts
            .iter()
            .zip(&normal_var)
            .filter(|(block, _)| block.state == FrictionState::Sticking)
            .filter_map(|(block, &normal)| Some((block, normal, block.tangents?, block.pyramid?)))
            .collect();

        let mut signed = vec![[0usize; 4]; sticking.len()];
        for (sign_slot, sign) in [(0, 1.0), (2, -1.0)] {
            for axis in 0..2 {
                for (k, (_, _, tangents, _)) in sticking.iter().enumerate() {
                    let row = tangents[axis];
                    signed[k][sign_slot + axis] = layout.push(vec![(row, sign)], vec![(row, sign)]);
                }
            }
        }

        for (k, (block, normal, _, pyramid)) in sticking.iter().enumerate() {
            let [b1p, b2p, b1m, b2m] = signed[k];
            let limit = block.mu * pyramid.coulomb_scale();
            for (c, s) in pyramid.directions() {
                let facet = layout.push(Vec::new(), Vec::new());
                for (beta, weight) in [(b1p, c), (b1m, c), (b2p, s), (b2m, s)] {
                    layout.constants.push((beta, facet, weight));
                    layout.constants.push((facet, beta, -weight));
                }
                layout.constants.push((facet, *normal, limit));
            }
        }

        for &row in &problem.bilateral {
            layout.push(vec![(row, 1.0)], vec![(row, 1.0)]);
            layout.num_free += 1;
        }
        layout
    }

    fn push(&mut self, applies: Vec<(usize, f64)>, measures: Vec<(usize, f64)>) -> usize {
        self.applies.push(applies);
        self.measures.push(measures);
        self.applies.len() - 1
    }

    fn len(&self) -> usize {
        self.applies.len()
    }

    fn assemble(&self, problem: &ContactProblem) -> (MatrixN, VectorN) {
        let a = &problem.coupling;
        let mut m = MatrixN::from_fn(self.len(), self.len(), |i, j| {
            self.measures[i]
                .iter()
                .flat_map(|&(r, wr)| self.applies[j].iter().map(move |&(s, ws)| wr * ws * a[(r, s)]))
                .sum()
        });
        for &(i, j, value) in &self.constants {
            m[(i, j)] += value;
        }
        let q = self
            .measures
            .iter()
            .map(|measure| measure.iter().map(|&(r, w)| w * problem.rhs[r]).sum())
            .collect();
        (m, q)
    }

    fn magnitudes(&self, rows: usize, unknowns: &VectorN) -> VectorN {
        let mut magnitudes = VectorN::zeros(rows);
        for (applies, &value) in self.applies.iter().zip(unknowns.iter()) {
            for &(row, weight) in applies {
                magnitudes[row] += weight * value;
            }
        }
        magnitudes
    }
}

/// Solves assembled problems; the pivoting workspace is reused across calls.
#[derive(Debug, Clone)]
pub struct ContactSolver {
    lemke: LemkeSolver,
    /// Reverse slip speed that triggers the sliding to sticking transition.
    pub slip_tolerance: f64,
}

impl ContactSolver {
    pub fn new(settings: LcpSettings, slip_tolerance: f64) -> Self {
        Self {
            lemke: LemkeSolver::new(settings),
            slip_tolerance,
        }
    }

    /// Solves `problem`. Sliding contacts whose fixed friction would reverse
    /// their slip are switched to sticking and the problem is solved again.
    pub fn solve(&mut self, problem: &mut ContactProblem) -> Result<ContactSolution, LcpError> {
        let _timer = ScopedTimer::new("solve contact problem");
        let mut pivots = 0;
        let mut regularization: f64 = 0.0;
        let mut transitions = 0;
        loop {
            let layout = Layout::new(problem);
            let (m, q) = layout.assemble(problem);
            let (unknowns, used) = self.solve_mixed(&m, &q, layout.num_free, &mut pivots)?;
            regularization = regularization.max(used);
            let magnitudes = layout.magnitudes(problem.num_rows(), &unknowns);
            let post_velocity = problem.post_velocity(&magnitudes);

            let mut switched = false;
            for block in &mut problem.contacts {
                if block.state != FrictionState::Sliding {
                    continue;
                }
                let reversed = block.slip.is_some_and(|slip| post_velocity[slip] < -self.slip_tolerance);
                if reversed && block.tangents.is_some() {
                    debug!("contact of event {} switches from sliding to sticking", block.event);
                    block.state = FrictionState::Sticking;
                    switched = true;
                    transitions += 1;
                }
            }
            if !switched {
                return Ok(ContactSolution {
                    magnitudes,
                    post_velocity,
                    pivots,
                    regularization,
                    transitions,
                });
            }
        }
    }

    fn solve_mixed(
        &mut self,
        m: &MatrixN,
        q: &VectorN,
        num_free: usize,
        pivots: &mut usize,
    ) -> Result<(VectorN, f64), LcpError> {
        if num_free == 0 {
            return self.solve_lcp(m, q, pivots);
        }
        let n = q.len();
        let p = n - num_free;
        let pi: Vec<usize> = (0..p).collect();
        let ei: Vec<usize> = (p..n).collect();
        let m_ee = m.select(&ei, &ei);
        let m_ep = m.select(&ei, &pi);
        let m_pe = m.select(&pi, &ei);
        let q_e: VectorN = ei.iter().map(|&i| q[i]).collect();
        let q_p: VectorN = pi.iter().map(|&i| q[i]).collect();

        let settings = *self.lemke.settings();
        let mut shift = 0.0;
        let (x, y) = loop {
            let mut block = m_ee.clone();
            block.add_to_diagonal(shift);
            if let (Some(x), Some(y)) = (block.solve_matrix(&m_ep), block.solve(&q_e)) {
                break (x, y);
            }
            shift = if shift == 0.0 {
                settings.regularization_start
            } else {
                shift * 10.0
            };
            if shift > settings.regularization_max {
                return Err(LcpError::SingularEqualityBlock);
            }
        };

        let reduced_m = m.select(&pi, &pi).sub(&m_pe.mul(&x));
        let reduced_q = q_p.sub(&m_pe.mul_vec(&y));
        let (z, used) = self.solve_lcp(&reduced_m, &reduced_q, pivots)?;
        let mut lambda = x.mul_vec(&z);
        lambda.axpy(1.0, &y);

        let mut unknowns = z.into_inner();
        unknowns.extend(lambda.iter().map(|value| -value));
        Ok((VectorN::from_vec(unknowns), used.max(shift)))
    }

    fn solve_lcp(&mut self, m: &MatrixN, q: &VectorN, pivots: &mut usize) -> Result<(VectorN, f64), LcpError> {
        let mut last = match self.lemke.solve(m, q) {
            Ok(z) => {
                *pivots += self.lemke.last_pivots();
                return Ok((z, 0.0));
            }
            Err(error @ (LcpError::NonFinite | LcpError::DimensionMismatch { .. })) => return Err(error),
            Err(error) => error,
        };
        *pivots += self.lemke.last_pivots();

        let settings = *self.lemke.settings();
        let mut shift = settings.regularization_start;
        while shift <= settings.regularization_max {
            let mut regularized = m.clone();
            regularized.add_to_diagonal(shift);
            let result = self.lemke.solve(&regularized, q);
            *pivots += self.lemke.last_pivots();
            match result {
                Ok(z) => {
                    debug!("complementarity problem solved with regularization {shift:e}");
                    return Ok((z, shift));
                }
                Err(error) => last = error,
            }
            shift *= 10.0;
        }
        Err(last)
    }
}

/// Writes the impulses of a solution into the events of its group.
/// Force-level magnitudes are scaled by the solve horizon.
pub fn decode_impulses(problem: &ContactProblem, magnitudes: &VectorN, events: &mut [Event]) {
    let scale = problem.mode.impulse_scale();
    for block in &problem.contacts {
        let Some(contact) = events.get_mut(block.event).and_then(Event::as_contact_mut) else {
            continue;
        };
        let friction = match (block.state, block.tangents, block.slip, block.slip_direction) {
            (FrictionState::Sticking, Some([t1, t2]), _, _) => {
                contact.tangent1 * magnitudes[t1] + contact.tangent2 * magnitudes[t2]
            }
            (FrictionState::Sliding, _, Some(slip), Some(direction)) => direction * magnitudes[slip],
            _ => DVec3::ZERO,
        };
        let force = contact.normal * magnitudes[block.normal] + friction;
        contact.impulse = SpatialVec::from_force_at(force * scale, contact.point);
    }

    for &row in &problem.limits {
        if let Some(EventKind::JointLimit(limit)) = events.get_mut(problem.rows[row].event).map(|e| &mut e.kind) {
            limit.impulse = magnitudes[row] * scale;
        }
    }

    for event in events.iter_mut() {
        if let EventKind::Constraint(constraint) = &mut event.kind {
            constraint.normal_impulse.clear();
            constraint.friction_impulse = 0.0;
        }
    }
    for &row in &problem.bilateral {
        if let Some(EventKind::Constraint(constraint)) =
            events.get_mut(problem.rows[row].event).map(|e| &mut e.kind)
        {
            constraint.normal_impulse.push(magnitudes[row] * scale);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{
            body::{BodySet, LinkRef},
            constraints::{Joint, JointKind},
            rigidbody::RigidBody,
            types::{MassProperties, Transform},
        },
        dynamics::problem::{ProblemBuilder, SolveMode},
        events::{
            event::{ConstraintData, ContactData},
            parameters::ContactParameters,
        },
        utils::allocator::Arena,
    };

    fn ball(velocity: DVec3, angular: DVec3) -> (BodySet, LinkRef, LinkRef) {
        let mut bodies = BodySet::new();
        let ground = bodies.insert_rigid(RigidBody::fixed(Transform::IDENTITY));
        let ball = bodies.insert_rigid(
            RigidBody::new(
                Transform::from_position(DVec3::new(0.0, 0.5, 0.0)),
                MassProperties::solid_sphere(0.5, 1.0),
            )
            .with_velocity(velocity, angular),
        );
        (bodies, LinkRef::root(ball), LinkRef::root(ground))
    }

    fn solve(bodies: &BodySet, events: &mut [Event], mode: SolveMode) -> (ContactProblem, ContactSolution) {
        let mut problem = ProblemBuilder::new(false, 1e-6)
            .build(events, bodies, &Arena::new(), mode)
            .unwrap();
        let solution = ContactSolver::new(LcpSettings::default(), 1e-9)
            .solve(&mut problem)
            .unwrap();
        decode_impulses(&problem, &solution.magnitudes, events);
        (problem, solution)
    }

    #[test]
    fn restitution_reverses_normal_velocity() {
        let (bodies, a, b) = ball(DVec3::new(0.0, -2.0, 0.0), DVec3::ZERO);
        let params = ContactParameters::frictionless().with_restitution(0.5);
        let mut events = vec![Event::contact(
            0.0,
            ContactData::new(a, b, DVec3::ZERO, DVec3::Y).unwrap().with_parameters(params),
            1e-6,
        )];
        let (_, solution) = solve(&bodies, &mut events, SolveMode::Impulse { restitution: true });
        // w = A cn + (1 + e) v = 0, so the post-impact velocity is -e v.
        assert!(solution.post_velocity[0].abs() < 1e-9);
        let impulse = events[0].as_contact().unwrap().normal_impulse();
        assert!((impulse - 3.0).abs() < 1e-9);
    }

    #[test]
    fn separating_contact_gets_no_impulse() {
        let (bodies, a, b) = ball(DVec3::new(0.0, 1.0, 0.0), DVec3::ZERO);
        let mut events = vec![Event::contact(0.0, ContactData::new(a, b, DVec3::ZERO, DVec3::Y).unwrap(), 1e-6)];
        let (_, solution) = solve(&bodies, &mut events, SolveMode::Impulse { restitution: false });
        assert_eq!(solution.magnitudes[0], 0.0);
    }

    #[test]
    fn sticking_friction_stays_inside_the_cone() {
        let (bodies, a, b) = ball(DVec3::new(0.3, -2.0, 0.0), DVec3::ZERO);
        let params = ContactParameters::default().with_friction(1.0);
        let mut events = vec![Event::contact(
            0.0,
            ContactData::new(a, b, DVec3::ZERO, DVec3::Y).unwrap().with_parameters(params),
            1e-6,
        )];
        let (_, solution) = solve(&bodies, &mut events, SolveMode::Impulse { restitution: false });
        assert_eq!(solution.transitions, 1);
        let contact = events[0].as_contact().unwrap();
        let cn = contact.normal_impulse();
        let (t1, t2) = contact.tangent_impulse();
        assert!(cn > 0.0);
        assert!((t1 * t1 + t2 * t2).sqrt() <= cn + 1e-9);
    }

    #[test]
    fn fast_slide_keeps_fixed_friction_direction() {
        let (bodies, a, b) = ball(DVec3::new(10.0, -1.0, 0.0), DVec3::ZERO);
        let params = ContactParameters::default().with_friction(0.2);
        let mut events = vec![Event::contact(
            0.0,
            ContactData::new(a, b, DVec3::ZERO, DVec3::Y).unwrap().with_parameters(params),
            1e-6,
        )];
        let (problem, solution) = solve(&bodies, &mut events, SolveMode::Impulse { restitution: false });
        assert_eq!(solution.transitions, 0);
        assert_eq!(problem.contacts[0].state, FrictionState::Sliding);
        let contact = events[0].as_contact().unwrap();
        let friction = contact.impulse.lin - contact.normal * contact.normal_impulse();
        assert!((friction.length() - 0.2 * contact.normal_impulse()).abs() < 1e-9);
        assert!(friction.x < 0.0);
    }

    #[test]
    fn bilateral_rows_are_eliminated() {
        let (mut bodies, a, b) = ball(DVec3::new(1.0, -1.0, 0.5), DVec3::new(0.0, 0.0, 2.0));
        let mut joints = Arena::new();
        let joint = Joint::at_world_anchor(JointKind::Spherical, a, b, DVec3::new(0.0, 1.0, 0.0), &bodies).unwrap();
        let id = joints.insert(joint);
        let mut events = vec![Event::constraint(
            0.0,
            ConstraintData {
                joint: id,
                link_a: a,
                link_b: b,
                normal_impulse: Vec::new(),
                friction_impulse: 0.0,
            },
        )];
        let mut problem = ProblemBuilder::new(false, 1e-6)
            .build(&events, &bodies, &joints, SolveMode::Impulse { restitution: false })
            .unwrap();
        let solution = ContactSolver::new(LcpSettings::default(), 1e-9)
            .solve(&mut problem)
            .unwrap();
        for &row in &problem.bilateral {
            assert!(solution.post_velocity[row].abs() < 1e-9);
        }
        decode_impulses(&problem, &solution.magnitudes, &mut events);
        let EventKind::Constraint(constraint) = &events[0].kind else {
            panic!("constraint event expected");
        };
        assert_eq!(constraint.normal_impulse.len(), 3);

        for (id, impulse) in problem.generalized_forces(&solution.magnitudes, true) {
            bodies.dynamics_mut(id).unwrap().apply_generalized_impulse(&impulse);
        }
        let joint = joints.get(id).unwrap();
        for v in joint.row_velocities(&bodies).unwrap() {
            assert!(v.abs() < 1e-9);
        }
    }
}
