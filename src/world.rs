//! The event-driven time-stepping driver.

pub mod resolution;
pub mod toi;

use std::collections::{BTreeMap, BTreeSet};

use glam::DVec3;
use log::{debug, warn};

use crate::{
    collision::{narrowphase::PrimitiveDetector, CollisionDetector},
    config::SimulatorConfig,
    core::{
        articulations::Multibody,
        body::{BodyId, BodySet, CoordinateType, LinkRef, PoseMap, SimBody},
        collider::{Collider, ColliderId},
        constraints::{Joint, JointId},
        rigidbody::RigidBody,
    },
    dynamics::{
        applicator::{ResolvedGroup, Strategy},
        forces::ForceRegistry,
        integrator::{IntegratedPath, Integrator},
    },
    error::SimulationError,
    events::{
        event::{sort_by_time, ConstraintData, Event, EventClass, EventKind, LimitData},
        parameters::{ContactParameterTable, ContactParameters, ParamKey, ParamSubject},
        tolerances::EventTolerances,
    },
    utils::{allocator::Arena, linalg::VectorN, logging::ScopedTimer},
};

use self::{
    resolution::GroupResolver,
    toi::{Plan, TimeOfImpact},
};

/// View of the driver handed to hooks.
pub struct DriverState<'a> {
    /// Absolute simulation time.
    pub time: f64,
    /// Part of the current step still to be simulated.
    pub remaining: f64,
    pub iteration: usize,
    pub events: &'a [Event],
    pub bodies: &'a BodySet,
}

pub type Hook = Box<dyn FnMut(&DriverState<'_>) + Send>;

/// Optional callbacks invoked synchronously by [`Simulator::step`].
#[derive(Default)]
pub struct StepHooks {
    pub pre_step: Option<Hook>,
    /// After every driver iteration.
    pub post_substep: Option<Hook>,
    pub post_step: Option<Hook>,
    /// Before a batch is resolved; receives the batch.
    pub on_events: Option<Hook>,
    /// After a batch is applied; receives the resolved events.
    pub post_impulse: Option<Hook>,
}

fn notify(hook: &mut Option<Hook>, state: &DriverState<'_>) {
    if let Some(hook) = hook {
        hook(state);
    }
}

/// Counters of the last call to [`Simulator::step`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStats {
    pub iterations: usize,
    /// Groups resolved with an impulse strategy.
    pub impacts: usize,
    pub zeno_collapses: usize,
    pub horizon_reductions: usize,
    pub fallbacks: usize,
    /// Resolved events whose classification tolerance had to be widened.
    pub widened_tolerances: usize,
}

/// Owns bodies, colliders and joints and advances them through time,
/// stopping at every impact to resolve it.
pub struct Simulator {
    config: SimulatorConfig,
    bodies: BodySet,
    colliders: Arena<Collider>,
    joints: Arena<Joint>,
    parameters: ContactParameterTable,
    detector: Box<dyn CollisionDetector + Send>,
    forces: ForceRegistry,
    hooks: StepHooks,
    resolver: GroupResolver,
    integrator: Integrator,
    toi: TimeOfImpact,
    tolerances: EventTolerances,
    time: f64,
    last_events: Vec<Event>,
    last_stats: StepStats,
    fidelity_degraded: bool,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let detector = PrimitiveDetector::new(config.contact_distance_tolerance, config.event_tolerance);
        Self::with_detector(config, detector)
    }

    pub fn with_detector<D: CollisionDetector + Send + 'static>(config: SimulatorConfig, detector: D) -> Self {
        Self {
            bodies: BodySet::new(),
            colliders: Arena::new(),
            joints: Arena::new(),
            parameters: ContactParameterTable::new(config.default_contact),
            detector: Box::new(detector),
            forces: ForceRegistry::new(),
            hooks: StepHooks::default(),
            resolver: GroupResolver::new(&config),
            integrator: Integrator::new(),
            toi: TimeOfImpact::new(config.simultaneous_event_epsilon, config.min_step_size),
            tolerances: EventTolerances::new(),
            time: 0.0,
            last_events: Vec::new(),
            last_stats: StepStats::default(),
            fidelity_degraded: false,
            config,
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn bodies(&self) -> &BodySet {
        &self.bodies
    }

    pub fn bodies_mut(&mut self) -> &mut BodySet {
        &mut self.bodies
    }

    pub fn body(&self, id: BodyId) -> Option<&SimBody> {
        self.bodies.get(id)
    }

    pub fn colliders(&self) -> &Arena<Collider> {
        &self.colliders
    }

    pub fn joints(&self) -> &Arena<Joint> {
        &self.joints
    }

    pub fn forces_mut(&mut self) -> &mut ForceRegistry {
        &mut self.forces
    }

    pub fn hooks_mut(&mut self) -> &mut StepHooks {
        &mut self.hooks
    }

    /// Events resolved during the last step, with their impulses.
    pub fn last_events(&self) -> &[Event] {
        &self.last_events
    }

    pub fn last_step_stats(&self) -> StepStats {
        self.last_stats
    }

    /// Tolerances widened for events an impact failed to stop.
    pub fn event_tolerances(&self) -> &EventTolerances {
        &self.tolerances
    }

    /// Set once a step starts with interpenetrating geometry.
    pub fn fidelity_degraded(&self) -> bool {
        self.fidelity_degraded
    }

    pub fn add_rigid_body(&mut self, body: RigidBody) -> Result<BodyId, SimulationError> {
        let id = self.bodies.insert_rigid(body);
        self.check_inertia(id)
    }

    pub fn add_multibody(&mut self, mechanism: Multibody) -> Result<BodyId, SimulationError> {
        let id = self.bodies.insert_multibody(mechanism);
        self.check_inertia(id)
    }

    fn check_inertia(&mut self, id: BodyId) -> Result<BodyId, SimulationError> {
        let dynamics = self.bodies.dynamics(id)?;
        if dynamics.is_dynamic() {
            let n = dynamics.num_generalized_coordinates(CoordinateType::Spatial);
            if dynamics.generalized_inertia().solve(&VectorN::zeros(n)).is_none() {
                self.bodies.remove(id);
                return Err(SimulationError::SingularInertia(id));
            }
        }
        Ok(id)
    }

    pub fn add_collider(&mut self, collider: Collider) -> Result<ColliderId, SimulationError> {
        if self.bodies.get(collider.link.body).is_none() {
            return Err(SimulationError::UnknownBody(collider.link.body));
        }
        Ok(self.colliders.insert(collider))
    }

    pub fn add_joint(&mut self, joint: Joint) -> Result<JointId, SimulationError> {
        for link in [joint.link_a, joint.link_b] {
            if self.bodies.get(link.body).is_none() {
                return Err(SimulationError::UnknownBody(link.body));
            }
        }
        Ok(self.joints.insert(joint))
    }

    /// Stops the detector from reporting contacts between `a` and `b`.
    pub fn ignore_collision_pair(&mut self, a: ColliderId, b: ColliderId) {
        self.detector.ignore_pair(a, b);
    }

    pub fn set_contact_parameters(&mut self, a: ParamKey, b: ParamKey, params: ContactParameters) {
        self.parameters.insert(a, b, params);
    }

    pub fn contact_parameters_mut(&mut self) -> &mut ContactParameterTable {
        &mut self.parameters
    }

    /// Advances the simulation by `dt` and returns the time advanced.
    pub fn step(&mut self, dt: f64) -> Result<f64, SimulationError> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(SimulationError::InvalidTimeStep(dt));
        }
        let _timer = ScopedTimer::new("simulation step");
        self.last_events.clear();
        self.last_stats = StepStats::default();
        self.check_interpenetration();
        notify(
            &mut self.hooks.pre_step,
            &DriverState {
                time: self.time,
                remaining: dt,
                iteration: 0,
                events: &[],
                bodies: &self.bodies,
            },
        );

        self.bodies.reset_accumulators();
        self.forces.apply_all(&mut self.bodies);
        let external = self.current_forces();
        let mut persistent = external.clone();
        let mut rested: BTreeSet<BodyId> = BTreeSet::new();
        let joint_events = self.joint_events();
        let gravity = self.config.gravity;
        let mut remaining = dt;
        let mut pending: Option<f64> = None;
        let mut iteration = 0;

        while remaining > 0.0 {
            if iteration >= self.config.max_event_iterations {
                warn!(
                    "event iteration cap of {} reached at t = {:.6}; accepting the remaining {remaining:e} s",
                    self.config.max_event_iterations, self.time
                );
                self.load_forces(&persistent)?;
                self.bodies.calc_fwd_dyn(gravity);
                self.integrator.integrate(&mut self.bodies, remaining);
                self.time += remaining;
                break;
            }
            iteration += 1;
            self.last_stats.iterations = iteration;

            let span = pending.take().unwrap_or(remaining).min(remaining);
            self.load_forces(&persistent)?;
            self.bodies.calc_fwd_dyn(gravity);
            self.resolver.solve_joint_forces(
                &joint_events,
                &mut self.bodies,
                &self.joints,
                remaining.max(self.config.min_step_size),
            )?;

            let snapshot = self.bodies.snapshot();
            let start_poses = self.bodies.poses();
            let path = self.integrator.integrate(&mut self.bodies, span);
            let end_poses = self.bodies.poses();
            let mut events = self.collect_events(&path, &start_poses, &end_poses);
            sort_by_time(&mut events);
            debug!("iteration {iteration}: {} events over {span:e} s", events.len());

            let plan = self.toi.plan(&mut events, &path, &mut self.bodies, &rested);
            match plan {
                Plan::Accept => {
                    path.place(&mut self.bodies, span);
                    self.time += span;
                    remaining -= span;
                }
                Plan::Shrink { horizon } => {
                    self.bodies.restore(&snapshot);
                    pending = Some(horizon);
                    self.last_stats.horizon_reductions += 1;
                }
                Plan::Impact { h, start, end } | Plan::Collapse { h, start, end } => {
                    let collapse = matches!(plan, Plan::Collapse { .. });
                    path.place(&mut self.bodies, h);
                    self.time += h;
                    remaining -= h;
                    self.bodies.calc_fwd_dyn(gravity);

                    events.truncate(end);
                    for event in &mut events {
                        event.classify(&self.bodies);
                    }
                    if collapse {
                        for event in &mut events[start..end] {
                            event.set_class(EventClass::Resting);
                        }
                    }
                    events.extend(joint_events.iter().cloned());
                    notify(
                        &mut self.hooks.on_events,
                        &DriverState {
                            time: self.time,
                            remaining,
                            iteration,
                            events: &events,
                            bodies: &self.bodies,
                        },
                    );

                    let strategy = if collapse {
                        Strategy::RestingContact
                    } else {
                        Strategy::Impact
                    };
                    let outcome = self.resolver.resolve(
                        events,
                        &mut self.bodies,
                        &self.joints,
                        strategy,
                        remaining.max(self.config.min_step_size),
                    )?;
                    self.last_stats.fallbacks += outcome.fallbacks;

                    if collapse {
                        self.last_stats.zeno_collapses += 1;
                        for group in &outcome.groups {
                            for (id, force) in &group.contact_forces {
                                if let Some(total) = persistent.get_mut(id) {
                                    total.axpy(1.0, force);
                                }
                            }
                            rested.extend(group.bodies.iter().copied());
                        }
                    } else {
                        self.last_stats.impacts += outcome.groups.len();
                        for group in &outcome.groups {
                            self.last_stats.widened_tolerances +=
                                self.tolerances.widen_unresolved(&group.events, &self.bodies);
                        }
                        for id in outcome.groups.iter().flat_map(|g| g.bodies.iter()) {
                            if rested.remove(id) {
                                if let (Some(total), Some(base)) = (persistent.get_mut(id), external.get(id)) {
                                    *total = base.clone();
                                }
                            }
                        }
                    }
                    self.record(outcome.groups, iteration, remaining);
                }
            }

            notify(
                &mut self.hooks.post_substep,
                &DriverState {
                    time: self.time,
                    remaining,
                    iteration,
                    events: &self.last_events,
                    bodies: &self.bodies,
                },
            );
        }

        notify(
            &mut self.hooks.post_step,
            &DriverState {
                time: self.time,
                remaining: 0.0,
                iteration,
                events: &self.last_events,
                bodies: &self.bodies,
            },
        );
        Ok(dt)
    }

    fn record(&mut self, groups: Vec<ResolvedGroup>, iteration: usize, remaining: f64) {
        let first = self.last_events.len();
        for group in groups {
            self.last_events.extend(group.events);
        }
        notify(
            &mut self.hooks.post_impulse,
            &DriverState {
                time: self.time,
                remaining,
                iteration,
                events: &self.last_events[first..],
                bodies: &self.bodies,
            },
        );
    }

    fn check_interpenetration(&mut self) {
        let poses = self.bodies.poses();
        let found = self
            .detector
            .find_interpenetrations(&self.bodies, &self.colliders, &poses);
        if found.is_empty() {
            return;
        }
        if !self.fidelity_degraded {
            warn!(
                "{} interpenetrating pairs at t = {:.6} (deepest {:e}); non-penetration is no longer guaranteed",
                found.len(),
                self.time,
                found.iter().map(|p| p.depth).fold(0.0, f64::max)
            );
        } else {
            debug!("{} interpenetrating pairs at t = {:.6}", found.len(), self.time);
        }
        self.fidelity_degraded = true;
    }

    fn current_forces(&self) -> BTreeMap<BodyId, VectorN> {
        self.bodies
            .iter()
            .filter(|(_, body)| body.dynamics().is_dynamic())
            .map(|(id, body)| (id, body.dynamics().generalized_force()))
            .collect()
    }

    fn load_forces(&mut self, forces: &BTreeMap<BodyId, VectorN>) -> Result<(), SimulationError> {
        for (&id, force) in forces {
            self.bodies.dynamics_mut(id)?.set_generalized_force(force);
        }
        Ok(())
    }

    fn joint_events(&self) -> Vec<Event> {
        self.joints
            .iter()
            .map(|(id, joint)| {
                Event::constraint(
                    0.0,
                    ConstraintData {
                        joint: id,
                        link_a: joint.link_a,
                        link_b: joint.link_b,
                        normal_impulse: Vec::new(),
                        friction_impulse: 0.0,
                    },
                )
            })
            .collect()
    }

    /// Contact and limit events over the integrated interval, with their
    /// parameters and absolute times filled in.
    fn collect_events(
        &mut self,
        path: &IntegratedPath,
        start: &PoseMap,
        end: &PoseMap,
    ) -> Vec<Event> {
        let mut events = self.detector.detect(&self.bodies, &self.colliders, start, end);

        for state in &path.states {
            let Some(mechanism) = self.bodies.get(state.id).and_then(SimBody::as_multibody) else {
                continue;
            };
            let Some((q0, q1)) = path.endpoints(state.id) else {
                continue;
            };
            for crossing in mechanism.find_limit_events(&q0, &q1, self.config.contact_distance_tolerance) {
                let data = LimitData {
                    body: state.id,
                    link: crossing.link,
                    dof: crossing.dof,
                    upper: crossing.upper,
                    restitution: crossing.restitution,
                    impulse: 0.0,
                };
                events.push(Event::limit(crossing.t, data, self.config.event_tolerance));
            }
        }

        for event in &mut events {
            event.t_true = self.time + event.t * path.span;
            if let EventKind::Contact(contact) = &mut event.kind {
                let a = self.subject(contact.link_a, contact.collider_a);
                let b = self.subject(contact.link_b, contact.collider_b);
                contact.params = self.parameters.lookup(&a, &b);
            }
        }
        self.tolerances.apply(&mut events);
        events
    }

    fn subject(&self, body: LinkRef, geometry: Option<ColliderId>) -> ParamSubject {
        let mechanism = self
            .bodies
            .get(body.body)
            .filter(|b| b.is_articulated())
            .map(|_| body.body);
        ParamSubject {
            geometry,
            body,
            mechanism,
        }
    }

    /// Kinetic energy of every body.
    pub fn kinetic_energy(&self) -> f64 {
        self.bodies.total_kinetic_energy()
    }

    pub fn gravity(&self) -> DVec3 {
        self.config.gravity
    }
}
