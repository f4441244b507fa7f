//! Group-wise resolution of an event batch with strategy fallback.

use log::debug;

use crate::{
    config::SimulatorConfig,
    core::{body::BodySet, constraints::Joint},
    dynamics::{
        applicator::{FallbackReason, ImpulseApplicator, Resolution, ResolvedGroup, Strategy},
        problem::{ProblemBuilder, SolveMode},
        solver::{decode_impulses, ContactSolver},
    },
    error::SimulationError,
    events::{
        event::Event,
        grouping::{reduce_minimal_set, remove_nonimpacting_groups, EventGroup, EventGrouper},
    },
    utils::{allocator::Arena, logging::ScopedTimer},
};

/// Resolved groups of one batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub groups: Vec<ResolvedGroup>,
    /// Strategies abandoned across all groups.
    pub fallbacks: usize,
}

/// Groups, builds, solves and applies event batches.
#[derive(Debug)]
pub struct GroupResolver {
    pub builder: ProblemBuilder,
    pub solver: ContactSolver,
    pub applicator: ImpulseApplicator,
    pub minimal_set_reduction: bool,
    /// Contacts closer than this are merged by the minimal-set reduction.
    pub point_tolerance: f64,
    grouper: EventGrouper,
}

impl GroupResolver {
    pub fn new(config: &SimulatorConfig) -> Self {
        Self {
            builder: ProblemBuilder::new(config.parallel_assembly, config.event_tolerance),
            solver: ContactSolver::new(config.lcp, config.event_tolerance),
            applicator: ImpulseApplicator::new(config.energy, config.gravity),
            minimal_set_reduction: config.minimal_set_reduction,
            point_tolerance: config.contact_distance_tolerance,
            grouper: EventGrouper::new(),
        }
    }

    /// Resolves every group of `events`, each starting at `strategy` and
    /// falling back along the chain. Impulse strategies ignore groups without
    /// an impacting event. `horizon` is the remaining interval.
    pub fn resolve(
        &mut self,
        events: Vec<Event>,
        bodies: &mut BodySet,
        joints: &Arena<Joint>,
        strategy: Strategy,
        horizon: f64,
    ) -> Result<BatchOutcome, SimulationError> {
        let _timer = ScopedTimer::new("resolve event batch");
        let mut groups = {
            let _timer = ScopedTimer::new("group events");
            self.grouper.group(events, bodies)
        };
        if strategy != Strategy::RestingContact {
            remove_nonimpacting_groups(&mut groups);
        }

        let mut outcome = BatchOutcome::default();
        for mut group in groups {
            if group.events.iter().all(Event::is_bilateral) {
                continue;
            }
            if self.minimal_set_reduction {
                reduce_minimal_set(&mut group.events, bodies, self.point_tolerance);
            }
            debug!(
                "resolving group of {} events over {} bodies with {strategy:?}",
                group.len(),
                group.bodies.len()
            );

            let mut current = strategy;
            loop {
                match self.resolve_group(&group, bodies, joints, current, horizon) {
                    Resolution::Resolved(resolved) => {
                        outcome.groups.push(resolved);
                        break;
                    }
                    Resolution::Fallback(reason) => {
                        let Some(next) = current.fallback() else {
                            break;
                        };
                        debug!("{current:?} rejected ({reason:?}); falling back to {next:?}");
                        outcome.fallbacks += 1;
                        current = next;
                    }
                    Resolution::Fatal(error) => return Err(error),
                }
            }
        }
        Ok(outcome)
    }

    /// One attempt at resolving `group` with `strategy`. Solver failures and
    /// energy gains fall back unless `strategy` is the last resort, which
    /// reports solver failures as fatal and accepts energy gains.
    pub fn resolve_group(
        &mut self,
        group: &EventGroup,
        bodies: &mut BodySet,
        joints: &Arena<Joint>,
        strategy: Strategy,
        horizon: f64,
    ) -> Resolution {
        let mode = strategy.mode(horizon);
        let mut problem = match self.builder.build(&group.events, bodies, joints, mode) {
            Ok(problem) => problem,
            Err(error) => return Resolution::Fatal(error),
        };
        let solution = match self.solver.solve(&mut problem) {
            Ok(solution) => solution,
            Err(source) if strategy.is_last() => {
                return Resolution::Fatal(SimulationError::SolverFailure {
                    events: group.len(),
                    source,
                })
            }
            Err(source) => return Resolution::Fallback(FallbackReason::Solver(source)),
        };

        let change = match self.applicator.apply(
            &problem,
            &solution.magnitudes,
            bodies,
            horizon,
            !strategy.is_last(),
        ) {
            Ok(change) => change,
            Err(error) => return Resolution::Fatal(error),
        };
        if change.rolled_back {
            return Resolution::Fallback(FallbackReason::EnergyGain {
                before: change.before,
                after: change.after,
            });
        }

        let mut events = group.events.clone();
        decode_impulses(&problem, &solution.magnitudes, &mut events);
        let contact_forces = if mode.is_force() {
            problem.generalized_forces(&solution.magnitudes, false)
        } else {
            Vec::new()
        };
        Resolution::Resolved(ResolvedGroup {
            events,
            bodies: group.bodies.clone(),
            strategy,
            pivots: solution.pivots,
            transitions: solution.transitions,
            energy_before: change.before,
            energy_after: change.after,
            contact_forces,
        })
    }

    /// Force-level solve of the bilateral joint rows alone; the joint forces
    /// are accumulated and forward dynamics recomputed.
    pub fn solve_joint_forces(
        &mut self,
        events: &[Event],
        bodies: &mut BodySet,
        joints: &Arena<Joint>,
        horizon: f64,
    ) -> Result<(), SimulationError> {
        if events.is_empty() {
            return Ok(());
        }
        let _timer = ScopedTimer::new("solve joint forces");
        let mut problem = self
            .builder
            .build(events, bodies, joints, SolveMode::Force { horizon })?;
        if problem.is_empty() {
            return Ok(());
        }
        let solution = self
            .solver
            .solve(&mut problem)
            .map_err(|source| SimulationError::SolverFailure {
                events: events.len(),
                source,
            })?;
        for (id, force) in problem.generalized_forces(&solution.magnitudes, true) {
            let dynamics = bodies.dynamics_mut(id)?;
            dynamics.add_generalized_force(&force);
            dynamics.calc_fwd_dyn(self.applicator.gravity);
        }
        Ok(())
    }
}
