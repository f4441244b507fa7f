//! Application of solved constraint magnitudes to bodies, guarded by a
//! kinetic energy check with rollback.

use glam::DVec3;
use log::warn;

use super::problem::{ContactProblem, SolveMode};
use crate::{
    config::EnergyCheck,
    core::body::{BodyId, BodySet, CoordinateType},
    error::{LcpError, SimulationError},
    events::event::Event,
    utils::{linalg::VectorN, logging::ScopedTimer},
};

/// Resolution model, ordered from preferred to last resort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Strategy {
    /// Force-level solve over the remaining horizon.
    RestingContact,
    /// Velocity-level impulses with Newton restitution.
    Impact,
    /// Velocity-level impulses with restitution forced to zero.
    InelasticImpact,
}

impl Strategy {
    /// The strategy tried when this one is rejected.
    pub fn fallback(self) -> Option<Strategy> {
        match self {
            Strategy::RestingContact => Some(Strategy::Impact),
            Strategy::Impact => Some(Strategy::InelasticImpact),
            Strategy::InelasticImpact => None,
        }
    }

    pub fn mode(self, horizon: f64) -> SolveMode {
        match self {
            Strategy::RestingContact => SolveMode::Force { horizon },
            Strategy::Impact => SolveMode::Impulse { restitution: true },
            Strategy::InelasticImpact => SolveMode::Impulse { restitution: false },
        }
    }

    pub fn is_last(self) -> bool {
        self.fallback().is_none()
    }
}

/// Why a strategy was abandoned for a group.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    EnergyGain { before: f64, after: f64 },
    Solver(LcpError),
}

/// A group whose resolution was applied.
#[derive(Debug, Clone)]
pub struct ResolvedGroup {
    /// Events with their impulses filled in.
    pub events: Vec<Event>,
    pub bodies: Vec<BodyId>,
    pub strategy: Strategy,
    pub pivots: usize,
    pub transitions: usize,
    pub energy_before: f64,
    pub energy_after: f64,
    /// Generalized contact forces of a force-level resolution, without joint
    /// contributions; empty for impulse resolutions.
    pub contact_forces: Vec<(BodyId, VectorN)>,
}

/// Outcome of resolving one group with one strategy.
#[derive(Debug)]
pub enum Resolution {
    Resolved(ResolvedGroup),
    Fallback(FallbackReason),
    Fatal(SimulationError),
}

/// Kinetic energy of a group before and after application.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyChange {
    pub before: f64,
    pub after: f64,
    /// The change exceeded the noise threshold and the application was undone.
    pub rolled_back: bool,
}

struct SavedState {
    id: BodyId,
    velocity: VectorN,
    force: VectorN,
}

#[derive(Debug, Clone, Copy)]
pub struct ImpulseApplicator {
    pub energy: EnergyCheck,
    pub gravity: DVec3,
}

impl ImpulseApplicator {
    pub fn new(energy: EnergyCheck, gravity: DVec3) -> Self {
        Self { energy, gravity }
    }

    /// Applies `magnitudes` of `problem` to its bodies. Impulses change the
    /// velocities directly; forces are accumulated and forward dynamics is
    /// recomputed. With `enforce` set, an energy gain rolls the bodies back.
    pub fn apply(
        &self,
        problem: &ContactProblem,
        magnitudes: &VectorN,
        bodies: &mut BodySet,
        remaining: f64,
        enforce: bool,
    ) -> Result<EnergyChange, SimulationError> {
        let _timer = ScopedTimer::new("apply constraint magnitudes");
        let horizon = self.energy.horizon.min(remaining);
        let before = self.group_energy(problem.mode, &problem.bodies, bodies, horizon)?;

        let saved = problem
            .bodies
            .iter()
            .map(|&id| {
                let dynamics = bodies.dynamics(id)?;
                Ok(SavedState {
                    id,
                    velocity: dynamics.generalized_velocity(CoordinateType::Spatial),
                    force: dynamics.generalized_force(),
                })
            })
            .collect::<Result<Vec<_>, SimulationError>>()?;

        for (id, force) in problem.generalized_forces(magnitudes, true) {
            let dynamics = bodies.dynamics_mut(id)?;
            match problem.mode {
                SolveMode::Impulse { .. } => dynamics.apply_generalized_impulse(&force),
                SolveMode::Force { .. } => dynamics.add_generalized_force(&force),
            }
        }
        for &id in &problem.bodies {
            bodies.dynamics_mut(id)?.calc_fwd_dyn(self.gravity);
        }

        let after = self.group_energy(problem.mode, &problem.bodies, bodies, horizon)?;
        if !self.energy.is_gain(before, after) {
            return Ok(EnergyChange {
                before,
                after,
                rolled_back: false,
            });
        }
        if !enforce {
            warn!("accepting kinetic energy gain {before:.6e} -> {after:.6e}");
            return Ok(EnergyChange {
                before,
                after,
                rolled_back: false,
            });
        }

        warn!("kinetic energy gain {before:.6e} -> {after:.6e}; rolling back");
        for state in saved {
            let dynamics = bodies.dynamics_mut(state.id)?;
            dynamics.set_generalized_velocity(CoordinateType::Spatial, &state.velocity);
            dynamics.set_generalized_force(&state.force);
            dynamics.calc_fwd_dyn(self.gravity);
        }
        Ok(EnergyChange {
            before,
            after,
            rolled_back: true,
        })
    }

    /// Actual kinetic energy for impulses; for forces, the energy after
    /// following the current accelerations for `horizon` seconds.
    fn group_energy(
        &self,
        mode: SolveMode,
        ids: &[BodyId],
        bodies: &mut BodySet,
        horizon: f64,
    ) -> Result<f64, SimulationError> {
        if !mode.is_force() {
            return Ok(bodies.kinetic_energy(ids));
        }
        let mut total = 0.0;
        for &id in ids {
            let dynamics = bodies.dynamics_mut(id)?;
            let velocity = dynamics.generalized_velocity(CoordinateType::Spatial);
            let mut extrapolated = velocity.clone();
            extrapolated.axpy(horizon, &dynamics.generalized_acceleration());
            dynamics.set_generalized_velocity(CoordinateType::Spatial, &extrapolated);
            total += dynamics.kinetic_energy();
            dynamics.set_generalized_velocity(CoordinateType::Spatial, &velocity);
        }
        Ok(total)
    }
}
