//! Global configuration constants and the simulator settings.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::events::parameters::ContactParameters;

/// Default gravity vector applied to every dynamic body (Y-up).
pub const DEFAULT_GRAVITY: DVec3 = DVec3::new(0.0, -9.81, 0.0);

/// Shortest interval the driver integrates over before collapsing a cluster.
pub const DEFAULT_MIN_STEP_SIZE: f64 = 1e-8;

/// Upper bound on driver iterations within one call to `step`.
pub const DEFAULT_MAX_EVENT_ITERATIONS: usize = 256;

/// Relative velocity band classified as resting.
pub const DEFAULT_EVENT_TOLERANCE: f64 = 1e-6;

/// Separation below which two geometries count as touching.
pub const DEFAULT_CONTACT_DISTANCE_TOLERANCE: f64 = 1e-6;

/// Fractional-time window within which events are simultaneous.
pub const DEFAULT_SIMULTANEOUS_EVENT_EPSILON: f64 = 1e-9;

/// Horizon used to extrapolate kinetic energy after a force-level resolution.
pub const DEFAULT_ENERGY_HORIZON: f64 = 1e-3;

pub const DEFAULT_ENERGY_ABSOLUTE_TOLERANCE: f64 = 1e-9;
pub const DEFAULT_ENERGY_RELATIVE_TOLERANCE: f64 = 1e-6;

/// Pivot budget of the complementarity solver, per unknown.
pub const DEFAULT_MAX_PIVOTS_FACTOR: usize = 50;

pub const DEFAULT_REGULARIZATION_START: f64 = 1e-12;
pub const DEFAULT_REGULARIZATION_MAX: f64 = 1e-4;

/// Settings of the pivoting complementarity solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LcpSettings {
    /// The pivot limit is `max_pivots_factor * n + 100`.
    pub max_pivots_factor: usize,
    /// Pivot and ratio-test tolerance.
    pub zero_tolerance: f64,
    /// First diagonal regularization tried after a failed solve.
    pub regularization_start: f64,
    /// Regularization is multiplied by ten per retry up to this value.
    pub regularization_max: f64,
}

impl Default for LcpSettings {
    fn default() -> Self {
        Self {
            max_pivots_factor: DEFAULT_MAX_PIVOTS_FACTOR,
            zero_tolerance: 1e-12,
            regularization_start: DEFAULT_REGULARIZATION_START,
            regularization_max: DEFAULT_REGULARIZATION_MAX,
        }
    }
}

/// Thresholds of the post-application kinetic energy check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyCheck {
    pub horizon: f64,
    pub absolute_tolerance: f64,
    pub relative_tolerance: f64,
}

impl Default for EnergyCheck {
    fn default() -> Self {
        Self {
            horizon: DEFAULT_ENERGY_HORIZON,
            absolute_tolerance: DEFAULT_ENERGY_ABSOLUTE_TOLERANCE,
            relative_tolerance: DEFAULT_ENERGY_RELATIVE_TOLERANCE,
        }
    }
}

impl EnergyCheck {
    /// Whether going from `before` to `after` is more than numerical noise.
    pub fn is_gain(&self, before: f64, after: f64) -> bool {
        after > before + self.absolute_tolerance + self.relative_tolerance * before.abs()
    }
}

/// Settings of the time-stepping driver and its resolution pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub gravity: DVec3,
    pub min_step_size: f64,
    pub max_event_iterations: usize,
    pub event_tolerance: f64,
    pub contact_distance_tolerance: f64,
    pub simultaneous_event_epsilon: f64,
    pub energy: EnergyCheck,
    pub lcp: LcpSettings,
    /// Parameters used when a contacting pair has no registered entry.
    pub default_contact: ContactParameters,
    /// Drop duplicate and interior contacts before building a group problem.
    pub minimal_set_reduction: bool,
    /// Assemble coupling rows of large groups on the rayon pool.
    pub parallel_assembly: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            gravity: DEFAULT_GRAVITY,
            min_step_size: DEFAULT_MIN_STEP_SIZE,
            max_event_iterations: DEFAULT_MAX_EVENT_ITERATIONS,
            event_tolerance: DEFAULT_EVENT_TOLERANCE,
            contact_distance_tolerance: DEFAULT_CONTACT_DISTANCE_TOLERANCE,
            simultaneous_event_epsilon: DEFAULT_SIMULTANEOUS_EVENT_EPSILON,
            energy: EnergyCheck::default(),
            lcp: LcpSettings::default(),
            default_contact: ContactParameters::default(),
            minimal_set_reduction: true,
            parallel_assembly: cfg!(feature = "parallel"),
        }
    }
}

impl SimulatorConfig {
    pub fn with_gravity(mut self, gravity: DVec3) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_default_contact(mut self, params: ContactParameters) -> Self {
        self.default_contact = params;
        self
    }
}
