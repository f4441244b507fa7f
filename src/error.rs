//! Error types surfaced by the simulator.

use glam::DVec3;
use thiserror::Error;

use crate::core::{body::BodyId, constraints::JointId};

/// Failure of the pivoting complementarity solver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LcpError {
    #[error("ray termination after {pivots} pivots")]
    RayTermination { pivots: usize },
    #[error("pivot limit of {limit} reached")]
    PivotLimit { limit: usize },
    #[error("problem data contains non-finite values")]
    NonFinite,
    #[error("matrix is {rows}x{cols} but the vector has {len} entries")]
    DimensionMismatch { rows: usize, cols: usize, len: usize },
    #[error("bilateral constraint block is singular")]
    SingularEqualityBlock,
}

/// Fatal errors of a simulation step.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("no feasible complementarity solution for a group of {events} events")]
    SolverFailure {
        events: usize,
        #[source]
        source: LcpError,
    },
    #[error("unknown body {0:?}")]
    UnknownBody(BodyId),
    #[error("unknown joint {0:?}")]
    UnknownJoint(JointId),
    #[error("invalid time step {0}")]
    InvalidTimeStep(f64),
    #[error("body {0:?} has a singular generalized inertia")]
    SingularInertia(BodyId),
    #[error("contact normal {0} has no direction")]
    DegenerateNormal(DVec3),
}
