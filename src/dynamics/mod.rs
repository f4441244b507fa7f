//! Simulation dynamics: articulated-body dynamics, integration, force
//! generators, and the constraint pipeline (problem assembly, friction
//! pyramid, complementarity solver, application).

pub mod applicator;
pub mod articulated;
pub mod forces;
pub mod friction;
pub mod integrator;
pub mod lcp;
pub mod problem;
pub mod solver;

pub use applicator::{EnergyChange, FallbackReason, ImpulseApplicator, Resolution, ResolvedGroup, Strategy};
pub use articulated::{LinkMotion, NewtonEuler};
pub use forces::{DragForce, ForceGenerator, ForceRegistry, StokesDrag};
pub use friction::FrictionPyramid;
pub use integrator::{IntegratedPath, Integrator, PathState};
pub use lcp::LemkeSolver;
pub use problem::{ContactProblem, FrictionState, ProblemBuilder, RowKind, SolveMode};
pub use solver::{decode_impulses, ContactSolution, ContactSolver};
