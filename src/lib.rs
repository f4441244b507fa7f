//! Event Dynamics – event-driven rigid body simulation for Rust.
//!
//! Bodies are integrated until the next contact, joint-limit or impact event.
//! Simultaneous events are grouped by connectivity, each group is posed as a
//! linear complementarity problem with a polygonal friction cone, and the
//! solved impulses or forces are applied under a kinetic energy guard.

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod events;
pub mod utils;
pub mod world;

pub use glam::{DMat3, DQuat, DVec3};

pub use collision::{CollisionDetector, Interpenetration, PrimitiveDetector};
pub use config::{EnergyCheck, LcpSettings, SimulatorConfig};
pub use core::{
    articulations::{JointLimit, JointType, Link, Multibody},
    body::{BodyId, BodySet, CoordinateType, DynamicBody, LinkRef, SimBody},
    collider::{Collider, ColliderId, ColliderShape},
    constraints::{Joint, JointId, JointKind},
    rigidbody::RigidBody,
    types::{MassProperties, Transform, Velocity},
};
pub use dynamics::{
    applicator::Strategy,
    forces::{DragForce, ForceGenerator, ForceRegistry, StokesDrag},
    lcp::LemkeSolver,
    problem::{ContactProblem, ProblemBuilder, SolveMode},
    solver::ContactSolver,
};
pub use error::{LcpError, SimulationError};
pub use events::{
    event::{ContactData, Event, EventClass, EventKind},
    grouping::{EventGroup, EventGrouper},
    parameters::{ContactParameterTable, ContactParameters, FrictionEdges, ParamKey},
    tolerances::{EventKey, EventTolerances},
};
pub use utils::allocator::{Arena, Handle};
pub use world::{DriverState, Hook, Simulator, StepHooks, StepStats};
