//! Bodies, mechanisms, joints and colliders owned by the simulator.

pub mod articulations;
pub mod body;
pub mod collider;
pub mod constraints;
pub mod rigidbody;
pub mod types;

pub use articulations::{JointLimit, JointType, LimitCrossing, Link, Multibody};
pub use body::{BodyId, BodySet, BodySnapshot, CoordinateType, DynamicBody, LinkRef, SimBody};
pub use collider::{Collider, ColliderId, ColliderShape};
pub use constraints::{Joint, JointId, JointKind, JointRow};
pub use rigidbody::RigidBody;
pub use types::{MassProperties, Transform, Velocity};
