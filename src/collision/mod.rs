//! Collision detection: the detector contract consumed by the driver and a
//! reference detector for primitive shapes.

pub mod narrowphase;

use crate::{
    core::{
        body::{BodySet, PoseMap},
        collider::{Collider, ColliderId},
    },
    events::event::Event,
    utils::allocator::Arena,
};

pub use narrowphase::{PrimitiveDetector, Proximity};

/// Two geometries overlapping by more than the contact tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpenetration {
    pub collider_a: ColliderId,
    pub collider_b: ColliderId,
    pub depth: f64,
}

/// Produces contact events over an interval whose link poses at both ends are
/// given. Event times are fractions of the interval in `[0, 1]`.
pub trait CollisionDetector {
    fn detect(
        &mut self,
        bodies: &BodySet,
        colliders: &Arena<Collider>,
        start: &PoseMap,
        end: &PoseMap,
    ) -> Vec<Event>;

    /// Excludes the pair of geometries from detection from now on.
    fn ignore_pair(&mut self, a: ColliderId, b: ColliderId);

    /// Overlaps at a single configuration; used for diagnostics only.
    fn find_interpenetrations(
        &mut self,
        bodies: &BodySet,
        colliders: &Arena<Collider>,
        poses: &PoseMap,
    ) -> Vec<Interpenetration>;
}
