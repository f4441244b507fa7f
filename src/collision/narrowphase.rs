use std::collections::BTreeSet;

use glam::DVec3;
use log::debug;

use super::{CollisionDetector, Interpenetration};
use crate::{
    config::{DEFAULT_CONTACT_DISTANCE_TOLERANCE, DEFAULT_EVENT_TOLERANCE},
    core::{
        body::{BodySet, PoseMap},
        collider::{Collider, ColliderId, ColliderShape},
        types::Transform,
    },
    events::event::{ContactData, Event},
    utils::{
        allocator::Arena,
        logging::{ScopedTimer, WarnOnce},
    },
};

/// Closest features of two geometries. The normal points from the second
/// geometry towards the first; the point lies midway between the surfaces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proximity {
    /// Signed separation, negative when overlapping.
    pub distance: f64,
    pub point: DVec3,
    pub normal: DVec3,
    /// Radii of curvature of the first and second surface at the point.
    pub curvature: [f64; 2],
}

impl Proximity {
    fn flipped(self) -> Self {
        Self {
            normal: -self.normal,
            curvature: [self.curvature[1], self.curvature[0]],
            ..self
        }
    }
}

/// World normal and offset of a plane collider.
fn plane_in_world(normal: DVec3, offset: f64, pose: &Transform) -> (DVec3, f64) {
    let n = pose.transform_vector(normal);
    (n, offset + n.dot(pose.position))
}

fn sphere_plane(center: DVec3, radius: f64, normal: DVec3, offset: f64) -> Proximity {
    let height = normal.dot(center) - offset;
    let distance = height - radius;
    Proximity {
        distance,
        point: center - normal * (radius + 0.5 * distance),
        normal,
        curvature: [radius, 0.0],
    }
}

fn sphere_sphere(center_a: DVec3, radius_a: f64, center_b: DVec3, radius_b: f64) -> Proximity {
    let delta = center_a - center_b;
    let length = delta.length();
    let normal = if length > 1e-12 { delta / length } else { DVec3::Y };
    let distance = length - radius_a - radius_b;
    Proximity {
        distance,
        point: center_b + normal * (radius_b + 0.5 * distance),
        normal,
        curvature: [radius_a, radius_b],
    }
}

/// One candidate per box vertex, in a fixed vertex order.
fn box_plane(pose: &Transform, half_extents: DVec3, (normal, offset): (DVec3, f64)) -> Vec<Proximity> {
    (0..8)
        .map(|corner| {
            let sign = |bit: usize| if corner & bit == 0 { -1.0 } else { 1.0 };
            let local = half_extents * DVec3::new(sign(1), sign(2), sign(4));
            let vertex = pose.transform_point(local);
            let distance = normal.dot(vertex) - offset;
            Proximity {
                distance,
                point: vertex - normal * (0.5 * distance),
                normal,
                curvature: [0.0; 2],
            }
        })
        .collect()
}

/// Normal points from the box towards the sphere.
fn sphere_box(center: DVec3, radius: f64, pose: &Transform, half_extents: DVec3) -> Proximity {
    let local = pose.inverse_transform_point(center);
    let clamped = local.clamp(-half_extents, half_extents);
    let delta = local - clamped;

    let (local_normal, surface, distance) = if delta.length_squared() > 1e-24 {
        let length = delta.length();
        (delta / length, clamped, length - radius)
    } else {
        // Center inside the box: leave through the nearest face.
        let mut axis = 0;
        for i in 1..3 {
            if half_extents[i] - local[i].abs() < half_extents[axis] - local[axis].abs() {
                axis = i;
            }
        }
        let sign = if local[axis] >= 0.0 { 1.0 } else { -1.0 };
        let mut local_normal = DVec3::ZERO;
        local_normal[axis] = sign;
        let mut surface = local;
        surface[axis] = sign * half_extents[axis];
        let depth = half_extents[axis] - local[axis].abs();
        (local_normal, surface, -depth - radius)
    };

    let normal = pose.transform_vector(local_normal);
    let box_point = pose.transform_point(surface);
    let sphere_point = center - normal * radius;
    Proximity {
        distance,
        point: 0.5 * (box_point + sphere_point),
        normal,
        curvature: [radius, 0.0],
    }
}

/// Closest features of a shape pair, or `None` when the pair is not supported.
/// The returned list has a fixed length and order for a given pair of shapes.
pub fn proximities(a: &ColliderShape, pose_a: &Transform, b: &ColliderShape, pose_b: &Transform) -> Option<Vec<Proximity>> {
    use ColliderShape::{Box, Plane, Sphere};

    let features = match (*a, *b) {
        (Sphere { radius }, Plane { normal, offset }) => {
            let (n, d) = plane_in_world(normal, offset, pose_b);
            vec![sphere_plane(pose_a.position, radius, n, d)]
        }
        (Plane { normal, offset }, Sphere { radius }) => {
            let (n, d) = plane_in_world(normal, offset, pose_a);
            vec![sphere_plane(pose_b.position, radius, n, d).flipped()]
        }
        (Sphere { radius: radius_a }, Sphere { radius: radius_b }) => {
            vec![sphere_sphere(pose_a.position, radius_a, pose_b.position, radius_b)]
        }
        (Box { half_extents }, Plane { normal, offset }) => {
            box_plane(pose_a, half_extents, plane_in_world(normal, offset, pose_b))
        }
        (Plane { normal, offset }, Box { half_extents }) => {
            box_plane(pose_b, half_extents, plane_in_world(normal, offset, pose_a))
                .into_iter()
                .map(Proximity::flipped)
                .collect()
        }
        (Sphere { radius }, Box { half_extents }) => {
            vec![sphere_box(pose_a.position, radius, pose_b, half_extents)]
        }
        (Box { half_extents }, Sphere { radius }) => {
            vec![sphere_box(pose_b.position, radius, pose_a, half_extents).flipped()]
        }
        _ => return None,
    };
    Some(features)
}

type ColliderPair<'a> = ((ColliderId, &'a Collider), (ColliderId, &'a Collider));

/// Reference detector for spheres, boxes and planes.
///
/// Signed distances are evaluated at both ends of the interval and the
/// crossing time interpolated linearly; the contact frame is then taken at
/// the interpolated poses. Features already within `distance_tolerance` at
/// the start are reported at `t = 0`.
#[derive(Debug)]
pub struct PrimitiveDetector {
    pub distance_tolerance: f64,
    /// Classification band given to the events produced.
    pub event_tolerance: f64,
    /// Pairs never checked, stored with the smaller id first.
    unchecked_pairs: BTreeSet<(ColliderId, ColliderId)>,
    unsupported: WarnOnce<(ColliderId, ColliderId)>,
}

impl Default for PrimitiveDetector {
    fn default() -> Self {
        Self::new(DEFAULT_CONTACT_DISTANCE_TOLERANCE, DEFAULT_EVENT_TOLERANCE)
    }
}

impl PrimitiveDetector {
    pub fn new(distance_tolerance: f64, event_tolerance: f64) -> Self {
        Self {
            distance_tolerance,
            event_tolerance,
            unchecked_pairs: BTreeSet::new(),
            unsupported: WarnOnce::default(),
        }
    }

    pub fn is_ignored(&self, a: ColliderId, b: ColliderId) -> bool {
        self.unchecked_pairs.contains(&(a.min(b), a.max(b)))
    }

    /// Pairs on different bodies where at least one side can move.
    fn candidate_pairs<'a>(&self, bodies: &BodySet, colliders: &'a Arena<Collider>) -> Vec<ColliderPair<'a>> {
        let all: Vec<(ColliderId, &Collider)> = colliders.iter().collect();
        let mut pairs = Vec::new();
        for (i, &(id_a, a)) in all.iter().enumerate() {
            for &(id_b, b) in &all[i + 1..] {
                if a.link.body == b.link.body || self.is_ignored(id_a, id_b) {
                    continue;
                }
                if bodies.super_body(a.link).is_none() && bodies.super_body(b.link).is_none() {
                    continue;
                }
                pairs.push(((id_a, a), (id_b, b)));
            }
        }
        pairs
    }

    /// Fraction of the interval at which the separation reaches zero.
    fn crossing(&self, start: f64, end: f64) -> Option<f64> {
        if start <= self.distance_tolerance {
            Some(0.0)
        } else if end <= self.distance_tolerance {
            Some((start / (start - end)).clamp(0.0, 1.0))
        } else {
            None
        }
    }

    /// Swept bounding sphere test.
    fn may_touch(&self, a: &Collider, a0: &Transform, a1: &Transform, b: &Collider, b0: &Transform, b1: &Transform) -> bool {
        let (radius_a, radius_b) = (a.bounding_radius(), b.bounding_radius());
        if !radius_a.is_finite() || !radius_b.is_finite() {
            return true;
        }
        let sweep_a = 0.5 * (a1.position - a0.position).length();
        let sweep_b = 0.5 * (b1.position - b0.position).length();
        let mid_a = a0.position.lerp(a1.position, 0.5);
        let mid_b = b0.position.lerp(b1.position, 0.5);
        mid_a.distance(mid_b) <= radius_a + sweep_a + radius_b + sweep_b + self.distance_tolerance
    }
}

impl CollisionDetector for PrimitiveDetector {
    fn detect(
        &mut self,
        bodies: &BodySet,
        colliders: &Arena<Collider>,
        start: &PoseMap,
        end: &PoseMap,
    ) -> Vec<Event> {
        let _timer = ScopedTimer::new("collision detection");
        let mut events = Vec::new();

        for ((id_a, a), (id_b, b)) in self.candidate_pairs(bodies, colliders) {
            let (Some(a0), Some(a1), Some(b0), Some(b1)) = (
                start.get(&a.link),
                end.get(&a.link),
                start.get(&b.link),
                end.get(&b.link),
            ) else {
                continue;
            };
            let (a0, a1) = (a.world_transform(a0), a.world_transform(a1));
            let (b0, b1) = (b.world_transform(b0), b.world_transform(b1));
            if !self.may_touch(a, &a0, &a1, b, &b0, &b1) {
                continue;
            }

            let (Some(at_start), Some(at_end)) = (
                proximities(&a.shape, &a0, &b.shape, &b0),
                proximities(&a.shape, &a1, &b.shape, &b1),
            ) else {
                self.unsupported.warn((id_a, id_b), || {
                    format!("no contact model for {:?} against {:?}", a.shape, b.shape)
                });
                continue;
            };

            for (feature, (s, e)) in at_start.iter().zip(&at_end).enumerate() {
                let Some(t) = self.crossing(s.distance, e.distance) else {
                    continue;
                };
                let closest = if t == 0.0 {
                    *s
                } else {
                    let pose_a = a0.interpolate(&a1, t);
                    let pose_b = b0.interpolate(&b1, t);
                    proximities(&a.shape, &pose_a, &b.shape, &pose_b)
                        .and_then(|features| features.get(feature).copied())
                        .unwrap_or(*e)
                };
                let Ok(contact) = ContactData::new(a.link, b.link, closest.point, closest.normal) else {
                    continue;
                };
                let [radius_a, radius_b] = closest.curvature;
                let contact = contact
                    .with_colliders(id_a, id_b)
                    .with_curvature(radius_a, radius_b);
                events.push(Event::contact(t, contact, self.event_tolerance));
            }
        }

        debug!("detected {} contact events", events.len());
        events
    }

    fn ignore_pair(&mut self, a: ColliderId, b: ColliderId) {
        self.unchecked_pairs.insert((a.min(b), a.max(b)));
    }

    fn find_interpenetrations(
        &mut self,
        bodies: &BodySet,
        colliders: &Arena<Collider>,
        poses: &PoseMap,
    ) -> Vec<Interpenetration> {
        let mut found = Vec::new();
        for ((id_a, a), (id_b, b)) in self.candidate_pairs(bodies, colliders) {
            let (Some(pose_a), Some(pose_b)) = (poses.get(&a.link), poses.get(&b.link)) else {
                continue;
            };
            let pose_a = a.world_transform(pose_a);
            let pose_b = b.world_transform(pose_b);
            let Some(features) = proximities(&a.shape, &pose_a, &b.shape, &pose_b) else {
                continue;
            };
            let deepest = features
                .iter()
                .map(|p| p.distance)
                .fold(f64::INFINITY, f64::min);
            if deepest < -self.distance_tolerance {
                found.push(Interpenetration {
                    collider_a: id_a,
                    collider_b: id_b,
                    depth: -deepest,
                });
            }
        }
        found
    }
}
