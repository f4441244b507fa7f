use std::cmp::Ordering;

use glam::DVec3;

use super::parameters::ContactParameters;
use crate::{
    core::{
        body::{BodyId, BodySet, CoordinateType, LinkRef},
        collider::ColliderId,
        constraints::JointId,
    },
    error::SimulationError,
    utils::{math::tangent_basis, spatial::SpatialVec},
};

/// Kinematic state of an event at the instant it is examined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EventClass {
    #[default]
    Undetermined,
    Separating,
    Resting,
    Impacting,
}

impl EventClass {
    pub fn from_velocity(velocity: f64, tolerance: f64) -> Self {
        if velocity < -tolerance {
            EventClass::Impacting
        } else if velocity > tolerance {
            EventClass::Separating
        } else {
            EventClass::Resting
        }
    }
}

/// A contact between two links. The normal points from B towards A; a
/// positive impulse along it pushes A away from B.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactData {
    pub link_a: LinkRef,
    pub link_b: LinkRef,
    pub collider_a: Option<ColliderId>,
    pub collider_b: Option<ColliderId>,
    pub point: DVec3,
    pub normal: DVec3,
    pub tangent1: DVec3,
    pub tangent2: DVec3,
    pub params: ContactParameters,
    /// Radii of curvature of the surfaces of A and B at the point; zero for
    /// faces, edges and vertices.
    pub curvature: [f64; 2],
    /// Impulse on A as a world-frame spatial vector; B receives the negation.
    pub impulse: SpatialVec,
}

impl ContactData {
    /// Fails when `normal` has no direction.
    pub fn new(link_a: LinkRef, link_b: LinkRef, point: DVec3, normal: DVec3) -> Result<Self, SimulationError> {
        let normal = normal
            .try_normalize()
            .ok_or(SimulationError::DegenerateNormal(normal))?;
        let (tangent1, tangent2) = tangent_basis(normal);
        Ok(Self {
            link_a,
            link_b,
            collider_a: None,
            collider_b: None,
            point,
            normal,
            tangent1,
            tangent2,
            params: ContactParameters::default(),
            curvature: [0.0; 2],
            impulse: SpatialVec::ZERO,
        })
    }

    pub fn with_colliders(mut self, a: ColliderId, b: ColliderId) -> Self {
        self.collider_a = Some(a);
        self.collider_b = Some(b);
        self
    }

    pub fn with_parameters(mut self, params: ContactParameters) -> Self {
        self.params = params;
        self
    }

    pub fn with_curvature(mut self, radius_a: f64, radius_b: f64) -> Self {
        self.curvature = [radius_a, radius_b];
        self
    }

    /// `v_A(p) - v_B(p)` at the contact point.
    pub fn relative_velocity(&self, bodies: &BodySet) -> DVec3 {
        bodies.point_velocity(self.link_a, self.point) - bodies.point_velocity(self.link_b, self.point)
    }

    /// Relative acceleration of the contact frame. On a curved surface the
    /// contact point rolls along the body instead of following one material
    /// point, so the centripetal part `r |ω × n|²` is removed along the normal.
    pub fn relative_acceleration(&self, bodies: &BodySet) -> DVec3 {
        let material = bodies.point_acceleration(self.link_a, self.point)
            - bodies.point_acceleration(self.link_b, self.point);
        let rolling = [self.link_a, self.link_b]
            .into_iter()
            .zip(self.curvature)
            .filter(|&(_, radius)| radius > 0.0)
            .map(|(link, radius)| radius * bodies.angular_velocity(link).cross(self.normal).length_squared())
            .sum::<f64>();
        material - self.normal * rolling
    }

    /// Relative velocity projected on the friction plane.
    pub fn tangential_velocity(&self, bodies: &BodySet) -> DVec3 {
        let v = self.relative_velocity(bodies);
        v - self.normal * v.dot(self.normal)
    }

    pub fn normal_impulse(&self) -> f64 {
        self.impulse.lin.dot(self.normal)
    }

    /// Impulse components along the two tangents.
    pub fn tangent_impulse(&self) -> (f64, f64) {
        (
            self.impulse.lin.dot(self.tangent1),
            self.impulse.lin.dot(self.tangent2),
        )
    }
}

/// A limited degree of freedom of an articulated body at its limit.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitData {
    pub body: BodyId,
    pub link: usize,
    pub dof: usize,
    pub upper: bool,
    pub restitution: f64,
    /// Generalized impulse pushing the coordinate back into range.
    pub impulse: f64,
}

impl LimitData {
    /// `+1` for a lower limit, `-1` for an upper one: the direction that
    /// moves the coordinate away from the limit.
    pub fn sign(&self) -> f64 {
        if self.upper {
            -1.0
        } else {
            1.0
        }
    }

    pub fn velocity(&self, bodies: &BodySet) -> f64 {
        bodies
            .dynamics(self.body)
            .map(|body| self.sign() * body.generalized_velocity(CoordinateType::Spatial)[self.dof])
            .unwrap_or(0.0)
    }

    pub fn acceleration(&self, bodies: &BodySet) -> f64 {
        bodies
            .dynamics(self.body)
            .map(|body| self.sign() * body.generalized_acceleration()[self.dof])
            .unwrap_or(0.0)
    }
}

/// A bilateral joint taking part in a resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintData {
    pub joint: JointId,
    pub link_a: LinkRef,
    pub link_b: LinkRef,
    /// One entry per equality row of the joint.
    pub normal_impulse: Vec<f64>,
    /// Joint friction is not modelled; always zero.
    pub friction_impulse: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum EventKind {
    #[default]
    None,
    Contact(ContactData),
    JointLimit(LimitData),
    Constraint(ConstraintData),
}

/// A contact, limit or joint occurrence within the current interval.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Event {
    /// Fraction of the interval at which the event occurs.
    pub t: f64,
    /// Absolute simulation time of the event.
    pub t_true: f64,
    pub kind: EventKind,
    /// Velocity band used by [`Event::classify`].
    pub tolerance: f64,
    class: EventClass,
}

impl Event {
    pub fn new(t: f64, kind: EventKind, tolerance: f64) -> Self {
        Self {
            t,
            t_true: 0.0,
            kind,
            tolerance,
            class: EventClass::Undetermined,
        }
    }

    pub fn contact(t: f64, data: ContactData, tolerance: f64) -> Self {
        Self::new(t, EventKind::Contact(data), tolerance)
    }

    pub fn limit(t: f64, data: LimitData, tolerance: f64) -> Self {
        Self::new(t, EventKind::JointLimit(data), tolerance)
    }

    pub fn constraint(t: f64, data: ConstraintData) -> Self {
        let mut event = Self::new(t, EventKind::Constraint(data), 0.0);
        event.class = EventClass::Resting;
        event
    }

    /// Cached class from the last classification.
    pub fn class(&self) -> EventClass {
        self.class
    }

    pub fn is_impacting(&self) -> bool {
        self.class == EventClass::Impacting
    }

    /// Relative normal velocity; negative when approaching.
    pub fn normal_velocity(&self, bodies: &BodySet) -> f64 {
        match &self.kind {
            EventKind::Contact(contact) => contact.normal.dot(contact.relative_velocity(bodies)),
            EventKind::JointLimit(limit) => limit.velocity(bodies),
            EventKind::Constraint(_) | EventKind::None => 0.0,
        }
    }

    pub fn normal_acceleration(&self, bodies: &BodySet) -> f64 {
        match &self.kind {
            EventKind::Contact(contact) => contact.normal.dot(contact.relative_acceleration(bodies)),
            EventKind::JointLimit(limit) => limit.acceleration(bodies),
            EventKind::Constraint(_) | EventKind::None => 0.0,
        }
    }

    pub fn classify(&mut self, bodies: &BodySet) -> EventClass {
        self.classify_with(bodies, self.tolerance)
    }

    /// Classifies with an explicit tolerance instead of the stored one.
    pub fn classify_with(&mut self, bodies: &BodySet, tolerance: f64) -> EventClass {
        self.class = match self.kind {
            EventKind::None => EventClass::Undetermined,
            EventKind::Constraint(_) => EventClass::Resting,
            _ => EventClass::from_velocity(self.normal_velocity(bodies), tolerance),
        };
        self.class
    }

    /// Forces the cached class, e.g. when a cluster is collapsed to rest.
    pub fn set_class(&mut self, class: EventClass) {
        self.class = class;
    }

    /// The links the event acts on.
    pub fn links(&self) -> [Option<LinkRef>; 2] {
        match &self.kind {
            EventKind::Contact(contact) => [Some(contact.link_a), Some(contact.link_b)],
            EventKind::JointLimit(limit) => [Some(LinkRef::new(limit.body, limit.link)), None],
            EventKind::Constraint(constraint) => [Some(constraint.link_a), Some(constraint.link_b)],
            EventKind::None => [None, None],
        }
    }

    pub fn as_contact(&self) -> Option<&ContactData> {
        match &self.kind {
            EventKind::Contact(contact) => Some(contact),
            _ => None,
        }
    }

    pub fn as_contact_mut(&mut self) -> Option<&mut ContactData> {
        match &mut self.kind {
            EventKind::Contact(contact) => Some(contact),
            _ => None,
        }
    }

    pub fn is_bilateral(&self) -> bool {
        matches!(self.kind, EventKind::Constraint(_))
    }

    /// Total order by interval fraction.
    pub fn cmp_time(&self, other: &Event) -> Ordering {
        self.t.total_cmp(&other.t)
    }
}

/// Stable sort by time; events at equal `t` keep their detection order.
pub fn sort_by_time(events: &mut [Event]) {
    events.sort_by(Event::cmp_time);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        rigidbody::RigidBody,
        types::{MassProperties, Transform},
    };

    fn falling_ball(speed: f64) -> (BodySet, ContactData) {
        let mut bodies = BodySet::new();
        let ground = bodies.insert_rigid(RigidBody::fixed(Transform::IDENTITY));
        let ball = bodies.insert_rigid(
            RigidBody::new(
                Transform::from_position(DVec3::new(0.0, 0.5, 0.0)),
                MassProperties::solid_sphere(0.5, 1.0),
            )
            .with_velocity(DVec3::new(0.0, -speed, 0.0), DVec3::ZERO),
        );
        let contact = ContactData::new(LinkRef::root(ball), LinkRef::root(ground), DVec3::ZERO, DVec3::Y).unwrap();
        (bodies, contact)
    }

    #[test]
    fn classification_follows_normal_velocity() {
        let (bodies, contact) = falling_ball(1.0);
        let mut event = Event::contact(0.3, contact, 1e-6);
        assert_eq!(event.class(), EventClass::Undetermined);
        assert_eq!(event.classify(&bodies), EventClass::Impacting);
        assert_eq!(event.classify(&bodies), EventClass::Impacting);
        assert_eq!(event.classify_with(&bodies, 2.0), EventClass::Resting);

        let (bodies, contact) = falling_ball(-1.0);
        let mut event = Event::contact(0.3, contact, 1e-6);
        assert_eq!(event.classify(&bodies), EventClass::Separating);
    }

    #[test]
    fn zero_normals_are_rejected() {
        let (_, contact) = falling_ball(0.0);
        assert!(matches!(
            ContactData::new(contact.link_a, contact.link_b, DVec3::ZERO, DVec3::ZERO),
            Err(SimulationError::DegenerateNormal(_))
        ));
        assert!(ContactData::new(contact.link_a, contact.link_b, DVec3::ZERO, DVec3::new(0.0, f64::NAN, 0.0)).is_err());
    }

    #[test]
    fn rolling_sphere_does_not_lift_off() {
        let (mut bodies, contact) = falling_ball(0.0);
        let ball = contact.link_a;
        if let Some(body) = bodies.get_mut(ball.body).and_then(|b| b.as_rigid_mut()) {
            body.set_velocity(DVec3::new(1.0, 0.0, 0.0), DVec3::new(0.0, 0.0, -2.0));
        }
        bodies.calc_fwd_dyn(DVec3::ZERO);
        let point = Event::contact(0.0, contact.clone(), 1e-6);
        // The material point under the ball accelerates towards the center.
        assert!((point.normal_acceleration(&bodies) - 2.0).abs() < 1e-12);

        let rolling = Event::contact(0.0, contact.with_curvature(0.5, 0.0), 1e-6);
        assert!(rolling.normal_velocity(&bodies).abs() < 1e-12);
        assert!(rolling.normal_acceleration(&bodies).abs() < 1e-12);
    }

    #[test]
    fn events_sort_by_time() {
        let mut events = vec![
            Event::new(0.7, EventKind::None, 0.0),
            Event::new(0.1, EventKind::None, 0.0),
            Event::new(0.4, EventKind::None, 0.0),
        ];
        sort_by_time(&mut events);
        let times: Vec<f64> = events.iter().map(|e| e.t).collect();
        assert_eq!(times, vec![0.1, 0.4, 0.7]);
    }

    #[test]
    fn tangents_complete_the_normal() {
        let (_, contact) = falling_ball(1.0);
        assert!(contact.tangent1.dot(contact.normal).abs() < 1e-12);
        assert!(contact.tangent2.dot(contact.normal).abs() < 1e-12);
        assert!(contact.tangent1.dot(contact.tangent2).abs() < 1e-12);
        assert!((contact.tangent1.length() - 1.0).abs() < 1e-12);
    }
}
