//! Per-event classification tolerances that widen when an impact leaves an
//! event still approaching.

use std::collections::HashMap;

use log::debug;

use super::event::{Event, EventKind};
use crate::core::{
    body::{BodyId, BodySet, LinkRef},
    collider::ColliderId,
};

/// Identity of an event across driver iterations and steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKey {
    Contact {
        link_a: LinkRef,
        link_b: LinkRef,
        colliders: Option<(ColliderId, ColliderId)>,
    },
    Limit {
        body: BodyId,
        dof: usize,
        upper: bool,
    },
}

impl EventKey {
    /// Bilateral and empty events have no key.
    pub fn of(event: &Event) -> Option<Self> {
        match &event.kind {
            EventKind::Contact(contact) => Some(EventKey::Contact {
                link_a: contact.link_a,
                link_b: contact.link_b,
                colliders: contact.collider_a.zip(contact.collider_b),
            }),
            EventKind::JointLimit(limit) => Some(EventKey::Limit {
                body: limit.body,
                dof: limit.dof,
                upper: limit.upper,
            }),
            EventKind::Constraint(_) | EventKind::None => None,
        }
    }
}

/// Tolerances learned for individual events. Entries only ever grow.
#[derive(Debug, Clone, Default)]
pub struct EventTolerances {
    widened: HashMap<EventKey, f64>,
}

impl EventTolerances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &EventKey) -> Option<f64> {
        self.widened.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.widened.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widened.is_empty()
    }

    /// Raises the tolerance of every event with a learned entry.
    pub fn apply(&self, events: &mut [Event]) {
        for event in events {
            if let Some(tolerance) = EventKey::of(event).and_then(|key| self.get(&key)) {
                event.tolerance = event.tolerance.max(tolerance);
            }
        }
    }

    /// Widens the tolerance of each resolved event that still approaches
    /// faster than its band allows. Returns the number of events widened.
    pub fn widen_unresolved(&mut self, events: &[Event], bodies: &BodySet) -> usize {
        let mut widened = 0;
        for event in events {
            let Some(key) = EventKey::of(event) else {
                continue;
            };
            let velocity = event.normal_velocity(bodies);
            if velocity >= -event.tolerance {
                continue;
            }
            let tolerance = velocity.abs() + f64::EPSILON;
            debug!("event {key:?} still approaching at {velocity:e}; tolerance widened to {tolerance:e}");
            let entry = self.widened.entry(key).or_insert(tolerance);
            *entry = entry.max(tolerance);
            widened += 1;
        }
        widened
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::*;
    use crate::{
        core::{
            rigidbody::RigidBody,
            types::{MassProperties, Transform},
        },
        events::event::{ContactData, EventClass},
    };

    fn approaching_contact(speed: f64) -> (BodySet, Event) {
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
        (bodies, Event::contact(0.0, contact, 1e-6))
    }

    #[test]
    fn unresolved_impact_widens_its_tolerance() {
        let (bodies, event) = approaching_contact(1e-3);
        let mut tolerances = EventTolerances::new();
        assert_eq!(tolerances.widen_unresolved(std::slice::from_ref(&event), &bodies), 1);
        assert_eq!(tolerances.len(), 1);

        let mut next = vec![event];
        tolerances.apply(&mut next);
        assert!((next[0].tolerance - 1e-3).abs() < 1e-12);
        assert_eq!(next[0].classify(&bodies), EventClass::Resting);
    }

    #[test]
    fn separating_events_keep_their_tolerance() {
        let (bodies, event) = approaching_contact(-1.0);
        let mut tolerances = EventTolerances::new();
        assert_eq!(tolerances.widen_unresolved(&[event], &bodies), 0);
        assert!(tolerances.is_empty());
    }

    #[test]
    fn learned_tolerances_never_shrink() {
        let (bodies, event) = approaching_contact(0.5);
        let mut tolerances = EventTolerances::new();
        tolerances.widen_unresolved(std::slice::from_ref(&event), &bodies);
        let (slower, event) = approaching_contact(0.1);
        tolerances.widen_unresolved(&[event.clone()], &slower);
        assert!((tolerances.get(&EventKey::of(&event).unwrap()).unwrap() - 0.5).abs() < 1e-12);
    }
}
