//! Time-of-impact decisions over one integrated interval.

use std::collections::BTreeSet;

use log::debug;

use crate::{
    core::body::{BodyId, BodySet},
    dynamics::integrator::IntegratedPath,
    events::event::{Event, EventClass},
};

/// What the driver does with an integrated interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Plan {
    /// No cluster needs attention; keep the whole interval.
    Accept,
    /// Re-integrate over the shorter `horizon` instead.
    Shrink { horizon: f64 },
    /// Resolve `events[..end]` as impacts at elapsed time `h`; the deciding
    /// cluster is `events[start..end]`.
    Impact { h: f64, start: usize, end: usize },
    /// Collapse `events[..end]` to rest at elapsed time `h`.
    Collapse { h: f64, start: usize, end: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeOfImpact {
    /// Events closer than this in interval fraction form one cluster.
    pub simultaneous_epsilon: f64,
    pub min_step_size: f64,
}

impl TimeOfImpact {
    pub fn new(simultaneous_epsilon: f64, min_step_size: f64) -> Self {
        Self {
            simultaneous_epsilon,
            min_step_size,
        }
    }

    /// Walks the clusters of the time-sorted `events` and returns the first
    /// that requires action. Events are classified at their cluster time;
    /// bodies are left placed somewhere along `path`.
    pub fn plan(
        &self,
        events: &mut [Event],
        path: &IntegratedPath,
        bodies: &mut BodySet,
        rested: &BTreeSet<BodyId>,
    ) -> Plan {
        let span = path.span;
        let mut start = 0;
        while start < events.len() {
            let first = events[start].t;
            let end = start
                + events[start..]
                    .iter()
                    .take_while(|event| event.t <= first + self.simultaneous_epsilon)
                    .count();
            let h = first * span;
            path.place(bodies, h);
            for event in &mut events[start..end] {
                event.classify(bodies);
            }
            let cluster = &events[start..end];

            if cluster.iter().any(Event::is_impacting) {
                debug!("impacting cluster of {} events at t = {first:.9}", cluster.len());
                return Plan::Impact { h, start, end };
            }
            if all_rested(cluster, bodies, rested) {
                start = end;
                continue;
            }

            let at_h: Vec<f64> = cluster.iter().map(|e| e.normal_velocity(bodies)).collect();
            path.apply_end_velocities(bodies);
            let at_end: Vec<f64> = cluster.iter().map(|e| e.normal_velocity(bodies)).collect();
            path.place(bodies, h);

            let approaching: Vec<usize> = (0..cluster.len())
                .filter(|&i| !cluster[i].is_bilateral() && at_end[i] < -cluster[i].tolerance)
                .collect();
            if approaching.is_empty() {
                start = end;
                continue;
            }
            if approaching
                .iter()
                .any(|&i| cluster[i].class() == EventClass::Resting)
            {
                debug!("resting cluster of {} events approaches at t = {first:.9}", cluster.len());
                return Plan::Collapse { h, start, end };
            }

            // Separating now but back inside the interval: stop before the turn-around.
            let turnaround = approaching
                .iter()
                .map(|&i| h + (span - h) * at_h[i] / (at_h[i] - at_end[i]))
                .fold(f64::INFINITY, f64::min);
            let horizon = 0.5 * turnaround;
            if horizon < self.min_step_size {
                debug!("turn-around at {turnaround:e} is below the minimum step; collapsing");
                return Plan::Collapse { h, start, end };
            }
            debug!("shortening horizon from {span:e} to {horizon:e}");
            return Plan::Shrink { horizon };
        }
        Plan::Accept
    }
}

/// Whether every dynamic body of `cluster` has already been collapsed to rest.
fn all_rested(cluster: &[Event], bodies: &BodySet, rested: &BTreeSet<BodyId>) -> bool {
    let mut any = false;
    for link in cluster.iter().flat_map(|e| e.links()).flatten() {
        if let Some(id) = bodies.super_body(link) {
            if !rested.contains(&id) {
                return false;
            }
            any = true;
        }
    }
    any
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::*;
    use crate::{
        core::{
            body::LinkRef,
            rigidbody::RigidBody,
            types::{MassProperties, Transform},
        },
        dynamics::integrator::Integrator,
        events::event::ContactData,
    };

    const GRAVITY: DVec3 = DVec3::new(0.0, -10.0, 0.0);

    fn ball(height: f64, speed: f64) -> (BodySet, BodyId, BodyId) {
        let mut bodies = BodySet::new();
        let ground = bodies.insert_rigid(RigidBody::fixed(Transform::IDENTITY));
        let ball = bodies.insert_rigid(
            RigidBody::new(
                Transform::from_position(DVec3::new(0.0, height, 0.0)),
                MassProperties::solid_sphere(0.5, 1.0),
            )
            .with_velocity(DVec3::new(0.0, speed, 0.0), DVec3::ZERO),
        );
        bodies.calc_fwd_dyn(GRAVITY);
        (bodies, ground, ball)
    }

    fn contact_at(t: f64, ball: BodyId, ground: BodyId) -> Event {
        let data = ContactData::new(LinkRef::root(ball), LinkRef::root(ground), DVec3::ZERO, DVec3::Y).unwrap();
        Event::contact(t, data, 1e-6)
    }

    #[test]
    fn impacting_cluster_is_resolved_at_its_time() {
        let (mut bodies, ground, ball) = ball(1.0, -2.0);
        let path = Integrator::new().integrate(&mut bodies, 0.5);
        let mut events = vec![contact_at(0.4, ball, ground), contact_at(0.9, ball, ground)];
        let plan = TimeOfImpact::new(1e-9, 1e-8).plan(&mut events, &path, &mut bodies, &BTreeSet::new());
        assert_eq!(plan, Plan::Impact { h: 0.2, start: 0, end: 1 });
    }

    #[test]
    fn resting_approach_collapses() {
        let (mut bodies, ground, ball) = ball(0.5, 0.0);
        let path = Integrator::new().integrate(&mut bodies, 0.01);
        let mut events = vec![contact_at(0.0, ball, ground)];
        let toi = TimeOfImpact::new(1e-9, 1e-8);
        let plan = toi.plan(&mut events, &path, &mut bodies, &BTreeSet::new());
        assert_eq!(plan, Plan::Collapse { h: 0.0, start: 0, end: 1 });

        let rested = BTreeSet::from([ball]);
        assert_eq!(toi.plan(&mut events, &path, &mut bodies, &rested), Plan::Accept);
    }

    #[test]
    fn leaving_and_returning_shrinks_the_horizon() {
        // Up at 1 m/s: apex after 0.1 s, back down well before 0.5 s.
        let (mut bodies, ground, ball) = ball(0.5, 1.0);
        let path = Integrator::new().integrate(&mut bodies, 0.5);
        let mut events = vec![contact_at(0.0, ball, ground)];
        let plan = TimeOfImpact::new(1e-9, 1e-8).plan(&mut events, &path, &mut bodies, &BTreeSet::new());
        let Plan::Shrink { horizon } = plan else {
            panic!("expected a shorter horizon, got {plan:?}");
        };
        assert!((horizon - 0.05).abs() < 1e-12);
    }

    #[test]
    fn separating_cluster_is_accepted() {
        let (mut bodies, ground, ball) = ball(0.5, 20.0);
        let path = Integrator::new().integrate(&mut bodies, 0.1);
        let mut events = vec![contact_at(0.0, ball, ground)];
        let plan = TimeOfImpact::new(1e-9, 1e-8).plan(&mut events, &path, &mut bodies, &BTreeSet::new());
        assert_eq!(plan, Plan::Accept);
    }
}
