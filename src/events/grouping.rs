use std::collections::{BTreeMap, BTreeSet};

use glam::DVec3;
use log::debug;

use super::event::{Event, EventClass};
use crate::core::body::{BodyId, BodySet, LinkRef};

/// Events whose super bodies are connected; solved as one problem.
#[derive(Debug, Clone, Default)]
pub struct EventGroup {
    pub events: Vec<Event>,
    /// Super bodies touched by the events, sorted.
    pub bodies: Vec<BodyId>,
}

impl EventGroup {
    pub fn has_impacting(&self) -> bool {
        self.events.iter().any(|event| event.class() == EventClass::Impacting)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Partitions event batches into connected components of super bodies.
#[derive(Debug, Default)]
pub struct EventGrouper {
    adjacency: BTreeMap<BodyId, Vec<BodyId>>,
}

impl EventGrouper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups `events`, preserving their relative order inside each group.
    /// Events that touch no dynamic body are dropped.
    pub fn group(&mut self, events: Vec<Event>, bodies: &BodySet) -> Vec<EventGroup> {
        self.adjacency.clear();
        let mut first_seen = Vec::new();
        let mut roots = Vec::with_capacity(events.len());

        for event in &events {
            let mut supers: Vec<BodyId> = event
                .links()
                .into_iter()
                .flatten()
                .filter_map(|link| bodies.super_body(link))
                .collect();
            supers.dedup();
            for &id in &supers {
                if !self.adjacency.contains_key(&id) {
                    self.adjacency.insert(id, Vec::new());
                    first_seen.push(id);
                }
            }
            if let [a, b] = supers.as_slice() {
                self.adjacency.entry(*a).or_default().push(*b);
                self.adjacency.entry(*b).or_default().push(*a);
            }
            roots.push(supers.first().copied());
        }

        let mut component = BTreeMap::new();
        let mut groups: Vec<EventGroup> = Vec::new();
        let mut visited = BTreeSet::new();
        for start in first_seen {
            if visited.contains(&start) {
                continue;
            }
            let mut members = self.depth_first_collect(start, &mut visited);
            members.sort();
            for &id in &members {
                component.insert(id, groups.len());
            }
            groups.push(EventGroup {
                events: Vec::new(),
                bodies: members,
            });
        }

        for (event, root) in events.into_iter().zip(roots) {
            match root.and_then(|id| component.get(&id)) {
                Some(&index) => groups[index].events.push(event),
                None => debug!("dropping event at t={} with no dynamic body", event.t),
            }
        }
        groups
    }

    fn depth_first_collect(&self, start: BodyId, visited: &mut BTreeSet<BodyId>) -> Vec<BodyId> {
        let mut stack = vec![start];
        let mut result = Vec::new();

        while let Some(node) = stack.pop() {
            if visited.insert(node) {
                result.push(node);
                if let Some(neighbors) = self.adjacency.get(&node) {
                    stack.extend(neighbors.iter().copied());
                }
            }
        }

        result
    }
}

/// Keeps only groups with at least one impacting event.
pub fn remove_nonimpacting_groups(groups: &mut Vec<EventGroup>) {
    groups.retain(EventGroup::has_impacting);
}

const NORMAL_MATCH: f64 = 1.0 - 1e-6;

/// Drops redundant contacts from a group.
///
/// Contacts of the same link pair with the same normal form a manifold. In
/// every manifold, contacts at coincident points are merged and, past four
/// points, only the extreme points of the manifold along the tangents and
/// their diagonals survive, together with the most approaching contact.
/// Every manifold keeps at least one contact; other event kinds are kept.
pub fn reduce_minimal_set(events: &mut Vec<Event>, bodies: &BodySet, point_tolerance: f64) {
    let mut manifolds: BTreeMap<(LinkRef, LinkRef), Vec<(DVec3, Vec<usize>)>> = BTreeMap::new();
    for (index, event) in events.iter().enumerate() {
        let Some(contact) = event.as_contact() else {
            continue;
        };
        let (key, normal) = if contact.link_a <= contact.link_b {
            ((contact.link_a, contact.link_b), contact.normal)
        } else {
            ((contact.link_b, contact.link_a), -contact.normal)
        };
        let buckets = manifolds.entry(key).or_default();
        match buckets.iter_mut().find(|(n, _)| n.dot(normal) > NORMAL_MATCH) {
            Some((_, members)) => members.push(index),
            None => buckets.push((normal, vec![index])),
        }
    }

    let mut keep = vec![true; events.len()];
    for (_, members) in manifolds.into_values().flatten() {
        let mut unique: Vec<usize> = Vec::with_capacity(members.len());
        for index in members {
            let point = contact_point(&events[index]);
            match unique
                .iter()
                .position(|&kept| contact_point(&events[kept]).distance(point) <= point_tolerance)
            {
                Some(slot) => {
                    let kept = unique[slot];
                    if events[index].normal_velocity(bodies) < events[kept].normal_velocity(bodies) {
                        keep[kept] = false;
                        unique[slot] = index;
                    } else {
                        keep[index] = false;
                    }
                }
                None => unique.push(index),
            }
        }
        if unique.len() <= 4 {
            continue;
        }

        let Some(first) = events[unique[0]].as_contact() else {
            continue;
        };
        let (t1, t2) = (first.tangent1, first.tangent2);
        let mut survivors = BTreeSet::new();
        for direction in [t1, t2, t1 + t2, t1 - t2] {
            let projection = |index: usize| contact_point(&events[index]).dot(direction);
            let min = unique.iter().min_by(|a, b| projection(**a).total_cmp(&projection(**b)));
            let max = unique.iter().max_by(|a, b| projection(**a).total_cmp(&projection(**b)));
            survivors.extend(min.into_iter().chain(max).copied());
        }
        if let Some(&deepest) = unique.iter().min_by(|&&a, &&b| {
            events[a]
                .normal_velocity(bodies)
                .total_cmp(&events[b].normal_velocity(bodies))
        }) {
            survivors.insert(deepest);
        }
        for index in unique {
            if !survivors.contains(&index) {
                keep[index] = false;
            }
        }
    }

    let before = events.len();
    let mut flags = keep.into_iter();
    events.retain(|_| flags.next().unwrap_or(true));
    if events.len() < before {
        debug!("minimal set reduction: {} -> {} events", before, events.len());
    }
}

fn contact_point(event: &Event) -> DVec3 {
    event.as_contact().map(|contact| contact.point).unwrap_or(DVec3::ZERO)
}
