//! Friction and restitution parameters of contacting pairs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    core::{body::{BodyId, LinkRef}, collider::ColliderId},
    utils::logging::WarnOnce,
};

/// Number of edges of the polygonal friction cone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrictionEdges {
    /// Even count of at least four.
    Finite(u32),
    /// Frictionless contact.
    Infinite,
}

impl FrictionEdges {
    /// Facets per quadrant, `(edges + 4) / 4`.
    pub fn facets(&self) -> Option<usize> {
        match *self {
            FrictionEdges::Finite(edges) => Some((edges.max(4) as usize + 4) / 4),
            FrictionEdges::Infinite => None,
        }
    }
}

/// Contact model of a pair of entities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContactParameters {
    pub mu_coulomb: f64,
    /// Reported with the contact only; resolved friction stays inside the
    /// Coulomb cone whatever its value.
    pub mu_viscous: f64,
    pub restitution: f64,
    pub friction_edges: FrictionEdges,
}

impl Default for ContactParameters {
    fn default() -> Self {
        Self {
            mu_coulomb: 0.0,
            mu_viscous: 0.0,
            restitution: 0.0,
            friction_edges: FrictionEdges::Finite(4),
        }
    }
}

impl ContactParameters {
    pub fn frictionless() -> Self {
        Self::default()
    }

    pub fn with_friction(mut self, mu_coulomb: f64) -> Self {
        self.mu_coulomb = mu_coulomb.max(0.0);
        self
    }

    pub fn with_viscous_friction(mut self, mu_viscous: f64) -> Self {
        self.mu_viscous = mu_viscous.max(0.0);
        self
    }

    pub fn with_restitution(mut self, restitution: f64) -> Self {
        self.restitution = restitution.clamp(0.0, 1.0);
        self
    }

    pub fn with_edges(mut self, edges: FrictionEdges) -> Self {
        self.friction_edges = edges;
        self
    }

    pub fn is_frictionless(&self) -> bool {
        self.mu_coulomb <= 0.0 || matches!(self.friction_edges, FrictionEdges::Infinite)
    }
}

/// Entity a parameter entry is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParamKey {
    Geometry(ColliderId),
    Body(LinkRef),
    Mechanism(BodyId),
}

/// One side of a contact, at every level of specificity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSubject {
    pub geometry: Option<ColliderId>,
    pub body: LinkRef,
    pub mechanism: Option<BodyId>,
}

impl ParamSubject {
    /// Candidate keys from most to least specific.
    fn keys(&self) -> [Option<ParamKey>; 3] {
        [
            self.geometry.map(ParamKey::Geometry),
            Some(ParamKey::Body(self.body)),
            self.mechanism.map(ParamKey::Mechanism),
        ]
    }
}

fn unordered(a: ParamKey, b: ParamKey) -> (ParamKey, ParamKey) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Parameter entries keyed by unordered pairs.
///
/// Lookups go from geometry pair through geometry + body, body pair and
/// geometry/body + mechanism down to the mechanism pair. A miss falls back to
/// the default parameters and warns once per pair.
#[derive(Debug, Default)]
pub struct ContactParameterTable {
    entries: BTreeMap<(ParamKey, ParamKey), ContactParameters>,
    default: ContactParameters,
    missing: WarnOnce<(ParamKey, ParamKey)>,
}

impl ContactParameterTable {
    pub fn new(default: ContactParameters) -> Self {
        Self {
            default,
            ..Self::default()
        }
    }

    pub fn insert(&mut self, a: ParamKey, b: ParamKey, params: ContactParameters) {
        self.entries.insert(unordered(a, b), params);
    }

    pub fn get(&self, a: ParamKey, b: ParamKey) -> Option<&ContactParameters> {
        self.entries.get(&unordered(a, b))
    }

    pub fn default_parameters(&self) -> ContactParameters {
        self.default
    }

    pub fn set_default(&mut self, params: ContactParameters) {
        self.default = params;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&mut self, a: &ParamSubject, b: &ParamSubject) -> ContactParameters {
        let [ga, ba, ma] = a.keys();
        let [gb, bb, mb] = b.keys();
        let order = [
            (ga, gb),
            (ga, bb),
            (ba, gb),
            (ba, bb),
            (ga, mb),
            (ma, gb),
            (ba, mb),
            (ma, bb),
            (ma, mb),
        ];
        for (ka, kb) in order {
            if let (Some(ka), Some(kb)) = (ka, kb) {
                if let Some(params) = self.get(ka, kb) {
                    return *params;
                }
            }
        }

        let pair = unordered(ParamKey::Body(a.body), ParamKey::Body(b.body));
        self.missing.warn(pair, || {
            format!(
                "no contact parameters for {:?} / {:?}; using defaults",
                a.body, b.body
            )
        });
        self.default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::allocator::Handle;

    fn subject(body: u32, geometry: Option<u32>, mechanism: bool) -> ParamSubject {
        let body_id: BodyId = Handle::from_index(body);
        ParamSubject {
            geometry: geometry.map(Handle::from_index),
            body: LinkRef::root(body_id),
            mechanism: mechanism.then_some(body_id),
        }
    }

    #[test]
    fn facet_count_follows_edge_count() {
        assert_eq!(FrictionEdges::Finite(4).facets(), Some(2));
        assert_eq!(FrictionEdges::Finite(8).facets(), Some(3));
        assert_eq!(FrictionEdges::Infinite.facets(), None);
    }

    #[test]
    fn geometry_pair_beats_body_pair() {
        let mut table = ContactParameterTable::new(ContactParameters::default());
        let a = subject(1, Some(10), false);
        let b = subject(2, Some(20), false);
        table.insert(
            ParamKey::Body(a.body),
            ParamKey::Body(b.body),
            ContactParameters::default().with_friction(0.3),
        );
        assert_eq!(table.lookup(&a, &b).mu_coulomb, 0.3);

        table.insert(
            ParamKey::Geometry(Handle::from_index(20)),
            ParamKey::Geometry(Handle::from_index(10)),
            ContactParameters::default().with_friction(0.9),
        );
        assert_eq!(table.lookup(&b, &a).mu_coulomb, 0.9);
    }

    #[test]
    fn mechanism_entry_is_the_last_resort() {
        let mut table = ContactParameterTable::new(ContactParameters::default().with_restitution(0.1));
        let a = subject(1, None, true);
        let b = subject(2, None, true);
        assert_eq!(table.lookup(&a, &b).restitution, 0.1);
        table.insert(
            ParamKey::Mechanism(Handle::from_index(1)),
            ParamKey::Mechanism(Handle::from_index(2)),
            ContactParameters::default().with_restitution(0.7),
        );
        assert_eq!(table.lookup(&a, &b).restitution, 0.7);
    }
}
