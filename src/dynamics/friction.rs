//! Polygonal approximation of the Coulomb friction cone.

use std::f64::consts::PI;

use glam::DVec3;

use crate::{events::parameters::FrictionEdges, utils::math::project_onto_tangent};

/// Linearized friction cone with `k` facets per tangent quadrant.
///
/// Facet `m` has normal `(cos θ_m, sin θ_m)` in the tangent plane with
/// `θ_m = π(2m + 1) / (4k)`. Mirrored into the other quadrants this gives a
/// regular polygon with `4k` sides whose vertices lie on the true cone when the
/// Coulomb limit is scaled by [`FrictionPyramid::coulomb_scale`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrictionPyramid {
    facets: usize,
}

impl FrictionPyramid {
    pub fn new(facets: usize) -> Self {
        Self {
            facets: facets.max(1),
        }
    }

    /// `None` for frictionless contacts.
    pub fn from_edges(edges: FrictionEdges) -> Option<Self> {
        edges.facets().map(Self::new)
    }

    pub fn facet_count(&self) -> usize {
        self.facets
    }

    /// `(cos θ_m, sin θ_m)` of facet `m`.
    pub fn direction(&self, m: usize) -> (f64, f64) {
        let theta = PI * (2 * m + 1) as f64 / (4 * self.facets) as f64;
        (theta.cos(), theta.sin())
    }

    pub fn directions(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        (0..self.facets).map(|m| self.direction(m))
    }

    /// Inscribes the polygon in the cone: `cos(π / 4k)`.
    pub fn coulomb_scale(&self) -> f64 {
        (PI / (4 * self.facets) as f64).cos()
    }

    /// Whether the tangential components lie inside the polygon of a contact
    /// with coefficient `mu` and normal component `normal`.
    pub fn contains(&self, mu: f64, normal: f64, tangent1: f64, tangent2: f64, tolerance: f64) -> bool {
        let limit = mu * self.coulomb_scale() * normal + tolerance;
        self.directions()
            .all(|(c, s)| c * tangent1.abs() + s * tangent2.abs() <= limit)
    }
}

/// Unit direction of slip, if the tangential velocity exceeds `tolerance`.
pub fn slip_direction(relative_velocity: DVec3, normal: DVec3, tolerance: f64) -> Option<DVec3> {
    let tangential = project_onto_tangent(relative_velocity, normal);
    let speed = tangential.length();
    (speed > tolerance).then(|| tangential / speed)
}
