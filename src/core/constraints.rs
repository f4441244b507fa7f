use glam::DVec3;
use serde::{Deserialize, Serialize};

use super::body::{BodySet, LinkRef};
use crate::utils::{allocator::Handle, math::tangent_basis};

pub type JointId = Handle<Joint>;

/// Bilateral joints between two links in maximal coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum JointKind {
    /// Anchors coincide; rotation is free.
    Spherical,
    /// Anchors coincide; rotation only about `axis`, given in the frame of link A.
    Revolute { axis: DVec3 },
    /// No relative motion.
    Fixed,
}

impl JointKind {
    /// Number of equality rows the joint contributes.
    pub fn num_rows(&self) -> usize {
        match self {
            JointKind::Spherical => 3,
            JointKind::Revolute { .. } => 5,
            JointKind::Fixed => 6,
        }
    }
}

/// One equality row. Its velocity is
/// `linear · (v_A(anchor_A) - v_B(anchor_B)) + angular · (ω_A - ω_B)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointRow {
    pub linear: DVec3,
    pub angular: DVec3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub kind: JointKind,
    pub link_a: LinkRef,
    pub link_b: LinkRef,
    /// Anchor in the frame of link A.
    pub anchor_a: DVec3,
    /// Anchor in the frame of link B.
    pub anchor_b: DVec3,
}

impl Joint {
    pub fn new(kind: JointKind, link_a: LinkRef, anchor_a: DVec3, link_b: LinkRef, anchor_b: DVec3) -> Self {
        Self {
            kind,
            link_a,
            link_b,
            anchor_a,
            anchor_b,
        }
    }

    /// Joint whose anchors coincide at `anchor` in the current configuration.
    pub fn at_world_anchor(
        kind: JointKind,
        link_a: LinkRef,
        link_b: LinkRef,
        anchor: DVec3,
        bodies: &BodySet,
    ) -> Option<Self> {
        let pose_a = bodies.link_pose(link_a)?;
        let pose_b = bodies.link_pose(link_b)?;
        Some(Self::new(
            kind,
            link_a,
            pose_a.inverse_transform_point(anchor),
            link_b,
            pose_b.inverse_transform_point(anchor),
        ))
    }

    pub fn num_rows(&self) -> usize {
        self.kind.num_rows()
    }

    pub fn world_anchors(&self, bodies: &BodySet) -> Option<(DVec3, DVec3)> {
        let pose_a = bodies.link_pose(self.link_a)?;
        let pose_b = bodies.link_pose(self.link_b)?;
        Some((
            pose_a.transform_point(self.anchor_a),
            pose_b.transform_point(self.anchor_b),
        ))
    }

    /// Equality rows at the current configuration.
    pub fn rows(&self, bodies: &BodySet) -> Option<Vec<JointRow>> {
        let linear = [DVec3::X, DVec3::Y, DVec3::Z].map(|axis| JointRow {
            linear: axis,
            angular: DVec3::ZERO,
        });
        let angular = |axis: DVec3| JointRow {
            linear: DVec3::ZERO,
            angular: axis,
        };
        let mut rows = linear.to_vec();
        match self.kind {
            JointKind::Spherical => {}
            JointKind::Revolute { axis } => {
                let hinge = bodies.link_pose(self.link_a)?.transform_vector(axis.normalize());
                let (p1, p2) = tangent_basis(hinge);
                rows.extend([angular(p1), angular(p2)]);
            }
            JointKind::Fixed => rows.extend([DVec3::X, DVec3::Y, DVec3::Z].map(angular)),
        }
        Some(rows)
    }

    /// Velocity of every row at the current state.
    pub fn row_velocities(&self, bodies: &BodySet) -> Option<Vec<f64>> {
        let (anchor_a, anchor_b) = self.world_anchors(bodies)?;
        let dv = bodies.point_velocity(self.link_a, anchor_a) - bodies.point_velocity(self.link_b, anchor_b);
        let dw = bodies.angular_velocity(self.link_a) - bodies.angular_velocity(self.link_b);
        Some(
            self.rows(bodies)?
                .iter()
                .map(|row| row.linear.dot(dv) + row.angular.dot(dw))
                .collect(),
        )
    }

    /// Acceleration of every row at the current state.
    pub fn row_accelerations(&self, bodies: &BodySet) -> Option<Vec<f64>> {
        let (anchor_a, anchor_b) = self.world_anchors(bodies)?;
        let da = bodies.point_acceleration(self.link_a, anchor_a)
            - bodies.point_acceleration(self.link_b, anchor_b);
        let dalpha = bodies.angular_acceleration(self.link_a) - bodies.angular_acceleration(self.link_b);
        Some(
            self.rows(bodies)?
                .iter()
                .map(|row| row.linear.dot(da) + row.angular.dot(dalpha))
                .collect(),
        )
    }
}
