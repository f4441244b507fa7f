//! Additional math helpers layered on top of `glam`.

use glam::{DMat3, DQuat, DVec3};

/// Deterministic orthonormal completion of a unit normal.
///
/// The first tangent is `normal x X`, or `normal x Y` when the normal is
/// (nearly) parallel to X; the second completes a right-handed frame.
pub fn tangent_basis(normal: DVec3) -> (DVec3, DVec3) {
    let mut tangent = normal.cross(DVec3::X);
    if tangent.length_squared() <= 1e-6 {
        tangent = normal.cross(DVec3::Y);
    }
    let t1 = tangent.normalize_or_zero();
    let t2 = normal.cross(t1).normalize_or_zero();
    (t1, t2)
}

pub fn project_onto_tangent(vector: DVec3, normal: DVec3) -> DVec3 {
    vector - normal * vector.dot(normal)
}

/// Time derivative of a unit quaternion rotating at world angular velocity `omega`.
pub fn quat_derivative(rotation: DQuat, omega: DVec3) -> DQuat {
    let w = DQuat::from_xyzw(omega.x, omega.y, omega.z, 0.0);
    let d = w * rotation;
    DQuat::from_xyzw(d.x * 0.5, d.y * 0.5, d.z * 0.5, d.w * 0.5)
}

/// Inverse of [`quat_derivative`].
pub fn angular_velocity_from_derivative(rotation: DQuat, derivative: DQuat) -> DVec3 {
    let w = derivative * rotation.conjugate();
    DVec3::new(w.x, w.y, w.z) * 2.0
}

/// Rotates a body-frame inertia tensor into the world frame.
pub fn world_inertia(rotation: DQuat, body_inertia: DMat3) -> DMat3 {
    let r = DMat3::from_quat(rotation);
    r * body_inertia * r.transpose()
}

/// Inertia tensor of a solid sphere about its center.
pub fn inertia_sphere(radius: f64, mass: f64) -> DMat3 {
    DMat3::from_diagonal(DVec3::splat(0.4 * mass * radius * radius))
}

/// Inertia tensor of a solid box about its center.
pub fn inertia_box(half_extents: DVec3, mass: f64) -> DMat3 {
    let size = half_extents * 2.0;
    let k = mass / 12.0;
    DMat3::from_diagonal(DVec3::new(
        k * (size.y * size.y + size.z * size.z),
        k * (size.x * size.x + size.z * size.z),
        k * (size.x * size.x + size.y * size.y),
    ))
}
