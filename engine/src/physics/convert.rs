//! Conversions between glam types and the engine's nalgebra types
//!
//! glam is used everywhere in the public API; nalgebra only appears at the
//! Rapier boundary.

use crate::core::Pose;
use glam::{DQuat, DVec3};
use rapier3d_f64::na::{Quaternion, Translation3, UnitQuaternion};
use rapier3d_f64::prelude::*;

pub fn to_vector(v: DVec3) -> Vector<Real> {
    vector![v.x, v.y, v.z]
}

pub fn to_point(v: DVec3) -> Point<Real> {
    point![v.x, v.y, v.z]
}

pub fn from_vector(v: &Vector<Real>) -> DVec3 {
    DVec3::new(v.x, v.y, v.z)
}

pub fn to_rotation(q: DQuat) -> UnitQuaternion<Real> {
    UnitQuaternion::new_normalize(Quaternion::new(q.w, q.x, q.y, q.z))
}

pub fn from_rotation(r: &UnitQuaternion<Real>) -> DQuat {
    DQuat::from_xyzw(r.i, r.j, r.k, r.w)
}

pub fn to_isometry(pose: &Pose) -> Isometry<Real> {
    let pose = pose.normalized();
    Isometry::from_parts(
        Translation3::new(pose.position.x, pose.position.y, pose.position.z),
        to_rotation(pose.rotation),
    )
}

pub fn from_isometry(iso: &Isometry<Real>) -> Pose {
    Pose::new(from_vector(&iso.translation.vector), from_rotation(&iso.rotation))
}
