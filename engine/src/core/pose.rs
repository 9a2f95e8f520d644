//! Rigid pose type shared by the scene boundary and the physics core
//!
//! A pose is a position plus an orientation in 64-bit precision, matching the
//! precision of the physics backend. Composition follows the usual
//! parent * child convention: `a * b` maps `b`'s local space through `a`.

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};
use std::ops::Mul;

/// Position and rotation of a rigid object
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Pose {
    /// Position in the parent space
    pub position: DVec3,
    /// Rotation in the parent space
    pub rotation: DQuat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    /// The identity pose
    pub const IDENTITY: Pose = Pose {
        position: DVec3::ZERO,
        rotation: DQuat::IDENTITY,
    };

    /// Create a pose from a position and a rotation
    pub fn new(position: DVec3, rotation: DQuat) -> Self {
        Self { position, rotation }
    }

    /// Create an unrotated pose at the given position
    pub fn from_position(position: DVec3) -> Self {
        Self {
            position,
            rotation: DQuat::IDENTITY,
        }
    }

    /// Inverse pose, so that `p.inverse() * p == IDENTITY`
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            position: rotation * -self.position,
            rotation,
        }
    }

    /// Map a point from this pose's local space into the parent space
    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.position + self.rotation * point
    }

    /// Rotate a direction from local space into the parent space
    pub fn transform_vector(&self, vector: DVec3) -> DVec3 {
        self.rotation * vector
    }

    /// Local X axis expressed in the parent space (hinge axis for joints)
    pub fn right_vector(&self) -> DVec3 {
        self.rotation * DVec3::X
    }

    /// Same pose with the rotation renormalized; falls back to identity when
    /// the rotation is degenerate (zero length or NaN).
    pub fn normalized(&self) -> Self {
        let length = self.rotation.length();
        let rotation = if length.is_finite() && length > 1e-12 {
            self.rotation / length
        } else {
            DQuat::IDENTITY
        };
        Self {
            position: self.position,
            rotation,
        }
    }

    /// Approximate equality for tests and change detection
    pub fn abs_diff_eq(&self, other: &Pose, epsilon: f64) -> bool {
        self.position.abs_diff_eq(other.position, epsilon)
            && (self.rotation.abs_diff_eq(other.rotation, epsilon)
                || self.rotation.abs_diff_eq(-other.rotation, epsilon))
    }
}

impl Mul for Pose {
    type Output = Pose;

    fn mul(self, rhs: Pose) -> Pose {
        Pose {
            position: self.transform_point(rhs.position),
            rotation: self.rotation * rhs.rotation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_inverse_composes_to_identity() {
        let pose = Pose::new(
            DVec3::new(3.0, -2.0, 7.5),
            DQuat::from_rotation_y(0.7) * DQuat::from_rotation_x(-0.3),
        );
        let identity = pose.inverse() * pose;
        assert!(identity.abs_diff_eq(&Pose::IDENTITY, 1e-12));
        let identity = pose * pose.inverse();
        assert!(identity.abs_diff_eq(&Pose::IDENTITY, 1e-12));
    }

    #[test]
    fn test_relative_transform_round_trip() {
        let root = Pose::new(DVec3::new(0.0, 5.0, 0.0), DQuat::from_rotation_z(FRAC_PI_2));
        let member = Pose::new(DVec3::new(2.0, 5.0, 1.0), DQuat::from_rotation_x(0.25));

        let relative = root.inverse() * member;
        let restored = root * relative;
        assert!(restored.abs_diff_eq(&member, 1e-12));
    }

    #[test]
    fn test_transform_point_applies_rotation_then_translation() {
        let pose = Pose::new(DVec3::new(1.0, 0.0, 0.0), DQuat::from_rotation_y(FRAC_PI_2));
        let point = pose.transform_point(DVec3::X);
        assert!(point.abs_diff_eq(DVec3::new(1.0, 0.0, -1.0), 1e-12));
    }

    #[test]
    fn test_normalized_rejects_degenerate_rotation() {
        let pose = Pose::new(DVec3::ONE, DQuat::from_xyzw(0.0, 0.0, 0.0, 0.0));
        assert_eq!(pose.normalized().rotation, DQuat::IDENTITY);
        assert_eq!(pose.normalized().position, DVec3::ONE);
    }
}
