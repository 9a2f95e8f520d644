//! Joints between parts
//!
//! Weld, snap, glue and auto-joins mean "same body": the physics core merges
//! their endpoints into one assembly. Motors and hinges connect two separate
//! assemblies through an engine constraint.

use crate::core::Pose;
use crate::physics::ConstraintHandle;
use crate::scene::part::{Part, PartId};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

static NEXT_JOINT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identifier of a joint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JointId(u64);

impl JointId {
    fn next() -> Self {
        Self(NEXT_JOINT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn to_bits(self) -> u64 {
        self.0
    }
}

/// Joint type with its type-specific parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum JointKind {
    Weld,
    /// Breakable stud snap
    Snap,
    Glue,
    /// Created from surface contact by the join detector
    AutoJoin,
    /// Hinge driven toward `desired_angle`
    Motor { max_velocity: f64, desired_angle: f64 },
    /// Hinge driven at a constant angular velocity
    VelocityMotor { max_velocity: f64 },
    /// Free hinge, optionally limited to `[lower, upper]` radians
    Hinge { limits: Option<(f64, f64)> },
}

impl JointKind {
    /// Merge-type joints fuse their endpoints into one simulated body
    pub fn is_merge(&self) -> bool {
        matches!(
            self,
            JointKind::Weld | JointKind::Snap | JointKind::Glue | JointKind::AutoJoin
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            JointKind::Weld => "Weld",
            JointKind::Snap => "Snap",
            JointKind::Glue => "Glue",
            JointKind::AutoJoin => "AutoJoin",
            JointKind::Motor { .. } => "Motor",
            JointKind::VelocityMotor { .. } => "VelocityMotor",
            JointKind::Hinge { .. } => "Hinge",
        }
    }
}

/// A connection between two parts with an anchor frame in each part's space
pub struct Joint {
    id: JointId,
    kind: RwLock<JointKind>,
    part0: Weak<Part>,
    part1: Weak<Part>,
    part0_id: PartId,
    part1_id: PartId,
    c0: Pose,
    c1: Pose,
    constraint: RwLock<Option<ConstraintHandle>>,
    /// Hinge angle of the engine constraint as of the last tick
    angle: RwLock<Option<f64>>,
}

impl std::fmt::Debug for Joint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Joint")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("part0", &self.part0_id)
            .field("part1", &self.part1_id)
            .finish()
    }
}

impl Joint {
    /// Create a joint; `c0`/`c1` are anchor frames local to `part0`/`part1`
    pub fn new(kind: JointKind, part0: &Arc<Part>, part1: &Arc<Part>, c0: Pose, c1: Pose) -> Arc<Joint> {
        Arc::new(Joint {
            id: JointId::next(),
            kind: RwLock::new(kind),
            part0: Arc::downgrade(part0),
            part1: Arc::downgrade(part1),
            part0_id: part0.id(),
            part1_id: part1.id(),
            c0,
            c1,
            constraint: RwLock::new(None),
            angle: RwLock::new(None),
        })
    }

    /// Weld that keeps both parts at their current relative placement
    pub fn weld(part0: &Arc<Part>, part1: &Arc<Part>) -> Arc<Joint> {
        let c1 = part1.pose().inverse() * part0.pose();
        Joint::new(JointKind::Weld, part0, part1, Pose::IDENTITY, c1)
    }

    pub(crate) fn auto_join(part0: &Arc<Part>, part1: &Arc<Part>) -> Arc<Joint> {
        Joint::new(JointKind::AutoJoin, part0, part1, Pose::IDENTITY, Pose::IDENTITY)
    }

    pub fn id(&self) -> JointId {
        self.id
    }

    pub fn kind(&self) -> JointKind {
        *self.kind.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_merge(&self) -> bool {
        self.kind().is_merge()
    }

    pub fn part0(&self) -> Option<Arc<Part>> {
        self.part0.upgrade()
    }

    pub fn part1(&self) -> Option<Arc<Part>> {
        self.part1.upgrade()
    }

    pub fn part_ids(&self) -> (PartId, PartId) {
        (self.part0_id, self.part1_id)
    }

    /// The endpoint opposite to `part`
    pub fn other(&self, part: PartId) -> PartId {
        if part == self.part0_id {
            self.part1_id
        } else {
            self.part0_id
        }
    }

    pub fn involves(&self, part: PartId) -> bool {
        self.part0_id == part || self.part1_id == part
    }

    pub fn c0(&self) -> Pose {
        self.c0
    }

    pub fn c1(&self) -> Pose {
        self.c1
    }

    /// Engine constraint currently realising this joint (motors and hinges only)
    pub fn constraint(&self) -> Option<ConstraintHandle> {
        *self.constraint.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_constraint(&self, handle: Option<ConstraintHandle>) {
        *self.constraint.write().unwrap_or_else(PoisonError::into_inner) = handle;
    }

    pub(crate) fn take_constraint(&self) -> Option<ConstraintHandle> {
        self.constraint
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Rotation of part1's anchor frame about the hinge axis relative to
    /// part0's, in radians within `(-π, π]`. `None` while the joint has no
    /// engine constraint.
    pub fn current_angle(&self) -> Option<f64> {
        *self.angle.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_current_angle(&self, angle: Option<f64>) {
        *self.angle.write().unwrap_or_else(PoisonError::into_inner) = angle;
    }

    /// Change a velocity motor's target speed. Position motors follow their
    /// desired angle and are left untouched. The physics service must be told
    /// to retune the engine constraint.
    pub(crate) fn set_motor_velocity(&self, velocity: f64) -> bool {
        let mut kind = self.kind.write().unwrap_or_else(PoisonError::into_inner);
        match &mut *kind {
            JointKind::VelocityMotor { max_velocity } => {
                *max_velocity = velocity;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::part::PartProperties;
    use glam::DVec3;

    #[test]
    fn test_merge_kinds() {
        assert!(JointKind::Weld.is_merge());
        assert!(JointKind::Snap.is_merge());
        assert!(JointKind::Glue.is_merge());
        assert!(JointKind::AutoJoin.is_merge());
        assert!(!JointKind::Hinge { limits: None }.is_merge());
        assert!(!JointKind::VelocityMotor { max_velocity: 1.0 }.is_merge());
        assert!(!JointKind::Motor {
            max_velocity: 1.0,
            desired_angle: 0.0
        }
        .is_merge());
    }

    #[test]
    fn test_weld_preserves_relative_placement() {
        let a = Part::new(
            "A",
            PartProperties::default().with_position(DVec3::new(0.0, 1.0, 0.0)),
        );
        let b = Part::new(
            "B",
            PartProperties::default().with_position(DVec3::new(0.0, 2.2, 0.0)),
        );
        let weld = Joint::weld(&a, &b);

        // part0 * c0 == part1 * c1
        let world0 = a.pose() * weld.c0();
        let world1 = b.pose() * weld.c1();
        assert!(world0.abs_diff_eq(&world1, 1e-12));
        assert_eq!(weld.other(a.id()), b.id());
        assert_eq!(weld.other(b.id()), a.id());
    }

    #[test]
    fn test_endpoints_are_weak() {
        let a = Part::new("A", PartProperties::default());
        let b = Part::new("B", PartProperties::default());
        let joint = Joint::new(JointKind::Glue, &a, &b, Pose::IDENTITY, Pose::IDENTITY);
        drop(b);
        assert!(joint.part0().is_some());
        assert!(joint.part1().is_none());
    }

    #[test]
    fn test_set_motor_velocity_only_for_velocity_motors() {
        let a = Part::new("A", PartProperties::default());
        let b = Part::new("B", PartProperties::default());
        let motor = Joint::new(
            JointKind::VelocityMotor { max_velocity: 1.0 },
            &a,
            &b,
            Pose::IDENTITY,
            Pose::IDENTITY,
        );
        assert!(motor.set_motor_velocity(3.0));
        assert_eq!(motor.kind(), JointKind::VelocityMotor { max_velocity: 3.0 });

        let weld = Joint::weld(&a, &b);
        assert!(!weld.set_motor_velocity(3.0));

        let servo = Joint::new(
            JointKind::Motor {
                max_velocity: 1.0,
                desired_angle: 0.5,
            },
            &a,
            &b,
            Pose::IDENTITY,
            Pose::IDENTITY,
        );
        assert!(!servo.set_motor_velocity(3.0));
        assert_eq!(
            servo.kind(),
            JointKind::Motor {
                max_velocity: 1.0,
                desired_angle: 0.5
            }
        );
    }

    #[test]
    fn test_angle_unknown_until_synced() {
        let a = Part::new("A", PartProperties::default());
        let b = Part::new("B", PartProperties::default());
        let hinge = Joint::new(
            JointKind::Hinge { limits: None },
            &a,
            &b,
            Pose::IDENTITY,
            Pose::IDENTITY,
        );
        assert_eq!(hinge.current_angle(), None);
        hinge.set_current_angle(Some(0.25));
        assert_eq!(hinge.current_angle(), Some(0.25));
    }
}
