//! Engine constraints for motor and hinge joints
//!
//! Merge-type joints never reach this module: sharing a body is the join.
//! Everything else becomes a revolute joint between two assembly bodies, free
//! around the X axis of the anchor frames.

use crate::config::MotorSettings;
use crate::core::Pose;
use crate::physics::convert::{from_isometry, to_isometry};
use crate::physics::world::PhysicsWorld;
use crate::physics::{AssemblyMaps, ConstraintHandle};
use crate::scene::{Joint, JointKind};
use glam::DQuat;
use rapier3d_f64::prelude::*;
use tracing::{debug, trace};

/// Result of trying to realise a joint in the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    Attached(ConstraintHandle),
    /// An endpoint has no body yet; retry next tick
    Deferred,
    /// An endpoint no longer exists
    Discarded,
    /// Nothing to attach right now (merge joint, unregistered endpoint, or
    /// both endpoints in one assembly)
    Dormant,
}

/// Revolute joint description for a motor or hinge, `None` for merge kinds.
/// `frame0`/`frame1` are anchor frames in the two bodies' local space.
pub fn revolute_joint(
    kind: &JointKind,
    frame0: &Pose,
    frame1: &Pose,
    motor: &MotorSettings,
) -> Option<GenericJoint> {
    let builder = GenericJointBuilder::new(JointAxesMask::LOCKED_REVOLUTE_AXES)
        .local_frame1(to_isometry(frame0))
        .local_frame2(to_isometry(frame1));

    let builder = match *kind {
        JointKind::Motor { desired_angle, .. } => builder
            .motor_position(JointAxis::AngX, desired_angle, motor.stiffness, motor.damping)
            .motor_max_force(JointAxis::AngX, motor.max_force),
        JointKind::VelocityMotor { max_velocity } => builder
            .motor_velocity(JointAxis::AngX, max_velocity, motor.velocity_factor)
            .motor_max_force(JointAxis::AngX, motor.max_force),
        JointKind::Hinge { limits: Some((lower, upper)) } => {
            builder.limits(JointAxis::AngX, [lower.min(upper), lower.max(upper)])
        }
        JointKind::Hinge { limits: None } => builder,
        JointKind::Weld | JointKind::Snap | JointKind::Glue | JointKind::AutoJoin => return None,
    };
    Some(builder.build())
}

/// Create (or recreate) the engine constraint for `joint` between the
/// assemblies holding its endpoints
pub fn attach(
    world: &mut PhysicsWorld,
    maps: &mut AssemblyMaps,
    joint: &Joint,
    motor: &MotorSettings,
) -> AttachOutcome {
    let kind = joint.kind();
    if kind.is_merge() {
        return AttachOutcome::Dormant;
    }
    let (Some(part0), Some(part1)) = (joint.part0(), joint.part1()) else {
        debug!(joint = ?joint.id(), "Discarding constraint with a dropped endpoint");
        return AttachOutcome::Discarded;
    };
    let (id0, id1) = (part0.id(), part1.id());
    if !maps.is_registered(id0) || !maps.is_registered(id1) {
        return AttachOutcome::Dormant;
    }
    let (Some(body0), Some(body1)) = (maps.body_of(id0), maps.body_of(id1)) else {
        return AttachOutcome::Deferred;
    };
    if body0 == body1 {
        trace!(joint = ?joint.id(), "Both endpoints share an assembly; constraint stays dormant");
        detach(world, maps, joint);
        return AttachOutcome::Dormant;
    }

    let rel0 = maps.assembly(body0).and_then(|a| a.relative_of(id0));
    let rel1 = maps.assembly(body1).and_then(|a| a.relative_of(id1));
    let (Some(rel0), Some(rel1)) = (rel0, rel1) else {
        return AttachOutcome::Deferred;
    };

    let Some(data) = revolute_joint(&kind, &(rel0 * joint.c0()), &(rel1 * joint.c1()), motor)
    else {
        return AttachOutcome::Dormant;
    };

    detach(world, maps, joint);
    let handle = world.insert_joint(body0, body1, data);
    joint.set_constraint(Some(handle));
    for body in [body0, body1] {
        if let Some(assembly) = maps.assembly_mut(body) {
            assembly.constraints.insert(joint.id());
        }
    }
    debug!(joint = ?joint.id(), kind = kind.name(), "Attached constraint");
    AttachOutcome::Attached(handle)
}

/// Remove the engine constraint of `joint`, if any
pub fn detach(world: &mut PhysicsWorld, maps: &mut AssemblyMaps, joint: &Joint) {
    if let Some(handle) = joint.take_constraint() {
        world.remove_joint(handle);
    }
    joint.set_current_angle(None);
    let (id0, id1) = joint.part_ids();
    for part in [id0, id1] {
        if let Some(body) = maps.body_of(part) {
            if let Some(assembly) = maps.assembly_mut(body) {
                assembly.constraints.remove(&joint.id());
            }
        }
    }
}

/// Angle of the second anchor frame about the shared X axis, measured from
/// the first, in `(-π, π]`
pub fn current_angle(world: &PhysicsWorld, handle: ConstraintHandle) -> Option<f64> {
    let engine_joint = world.joint(handle)?;
    let body0 = world.body_pose(engine_joint.body1)?;
    let body1 = world.body_pose(engine_joint.body2)?;
    let frame0 = body0 * from_isometry(&engine_joint.data.local_frame1);
    let frame1 = body1 * from_isometry(&engine_joint.data.local_frame2);
    Some(angle_about_x(frame0.rotation.inverse() * frame1.rotation))
}

fn angle_about_x(relative: DQuat) -> f64 {
    let q = if relative.w < 0.0 { -relative } else { relative };
    let angle = 2.0 * q.x.atan2(q.w);
    if angle <= -std::f64::consts::PI {
        angle + 2.0 * std::f64::consts::PI
    } else {
        angle
    }
}

/// Push changed motor targets into an existing constraint
pub fn retune(world: &mut PhysicsWorld, joint: &Joint, motor: &MotorSettings) -> bool {
    let Some(handle) = joint.constraint() else {
        return false;
    };
    let Some(engine_joint) = world.joint_mut(handle) else {
        return false;
    };
    match joint.kind() {
        JointKind::Motor { desired_angle, .. } => {
            engine_joint.data.set_motor_position(
                JointAxis::AngX,
                desired_angle,
                motor.stiffness,
                motor.damping,
            );
        }
        JointKind::VelocityMotor { max_velocity } => {
            engine_joint
                .data
                .set_motor_velocity(JointAxis::AngX, max_velocity, motor.velocity_factor);
        }
        _ => return false,
    }
    let (body0, body1) = (engine_joint.body1, engine_joint.body2);
    world.wake(body0);
    world.wake(body1);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhysicsConfig;
    use glam::DVec3;

    #[test]
    fn test_merge_kinds_have_no_engine_joint() {
        let motor = MotorSettings::default();
        for kind in [JointKind::Weld, JointKind::Snap, JointKind::Glue, JointKind::AutoJoin] {
            assert!(revolute_joint(&kind, &Pose::IDENTITY, &Pose::IDENTITY, &motor).is_none());
        }
    }

    #[test]
    fn test_hinge_frames_and_limits() {
        let motor = MotorSettings::default();
        let frame0 = Pose::from_position(DVec3::new(1.0, 0.0, 0.0));
        let frame1 = Pose::from_position(DVec3::new(-1.0, 0.0, 0.0));
        let joint = revolute_joint(
            &JointKind::Hinge {
                limits: Some((0.5, -0.5)),
            },
            &frame0,
            &frame1,
            &motor,
        )
        .unwrap();

        assert_eq!(joint.local_frame1.translation.vector.x, 1.0);
        assert_eq!(joint.local_frame2.translation.vector.x, -1.0);
        let limits = joint.limits(JointAxis::AngX).unwrap();
        assert_eq!(limits.min, -0.5);
        assert_eq!(limits.max, 0.5);
        assert!(joint.locked_axes.contains(JointAxesMask::LOCKED_REVOLUTE_AXES));
    }

    #[test]
    fn test_velocity_motor_target() {
        let motor = MotorSettings::default();
        let joint = revolute_joint(
            &JointKind::VelocityMotor { max_velocity: 2.5 },
            &Pose::IDENTITY,
            &Pose::IDENTITY,
            &motor,
        )
        .unwrap();
        let drive = joint.motor(JointAxis::AngX).unwrap();
        assert_eq!(drive.target_vel, 2.5);
        assert_eq!(drive.max_force, motor.max_force);
    }

    #[test]
    fn test_angle_about_x_range() {
        assert!((angle_about_x(DQuat::from_rotation_x(0.5)) - 0.5).abs() < 1e-12);
        assert!((angle_about_x(DQuat::from_rotation_x(-2.0)) + 2.0).abs() < 1e-12);
        // Past half a turn wraps to the negative side
        let wrapped = angle_about_x(DQuat::from_rotation_x(3.5));
        assert!((wrapped - (3.5 - 2.0 * std::f64::consts::PI)).abs() < 1e-12);
        assert_eq!(angle_about_x(DQuat::IDENTITY), 0.0);
    }

    #[test]
    fn test_current_angle_follows_bodies() {
        let mut world = PhysicsWorld::new(&PhysicsConfig::default());
        let body0 = world.create_body(&Pose::IDENTITY, true);
        let body1 = world.create_body(&Pose::IDENTITY, false);
        let data = revolute_joint(
            &JointKind::Hinge { limits: None },
            &Pose::from_position(DVec3::new(1.0, 0.0, 0.0)),
            &Pose::IDENTITY,
            &MotorSettings::default(),
        )
        .unwrap();
        let handle = world.insert_joint(body0, body1, data);

        world.set_body_pose(body1, &Pose::from_position(DVec3::new(1.0, 0.0, 0.0)));
        assert!(current_angle(&world, handle).unwrap().abs() < 1e-9);

        world.set_body_pose(
            body1,
            &Pose::new(DVec3::new(1.0, 0.0, 0.0), DQuat::from_rotation_x(0.5)),
        );
        assert!((current_angle(&world, handle).unwrap() - 0.5).abs() < 1e-9);

        world.remove_joint(handle);
        assert_eq!(current_angle(&world, handle), None);
    }
}
