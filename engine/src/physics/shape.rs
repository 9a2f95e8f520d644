//! Translation of part geometry into engine body and collider descriptions

use crate::config::PhysicsConfig;
use crate::core::Pose;
use crate::physics::convert::to_isometry;
use crate::scene::PartId;
use glam::DVec3;
use rapier3d_f64::parry::shape::Cuboid;
use rapier3d_f64::prelude::*;

/// Half extents of a box of `size`, clamped so no axis collapses
pub fn half_extents(size: DVec3, min_half_extent: f64) -> DVec3 {
    let clamp = |v: f64| {
        let half = v.abs() * 0.5;
        if half.is_finite() && half >= min_half_extent {
            half
        } else {
            min_half_extent
        }
    };
    DVec3::new(clamp(size.x), clamp(size.y), clamp(size.z))
}

/// Collision shape of one part, used for geometry queries
pub fn cuboid(size: DVec3, min_half_extent: f64) -> Cuboid {
    let half = half_extents(size, min_half_extent);
    Cuboid::new(vector![half.x, half.y, half.z])
}

/// Body description for an assembly rooted at `root_pose`
pub fn body_builder(root_pose: &Pose, is_static: bool) -> RigidBodyBuilder {
    let builder = if is_static {
        RigidBodyBuilder::fixed()
    } else {
        RigidBodyBuilder::dynamic()
    };
    builder.position(to_isometry(root_pose))
}

/// Box collider for one assembly member, placed at `relative` in body space
/// and tagged with the member's part id
pub fn member_collider(
    part: PartId,
    size: DVec3,
    relative: &Pose,
    config: &PhysicsConfig,
) -> ColliderBuilder {
    let half = half_extents(size, config.min_half_extent);
    ColliderBuilder::cuboid(half.x, half.y, half.z)
        .position(to_isometry(relative))
        .density(config.density)
        .friction(config.friction)
        .restitution(config.restitution)
        .user_data(u128::from(part.to_bits()))
        .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS)
        .active_events(ActiveEvents::COLLISION_EVENTS)
}

/// Recover the part id a collider was tagged with
pub fn part_of_collider(collider: &Collider) -> PartId {
    PartId::from_bits(collider.user_data as u64)
}
