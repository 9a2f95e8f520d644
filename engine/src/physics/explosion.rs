//! Explosion impulses and radius queries over assembly members

use crate::core::Pose;
use crate::physics::convert::{to_isometry, to_point};
use crate::physics::shape;
use crate::physics::world::PhysicsWorld;
use crate::physics::AssemblyMaps;
use crate::scene::{Part, PartId};
use glam::DVec3;
use rapier3d_f64::parry::query::PointQuery;
use std::sync::Weak;

/// Magnitude of the impulse an explosion gives a member at `distance`.
/// Falls off linearly from `pressure * scale` at the center to zero at the
/// radius.
pub fn explosion_impulse(distance: f64, radius: f64, pressure: f64, scale: f64) -> f64 {
    if radius <= 0.0 || distance >= radius || !distance.is_finite() {
        return 0.0;
    }
    pressure * (1.0 - distance.max(0.0) / radius) * scale
}

/// Unit direction pushing `point` away from `center`; straight up when the
/// two coincide
pub fn push_direction(center: DVec3, point: DVec3) -> DVec3 {
    (point - center).try_normalize().unwrap_or(DVec3::Y)
}

/// A member caught by an explosion
#[derive(Debug, Clone)]
pub struct AffectedMember {
    pub id: PartId,
    pub part: Weak<Part>,
    pub position: DVec3,
    pub distance: f64,
}

/// World pose of a member, taken from its body when it has one
pub fn member_world_pose(world: &PhysicsWorld, maps: &AssemblyMaps, part: PartId) -> Option<Pose> {
    let assembly = maps.assembly_of(part)?;
    let body_pose = world.body_pose(assembly.body)?;
    Some(body_pose * assembly.relative_of(part)?)
}

/// Members whose center lies within `radius` of `center`
pub fn members_in_radius(
    world: &PhysicsWorld,
    maps: &AssemblyMaps,
    center: DVec3,
    radius: f64,
) -> Vec<AffectedMember> {
    let mut affected = Vec::new();
    for assembly in maps.assemblies() {
        let Some(body_pose) = world.body_pose(assembly.body) else {
            continue;
        };
        for member in &assembly.members {
            let position = (body_pose * member.relative).position;
            let distance = position.distance(center);
            if distance <= radius {
                affected.push(AffectedMember {
                    id: member.id,
                    part: member.part.clone(),
                    position,
                    distance,
                });
            }
        }
    }
    affected.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    affected
}

/// Members whose box intersects the sphere at `center` with `radius`
pub fn members_touching_sphere(
    world: &PhysicsWorld,
    maps: &AssemblyMaps,
    center: DVec3,
    radius: f64,
    min_half_extent: f64,
) -> Vec<PartId> {
    let mut touching = Vec::new();
    for assembly in maps.assemblies() {
        let Some(body_pose) = world.body_pose(assembly.body) else {
            continue;
        };
        for member in &assembly.members {
            let Some(part) = member.part.upgrade() else {
                continue;
            };
            let cuboid = shape::cuboid(part.size(), min_half_extent);
            let iso = to_isometry(&(body_pose * member.relative));
            if cuboid.distance_to_point(&iso, &to_point(center), true) <= radius {
                touching.push(member.id);
            }
        }
    }
    touching
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impulse_falloff() {
        assert_eq!(explosion_impulse(0.0, 10.0, 100.0, 5.0), 500.0);
        assert_eq!(explosion_impulse(5.0, 10.0, 100.0, 5.0), 250.0);
        assert_eq!(explosion_impulse(10.0, 10.0, 100.0, 5.0), 0.0);
        assert_eq!(explosion_impulse(12.0, 10.0, 100.0, 5.0), 0.0);
    }

    #[test]
    fn test_impulse_is_monotonic() {
        let samples: Vec<f64> = (0..=20)
            .map(|i| explosion_impulse(i as f64 * 0.5, 10.0, 100.0, 5.0))
            .collect();
        assert!(samples.windows(2).all(|w| w[0] >= w[1]));
        assert!(samples.windows(2).take(19).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_degenerate_radius() {
        assert_eq!(explosion_impulse(0.0, 0.0, 100.0, 5.0), 0.0);
        assert_eq!(explosion_impulse(0.0, -1.0, 100.0, 5.0), 0.0);
    }

    #[test]
    fn test_push_direction() {
        let dir = push_direction(DVec3::ZERO, DVec3::new(3.0, 0.0, 4.0));
        assert!((dir - DVec3::new(0.6, 0.0, 0.8)).length() < 1e-12);
        assert_eq!(push_direction(DVec3::ONE, DVec3::ONE), DVec3::Y);
    }
}
