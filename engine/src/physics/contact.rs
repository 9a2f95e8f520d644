//! Join detection from engine contacts
//!
//! The engine calls [`ContactHooks`] from inside a step, possibly from
//! worker threads. The hooks borrow the simulation's assembly maps read-only
//! for the step; they only claim pairs in the registry and enqueue.

use crate::config::JoinCriteria;
use crate::physics::convert::from_vector;
use crate::physics::shape::part_of_collider;
use crate::physics::sync::ContactEvent;
use crate::physics::{AssemblyMaps, JoinedPairRegistry, Mutation, MutationQueue, SyncBuffers};
use crate::scene::{Part, PartId, SurfaceType};
use glam::DVec3;
use rapier3d_f64::prelude::*;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Geometry and kinematics of one new contact between two parts
#[derive(Debug, Clone, Copy)]
pub struct ContactSample {
    /// Contact normal in part0's local space
    pub local_normal0: DVec3,
    /// Contact normal in part1's local space
    pub local_normal1: DVec3,
    pub point_count: usize,
    /// Deepest penetration among the manifold points (positive = overlap)
    pub penetration: f64,
    /// Linear velocity of body0 minus body1
    pub relative_velocity: DVec3,
}

/// Why a contact did not become a join
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum JoinRejection {
    #[error("relative speed² {0} above threshold")]
    TooFast(f64),
    #[error("contact normal not aligned with a box axis")]
    Misaligned,
    #[error("surfaces {0:?} and {1:?} do not join")]
    IncompatibleSurfaces(SurfaceType, SurfaceType),
    #[error("only {0} contact points")]
    TooFewPoints(usize),
    #[error("penetration {0} too deep")]
    TooDeep(f64),
    #[error("part is cooling down after a break")]
    Cooldown,
    #[error("pair is already joined")]
    AlreadyJoined,
}

/// Fixed compatibility table between two faces
pub fn surfaces_compatible(a: SurfaceType, b: SurfaceType) -> bool {
    use SurfaceType::*;
    if matches!(a, Weld | Glue) || matches!(b, Weld | Glue) {
        return true;
    }
    matches!(
        (a, b),
        (Studs, Inlets | Universal) | (Inlets, Studs | Universal) | (Universal, Studs | Inlets | Universal)
    )
}

/// Whether a local normal lies along one of the box axes
pub fn is_axis_aligned(normal: DVec3, criteria: &JoinCriteria) -> bool {
    let n = normal.abs();
    let along = |major: f64, minor_a: f64, minor_b: f64| {
        major > criteria.axis_alignment
            && minor_a < criteria.off_axis_tolerance
            && minor_b < criteria.off_axis_tolerance
    };
    along(n.x, n.y, n.z) || along(n.y, n.x, n.z) || along(n.z, n.x, n.y)
}

/// Pure geometric and kinematic checks for a contact
pub fn check_contact(
    criteria: &JoinCriteria,
    part0: &Part,
    part1: &Part,
    sample: &ContactSample,
) -> Result<(), JoinRejection> {
    let speed_sq = sample.relative_velocity.length_squared();
    if speed_sq > criteria.max_relative_speed_sq {
        return Err(JoinRejection::TooFast(speed_sq));
    }
    if !is_axis_aligned(sample.local_normal0, criteria)
        || !is_axis_aligned(sample.local_normal1, criteria)
    {
        return Err(JoinRejection::Misaligned);
    }
    let surface0 = part0.surface_for_normal(sample.local_normal0);
    let surface1 = part1.surface_for_normal(sample.local_normal1);
    if !surfaces_compatible(surface0, surface1) {
        return Err(JoinRejection::IncompatibleSurfaces(surface0, surface1));
    }
    if sample.point_count < criteria.min_manifold_points {
        return Err(JoinRejection::TooFewPoints(sample.point_count));
    }
    if sample.penetration.abs() >= criteria.max_penetration {
        return Err(JoinRejection::TooDeep(sample.penetration));
    }
    Ok(())
}

/// Turns accepted contacts into queued auto-joins
#[derive(Debug)]
pub struct JoinDetector {
    criteria: JoinCriteria,
    registry: Arc<JoinedPairRegistry>,
    mutations: Arc<MutationQueue>,
}

impl JoinDetector {
    pub fn new(
        criteria: JoinCriteria,
        registry: Arc<JoinedPairRegistry>,
        mutations: Arc<MutationQueue>,
    ) -> Self {
        Self {
            criteria,
            registry,
            mutations,
        }
    }

    pub fn criteria(&self) -> &JoinCriteria {
        &self.criteria
    }

    /// Evaluate a new contact and enqueue an auto-join when it qualifies.
    /// The registry claim makes the same pair enqueue at most once.
    pub fn propose(
        &self,
        part0: &Arc<Part>,
        part1: &Arc<Part>,
        sample: &ContactSample,
    ) -> Result<(), JoinRejection> {
        check_contact(&self.criteria, part0, part1, sample)?;
        if self.registry.in_cooldown(part0.id()) || self.registry.in_cooldown(part1.id()) {
            return Err(JoinRejection::Cooldown);
        }
        if !self.registry.try_claim(part0.id(), part1.id()) {
            return Err(JoinRejection::AlreadyJoined);
        }
        debug!(part0 = %part0.id(), part1 = %part1.id(), "Queueing auto-join");
        self.mutations.push(Mutation::AutoJoin {
            part0: Arc::downgrade(part0),
            part1: Arc::downgrade(part1),
        });
        Ok(())
    }
}

/// Engine callbacks installed for one step
pub struct ContactHooks<'a> {
    pub detector: &'a JoinDetector,
    pub registry: &'a JoinedPairRegistry,
    pub maps: &'a AssemblyMaps,
    pub sync: &'a SyncBuffers,
}

impl ContactHooks<'_> {
    fn parts_of(
        &self,
        colliders: &ColliderSet,
        c0: ColliderHandle,
        c1: ColliderHandle,
    ) -> Option<(Arc<Part>, Arc<Part>)> {
        let id0 = part_of_collider(colliders.get(c0)?);
        let id1 = part_of_collider(colliders.get(c1)?);
        Some((self.maps.live_part(id0)?, self.maps.live_part(id1)?))
    }

    fn pair_ids(colliders: &ColliderSet, c0: ColliderHandle, c1: ColliderHandle) -> Option<(PartId, PartId)> {
        Some((
            part_of_collider(colliders.get(c0)?),
            part_of_collider(colliders.get(c1)?),
        ))
    }
}

/// Convert the richest manifold of a contact pair into a sample
pub fn sample_from_pair(bodies: &RigidBodySet, pair: &ContactPair) -> Option<ContactSample> {
    let manifold = pair.manifolds.iter().max_by_key(|m| m.points.len())?;
    let body0 = bodies.get(manifold.data.rigid_body1?)?;
    let body1 = bodies.get(manifold.data.rigid_body2?)?;
    let penetration = manifold
        .points
        .iter()
        .map(|p| -p.dist)
        .fold(0.0_f64, f64::max);
    Some(ContactSample {
        local_normal0: from_vector(&manifold.local_n1),
        local_normal1: from_vector(&manifold.local_n2),
        point_count: manifold.points.len(),
        penetration,
        relative_velocity: from_vector(body0.linvel()) - from_vector(body1.linvel()),
    })
}

impl PhysicsHooks for ContactHooks<'_> {
    fn filter_contact_pair(&self, context: &PairFilterContext) -> Option<SolverFlags> {
        match Self::pair_ids(context.colliders, context.collider1, context.collider2) {
            Some((a, b)) if self.registry.contains(a, b) => None,
            _ => Some(SolverFlags::COMPUTE_IMPULSES),
        }
    }
}

impl EventHandler for ContactHooks<'_> {
    fn handle_collision_event(
        &self,
        bodies: &RigidBodySet,
        colliders: &ColliderSet,
        event: CollisionEvent,
        contact_pair: Option<&ContactPair>,
    ) {
        let CollisionEvent::Started(..) = event else {
            return;
        };
        let Some(pair) = contact_pair else {
            return;
        };
        let Some((part0, part1)) = self.parts_of(colliders, pair.collider1, pair.collider2) else {
            return;
        };

        self.sync.contacts.push(ContactEvent {
            part0: Arc::downgrade(&part0),
            part1: Arc::downgrade(&part1),
        });

        if let Some(sample) = sample_from_pair(bodies, pair) {
            if let Err(reason) = self.detector.propose(&part0, &part1, &sample) {
                trace!(part0 = %part0.id(), part1 = %part1.id(), %reason, "Contact not joined");
            }
        }
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{PartProperties, Surfaces};

    fn brick() -> Arc<Part> {
        Part::new("Brick", PartProperties::default().with_surfaces(Surfaces::brick()))
    }

    /// part0 sits on top of part1: bottom face against top face
    fn stacked_sample() -> ContactSample {
        ContactSample {
            local_normal0: -DVec3::Y,
            local_normal1: DVec3::Y,
            point_count: 4,
            penetration: 0.01,
            relative_velocity: DVec3::new(0.1, 0.0, 0.0),
        }
    }

    fn detector() -> (JoinDetector, Arc<JoinedPairRegistry>, Arc<MutationQueue>) {
        let registry = Arc::new(JoinedPairRegistry::new());
        let mutations = Arc::new(MutationQueue::new());
        (
            JoinDetector::new(JoinCriteria::default(), registry.clone(), mutations.clone()),
            registry,
            mutations,
        )
    }

    #[test]
    fn test_surface_table() {
        use SurfaceType::*;
        assert!(surfaces_compatible(Weld, Smooth));
        assert!(surfaces_compatible(Smooth, Glue));
        assert!(surfaces_compatible(Studs, Inlets));
        assert!(surfaces_compatible(Inlets, Universal));
        assert!(surfaces_compatible(Universal, Universal));
        assert!(!surfaces_compatible(Studs, Studs));
        assert!(!surfaces_compatible(Inlets, Inlets));
        assert!(!surfaces_compatible(Smooth, Studs));
        assert!(!surfaces_compatible(Hinge, Inlets));
    }

    #[test]
    fn test_axis_alignment() {
        let criteria = JoinCriteria::default();
        assert!(is_axis_aligned(DVec3::Y, &criteria));
        assert!(is_axis_aligned(-DVec3::Z, &criteria));
        assert!(!is_axis_aligned(DVec3::new(0.05, 0.998, 0.0).normalize(), &criteria));
        assert!(!is_axis_aligned(DVec3::new(1.0, 1.0, 0.0).normalize(), &criteria));
    }

    #[test]
    fn test_stacked_bricks_join() {
        let (detector, registry, mutations) = detector();
        let (top, bottom) = (brick(), brick());

        assert_eq!(detector.propose(&top, &bottom, &stacked_sample()), Ok(()));
        assert!(registry.contains(top.id(), bottom.id()));
        assert_eq!(mutations.take_mutations().len(), 1);
    }

    #[test]
    fn test_same_pair_twice_enqueues_once() {
        let (detector, _, mutations) = detector();
        let (top, bottom) = (brick(), brick());

        assert!(detector.propose(&top, &bottom, &stacked_sample()).is_ok());
        assert_eq!(
            detector.propose(&bottom, &top, &ContactSample {
                local_normal0: DVec3::Y,
                local_normal1: -DVec3::Y,
                ..stacked_sample()
            }),
            Err(JoinRejection::AlreadyJoined)
        );

        let auto_joins = mutations
            .take_mutations()
            .into_iter()
            .filter(|m| matches!(m, Mutation::AutoJoin { .. }))
            .count();
        assert_eq!(auto_joins, 1);
    }

    #[test]
    fn test_rejections() {
        let (detector, registry, mutations) = detector();
        let (top, bottom) = (brick(), brick());

        let fast = ContactSample {
            relative_velocity: DVec3::new(0.0, -1.0, 0.0),
            ..stacked_sample()
        };
        assert!(matches!(detector.propose(&top, &bottom, &fast), Err(JoinRejection::TooFast(_))));

        let edge = ContactSample {
            point_count: 2,
            ..stacked_sample()
        };
        assert_eq!(detector.propose(&top, &bottom, &edge), Err(JoinRejection::TooFewPoints(2)));

        let deep = ContactSample {
            penetration: 0.2,
            ..stacked_sample()
        };
        assert_eq!(detector.propose(&top, &bottom, &deep), Err(JoinRejection::TooDeep(0.2)));

        // Studs against studs: bottom brick upside down relative to the contact
        let flipped = ContactSample {
            local_normal0: DVec3::Y,
            local_normal1: DVec3::Y,
            ..stacked_sample()
        };
        assert_eq!(
            detector.propose(&top, &bottom, &flipped),
            Err(JoinRejection::IncompatibleSurfaces(SurfaceType::Studs, SurfaceType::Studs))
        );

        assert!(registry.is_empty());
        assert!(mutations.take_mutations().is_empty());
    }

    #[test]
    fn test_cooldown_blocks_join() {
        let (detector, registry, mutations) = detector();
        let (top, bottom) = (brick(), brick());
        registry.start_cooldown(bottom.id(), 10);

        assert_eq!(
            detector.propose(&top, &bottom, &stacked_sample()),
            Err(JoinRejection::Cooldown)
        );
        assert!(mutations.take_mutations().is_empty());
    }
}
