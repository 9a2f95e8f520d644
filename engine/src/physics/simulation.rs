//! The simulation tick
//!
//! One tick runs, in order: explosions, queued mutations, assembly rebuilds,
//! constraint attachment, pose/velocity edits, the engine step and transform
//! publication. Only this module mutates the engine.
//!
//! The simulation owns the working [`AssemblyMaps`]. Readers on other threads
//! see the last published snapshot, swapped in under a short lock once the
//! structural phase is done.

use crate::config::PhysicsConfig;
use crate::physics::constraints::{self, AttachOutcome};
use crate::physics::contact::{ContactHooks, JoinDetector};
use crate::physics::convert::{from_isometry, from_vector, to_point};
use crate::physics::explosion::{self, explosion_impulse, push_direction};
use crate::physics::rebuild::update_assemblies;
use crate::physics::sync::{ExplosionHit, TransformUpdate};
use crate::physics::world::PhysicsWorld;
use crate::physics::{
    AssemblyMaps, Explosion, JoinedPairRegistry, JointGraph, Mutation, MutationQueue, SyncBuffers,
};
use crate::scene::{Joint, JointId, JointKind, Part, PartId};
use glam::DVec3;
use rayon::prelude::*;
use std::sync::{Arc, PoisonError, RwLock, TryLockError, Weak};
use tracing::{debug, info, trace};

/// State shared between the service front-end, the engine callbacks and the
/// simulation loop
#[derive(Debug)]
pub struct Shared {
    pub config: PhysicsConfig,
    pub mutations: Arc<MutationQueue>,
    pub registry: Arc<JoinedPairRegistry>,
    /// Snapshot of the simulation's assembly maps as of the last publish
    pub maps: RwLock<Arc<AssemblyMaps>>,
    pub sync: SyncBuffers,
    pub detector: JoinDetector,
}

impl Shared {
    pub fn new(config: PhysicsConfig) -> Self {
        let mutations = Arc::new(MutationQueue::new());
        let registry = Arc::new(JoinedPairRegistry::new());
        let detector = JoinDetector::new(config.join, registry.clone(), mutations.clone());
        Self {
            config,
            mutations,
            registry,
            maps: RwLock::new(Arc::new(AssemblyMaps::new())),
            sync: SyncBuffers::new(),
            detector,
        }
    }

    pub fn snapshot(&self) -> Arc<AssemblyMaps> {
        self.maps.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Simulation-thread state: the engine, the joint graph and per-tick
/// bookkeeping
pub struct Simulation {
    shared: Arc<Shared>,
    world: PhysicsWorld,
    graph: JointGraph,
    maps: AssemblyMaps,
    /// The last publish found the snapshot lock busy
    maps_stale: bool,
    dirty: Vec<PartId>,
    pending_attach: Vec<JointId>,
    tick: u64,
}

/// Edits applied after rebuilds so they land on the final bodies
enum LateEdit {
    Pose(PartId),
    Velocity(PartId, DVec3, DVec3),
    Retune(JointId),
}

impl Simulation {
    pub fn new(shared: Arc<Shared>) -> Self {
        let world = PhysicsWorld::new(&shared.config);
        Self {
            shared,
            world,
            graph: JointGraph::new(),
            maps: AssemblyMaps::new(),
            maps_stale: false,
            dirty: Vec::new(),
            pending_attach: Vec::new(),
            tick: 0,
        }
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn graph(&self) -> &JointGraph {
        &self.graph
    }

    /// Working maps; may be ahead of [`Shared::snapshot`]
    pub fn maps(&self) -> &AssemblyMaps {
        &self.maps
    }

    /// Run one tick. `dt` is clamped to the configured maximum; a zero `dt`
    /// applies all queued work without advancing the engine.
    pub fn tick(&mut self, dt: f64) {
        let shared = self.shared.clone();
        let dt = if dt.is_finite() {
            dt.clamp(0.0, shared.config.max_timestep)
        } else {
            shared.config.max_timestep
        };
        shared.registry.set_tick(self.tick);

        let mut maps = std::mem::take(&mut self.maps);
        let dead = maps.dead_parts();
        let explosions = shared.mutations.take_explosions();
        let mutations = shared.mutations.take_mutations();
        let mut changed = !dead.is_empty()
            || !explosions.is_empty()
            || !mutations.is_empty()
            || !self.dirty.is_empty();

        for part in dead {
            trace!(%part, "Dropping part released by the scene");
            self.unregister(&mut maps, part);
        }
        changed |= self.prune_orphaned(&mut maps);

        for explosion in explosions {
            self.explode(&mut maps, explosion);
        }

        let mut late = Vec::new();
        for mutation in mutations {
            self.apply(&mut maps, mutation, &mut late);
        }

        self.rebuild_dirty(&mut maps);
        self.attach_pending(&mut maps);

        for edit in late {
            self.apply_late(&maps, edit);
        }
        self.maps = maps;

        if changed || self.maps_stale {
            self.publish_maps();
        }

        if dt > 0.0 {
            let hooks = ContactHooks {
                detector: &shared.detector,
                registry: &shared.registry,
                maps: &self.maps,
                sync: &shared.sync,
            };
            self.world.step(dt, &hooks, &hooks);
            self.sync_joint_angles();
            self.publish_transforms();
        }

        self.tick += 1;
    }

    /// Swap the reader snapshot without waiting on readers
    fn publish_maps(&mut self) {
        let snapshot = Arc::new(self.maps.clone());
        match self.shared.maps.try_write() {
            Ok(mut published) => *published = snapshot,
            Err(TryLockError::Poisoned(poisoned)) => *poisoned.into_inner() = snapshot,
            Err(TryLockError::WouldBlock) => {
                trace!("Assembly snapshot busy, publishing next tick");
                self.maps_stale = true;
                return;
            }
        }
        self.maps_stale = false;
    }

    /// Drop joints whose scene parts are gone. True if any were dropped.
    fn prune_orphaned(&mut self, maps: &mut AssemblyMaps) -> bool {
        let orphaned = self.graph.remove_orphaned();
        for joint in &orphaned {
            let (id0, id1) = joint.part_ids();
            if joint.is_merge() {
                if !self.graph.has_merge_between(id0, id1) {
                    self.shared.registry.remove(id0, id1);
                }
                self.mark_dirty(maps, [id0, id1]);
            } else {
                constraints::detach(&mut self.world, maps, joint);
            }
            self.pending_attach.retain(|j| *j != joint.id());
            trace!(joint = ?joint.id(), "Dropped joint with a released endpoint");
        }
        !orphaned.is_empty()
    }

    fn sync_joint_angles(&self) {
        for joint in self.graph.iter() {
            if let Some(handle) = joint.constraint() {
                joint.set_current_angle(constraints::current_angle(&self.world, handle));
            }
        }
    }

    fn apply(&mut self, maps: &mut AssemblyMaps, mutation: Mutation, late: &mut Vec<LateEdit>) {
        match mutation {
            Mutation::Register(part) => self.register(maps, &part),
            Mutation::BulkRegister(parts) => {
                debug!(count = parts.len(), "Bulk registering parts");
                for part in &parts {
                    self.register(maps, part);
                }
            }
            Mutation::Unregister(part) => self.unregister(maps, part),
            Mutation::AddConstraint(joint) => self.add_constraint(maps, joint),
            Mutation::RemoveConstraint(id) => self.remove_constraint(maps, id),
            Mutation::AutoJoin { part0, part1 } => self.auto_join(maps, &part0, &part1),
            Mutation::AssemblyRebuild(part) => {
                if maps.is_registered(part) {
                    self.dirty.push(part);
                }
            }
            Mutation::BreakJoints(part) => self.break_joints(maps, part),
            Mutation::BreakJointsInRadius { center, radius } => {
                let parts = explosion::members_touching_sphere(
                    &self.world,
                    maps,
                    center,
                    radius,
                    self.shared.config.min_half_extent,
                );
                debug!(?center, radius, count = parts.len(), "Breaking joints in radius");
                for part in parts {
                    self.break_joints(maps, part);
                }
            }
            Mutation::SetPose(part) => late.push(LateEdit::Pose(part)),
            Mutation::SetVelocity {
                part,
                linear,
                angular,
            } => late.push(LateEdit::Velocity(part, linear, angular)),
            Mutation::RetuneMotor(joint) => late.push(LateEdit::Retune(joint)),
            Mutation::SetGravity(gravity) => self.world.set_gravity(gravity),
        }
    }

    fn apply_late(&mut self, maps: &AssemblyMaps, edit: LateEdit) {
        match edit {
            LateEdit::Pose(id) => {
                let (Some(part), Some(assembly)) = (maps.live_part(id), maps.assembly_of(id)) else {
                    return;
                };
                let Some(relative) = assembly.relative_of(id) else {
                    return;
                };
                let body_pose = part.pose() * relative.inverse();
                self.world.set_body_pose(assembly.body, &body_pose);
            }
            LateEdit::Velocity(id, linear, angular) => {
                if let Some(body) = maps.body_of(id) {
                    self.world.set_velocity(body, linear, angular);
                }
            }
            LateEdit::Retune(id) => {
                if let Some(joint) = self.graph.get(id) {
                    constraints::retune(&mut self.world, joint, &self.shared.config.motor);
                }
            }
        }
    }

    fn register(&mut self, maps: &mut AssemblyMaps, part: &Weak<Part>) {
        let Some(part) = part.upgrade() else {
            trace!("Skipping registration of a dropped part");
            return;
        };
        let id = part.id();
        if maps.register(&part) {
            // Authored merge joints waiting for this part join it again
            for joint in self.graph.joints_of(id) {
                let other = joint.other(id);
                if joint.is_merge() && maps.is_registered(other) {
                    self.shared.registry.insert(id, other);
                }
            }
            trace!(%id, name = part.name(), "Registered part");
        }
        self.dirty.push(id);
    }

    /// Idempotent: unknown parts are ignored
    fn unregister(&mut self, maps: &mut AssemblyMaps, id: PartId) {
        let Some(weak) = maps.unregister(id) else {
            return;
        };
        self.dirty.retain(|p| *p != id);

        for joint in self.graph.remove_auto_joins(id) {
            let (a, b) = joint.part_ids();
            self.shared.registry.remove(a, b);
        }
        self.shared.registry.remove_part(id);

        let attached: Vec<Arc<Joint>> = self
            .graph
            .joints_of(id)
            .filter(|joint| !joint.is_merge())
            .cloned()
            .collect();
        for joint in attached {
            constraints::detach(&mut self.world, maps, &joint);
        }

        if let Some(body) = maps.detach_part(id) {
            let survivor = maps
                .assembly(body)
                .and_then(|assembly| assembly.members.first())
                .map(|member| member.id);
            match survivor {
                Some(survivor) => self.dirty.push(survivor),
                None => {
                    maps.remove_assembly(body);
                    self.world.remove_body(body);
                }
            }
        }

        if let Some(part) = weak.upgrade() {
            part.set_body_handle(None);
        }
        self.shared.sync.transforms.discard(id);
        trace!(%id, "Unregistered part");
    }

    fn add_constraint(&mut self, maps: &mut AssemblyMaps, joint: Arc<Joint>) {
        let (Some(part0), Some(part1)) = (joint.part0(), joint.part1()) else {
            debug!(joint = ?joint.id(), "Discarding joint with a dropped endpoint");
            return;
        };
        let (id0, id1) = (part0.id(), part1.id());
        let id = joint.id();
        let is_merge = joint.is_merge();
        if !self.graph.insert(joint) {
            return;
        }
        if is_merge {
            if maps.is_registered(id0) && maps.is_registered(id1) {
                self.shared.registry.insert(id0, id1);
            }
            self.mark_dirty(maps, [id0, id1]);
        } else {
            self.pending_attach.push(id);
        }
    }

    fn remove_constraint(&mut self, maps: &mut AssemblyMaps, id: JointId) {
        let Some(joint) = self.graph.remove(id) else {
            return;
        };
        let (id0, id1) = joint.part_ids();
        if joint.is_merge() {
            if !self.graph.has_merge_between(id0, id1) {
                self.shared.registry.remove(id0, id1);
            }
            self.mark_dirty(maps, [id0, id1]);
        } else {
            constraints::detach(&mut self.world, maps, &joint);
        }
        self.pending_attach.retain(|j| *j != id);
    }

    fn auto_join(&mut self, maps: &mut AssemblyMaps, part0: &Weak<Part>, part1: &Weak<Part>) {
        let (Some(part0), Some(part1)) = (part0.upgrade(), part1.upgrade()) else {
            return;
        };
        let (id0, id1) = (part0.id(), part1.id());
        if !maps.is_registered(id0) || !maps.is_registered(id1) {
            self.shared.registry.remove(id0, id1);
            return;
        }
        if self.graph.has_merge_between(id0, id1) {
            return;
        }
        self.shared.registry.insert(id0, id1);
        self.graph.insert(Joint::auto_join(&part0, &part1));
        debug!(part0 = %id0, part1 = %id1, "Auto-joined parts");
        self.mark_dirty(maps, [id0, id1]);
    }

    /// Remove every joint touching `part`, report authored ones as broken
    fn break_joints(&mut self, maps: &mut AssemblyMaps, part: PartId) {
        let removed = self.graph.remove_all_of(part);
        let cooldown = self.shared.config.rejoin_cooldown_ticks;
        self.shared.registry.start_cooldown(part, cooldown);
        self.shared.registry.remove_part(part);
        if removed.is_empty() {
            return;
        }
        for joint in removed {
            let (id0, id1) = joint.part_ids();
            let other = joint.other(part);
            self.shared.registry.remove(id0, id1);
            self.shared.registry.start_cooldown(other, cooldown);
            constraints::detach(&mut self.world, maps, &joint);
            self.pending_attach.retain(|j| *j != joint.id());
            self.mark_dirty(maps, [id0, id1]);
            if joint.kind() != JointKind::AutoJoin {
                self.shared.sync.broken_joints.push(joint);
            }
        }
        trace!(%part, "Broke joints");
    }

    fn mark_dirty(&mut self, maps: &AssemblyMaps, parts: [PartId; 2]) {
        for part in parts {
            if maps.is_registered(part) {
                self.dirty.push(part);
            }
        }
    }

    fn rebuild_dirty(&mut self, maps: &mut AssemblyMaps) {
        if self.dirty.is_empty() {
            return;
        }
        let dirty = std::mem::take(&mut self.dirty);
        let report = update_assemblies(&mut self.world, &self.graph, maps, &self.shared.config, dirty);
        for joint in report.reattach {
            if !self.pending_attach.contains(&joint) {
                self.pending_attach.push(joint);
            }
        }
    }

    fn attach_pending(&mut self, maps: &mut AssemblyMaps) {
        let pending = std::mem::take(&mut self.pending_attach);
        for id in pending {
            let Some(joint) = self.graph.get(id).cloned() else {
                continue;
            };
            match constraints::attach(&mut self.world, maps, &joint, &self.shared.config.motor) {
                AttachOutcome::Deferred => self.pending_attach.push(id),
                AttachOutcome::Discarded => {
                    self.graph.remove(id);
                }
                AttachOutcome::Attached(_) | AttachOutcome::Dormant => {}
            }
        }
    }

    fn explode(&mut self, maps: &mut AssemblyMaps, explosion: Explosion) {
        let Explosion {
            position,
            radius,
            pressure,
        } = explosion;
        let affected = explosion::members_in_radius(&self.world, maps, position, radius);
        info!(?position, radius, pressure, affected = affected.len(), "Processing explosion");
        if affected.is_empty() {
            return;
        }

        for member in &affected {
            self.break_joints(maps, member.id);
        }
        self.rebuild_dirty(maps);

        let scale = self.shared.config.explosion_impulse_scale;
        let mut hits = Vec::with_capacity(affected.len());
        for member in affected {
            if let Some(body) = maps.body_of(member.id) {
                let magnitude = explosion_impulse(member.distance, radius, pressure, scale);
                let impulse = push_direction(position, member.position) * magnitude;
                if self.world.apply_impulse_at(body, impulse, member.position) {
                    self.world.wake(body);
                }
            }
            hits.push(ExplosionHit {
                id: member.id,
                part: member.part,
                distance: member.distance,
            });
        }
        self.shared.sync.explosion_hits.extend(hits);
    }

    /// Publish poses and velocities of every member of an awake body
    fn publish_transforms(&self) {
        let maps = &self.maps;
        let bodies = &self.world.rigid_body_set;

        let updates: Vec<TransformUpdate> = self
            .world
            .active_bodies()
            .par_iter()
            .filter_map(|handle| Some((bodies.get(*handle)?, maps.assembly(*handle)?)))
            .flat_map_iter(|(body, assembly)| {
                let body_pose = from_isometry(body.position());
                let angular = from_vector(body.angvel());
                assembly.members.iter().map(move |member| {
                    let pose = body_pose * member.relative;
                    let linear = from_vector(&body.velocity_at_point(&to_point(pose.position)));
                    TransformUpdate {
                        id: member.id,
                        part: member.part.clone(),
                        pose,
                        linear_velocity: linear,
                        angular_velocity: angular,
                    }
                })
            })
            .collect();

        if !updates.is_empty() {
            trace!(count = updates.len(), "Publishing transforms");
        }
        self.shared.sync.transforms.publish(updates);
    }
}
