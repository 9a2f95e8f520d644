//! Assembly rebuilds around dirty parts
//!
//! A rebuild flood-fills the merge-joint component of a dirty part, tears
//! down every body the component's members were on and builds one new body
//! for the whole component. Members of torn-down assemblies that are no
//! longer connected are rebuilt in the same pass, so after
//! [`update_assemblies`] every registered part belongs to exactly one
//! assembly.

use crate::config::PhysicsConfig;
use crate::core::Pose;
use crate::physics::world::PhysicsWorld;
use crate::physics::{Assembly, AssemblyMaps, BodyHandle, JointGraph, Member};
use crate::scene::{JointId, Part, PartId};
use glam::DVec3;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};

/// Registered, live parts connected to `seed` through merge joints, in visit
/// order
pub fn flood_fill(seed: PartId, graph: &JointGraph, maps: &AssemblyMaps) -> Vec<Arc<Part>> {
    let mut component = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![seed];

    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Some(part) = maps.live_part(id) else {
            continue;
        };
        component.push(part);
        for neighbor in graph.merge_neighbors(id) {
            if !visited.contains(&neighbor) && maps.live_part(neighbor).is_some() {
                stack.push(neighbor);
            }
        }
    }
    component
}

/// Largest-volume member; the first one seen wins ties
pub fn choose_root(volumes: &[(PartId, f64)]) -> Option<PartId> {
    let mut best: Option<(PartId, f64)> = None;
    for &(id, volume) in volumes {
        match best {
            Some((_, best_volume)) if volume <= best_volume => {}
            _ => best = Some((id, volume)),
        }
    }
    best.map(|(id, _)| id)
}

/// Outcome of one [`update_assemblies`] pass
#[derive(Debug, Default)]
pub struct RebuildReport {
    pub built: Vec<BodyHandle>,
    /// Motor and hinge joints that must be attached against the new bodies
    pub reattach: Vec<JointId>,
}

/// Rebuild the assemblies of every part in `dirty`, in order. The first
/// dynamic body met while walking a component donates its velocity.
pub fn update_assemblies(
    world: &mut PhysicsWorld,
    graph: &JointGraph,
    maps: &mut AssemblyMaps,
    config: &PhysicsConfig,
    dirty: Vec<PartId>,
) -> RebuildReport {
    let mut report = RebuildReport::default();
    let mut worklist: VecDeque<PartId> = dirty.into();
    let mut done: HashSet<PartId> = HashSet::new();
    let mut reattach: HashSet<JointId> = HashSet::new();

    while let Some(seed) = worklist.pop_front() {
        if done.contains(&seed) || !maps.is_registered(seed) {
            continue;
        }
        let component = flood_fill(seed, graph, maps);
        if component.is_empty() {
            continue;
        }
        let ids: HashSet<PartId> = component.iter().map(|p| p.id()).collect();

        // Capture world poses and motion before anything is destroyed
        let mut old_bodies: Vec<BodyHandle> = Vec::new();
        let mut poses: Vec<Pose> = Vec::with_capacity(component.len());
        let mut velocity: Option<(DVec3, DVec3)> = None;
        for part in &component {
            let current = maps.assembly_of(part.id()).and_then(|assembly| {
                let body_pose = world.body_pose(assembly.body)?;
                Some((assembly.body, body_pose * assembly.relative_of(part.id())?))
            });
            match current {
                Some((body, pose)) => {
                    if !old_bodies.contains(&body) {
                        old_bodies.push(body);
                        if velocity.is_none() && world.is_dynamic(body) {
                            velocity = world.velocity(body);
                        }
                    }
                    poses.push(pose);
                }
                None => poses.push(part.pose()),
            }
        }

        for body in old_bodies {
            if let Some(old) = maps.remove_assembly(body) {
                for member in &old.members {
                    if !ids.contains(&member.id) && !done.contains(&member.id) {
                        worklist.push_back(member.id);
                    }
                }
                reattach.extend(old.constraints.iter().copied());
            }
            world.remove_body(body);
        }

        let volumes: Vec<(PartId, f64)> = component.iter().map(|p| (p.id(), p.volume())).collect();
        let Some(root) = choose_root(&volumes) else {
            continue;
        };
        let root_index = component.iter().position(|p| p.id() == root).unwrap_or(0);
        let root_pose = poses[root_index];
        let root_inverse = root_pose.inverse();
        let is_static = component.iter().any(|p| p.is_anchored());

        let body = world.create_body(&root_pose, is_static);
        let mut members = Vec::with_capacity(component.len());
        for (part, pose) in component.iter().zip(&poses) {
            let relative = root_inverse * *pose;
            world.attach_member(body, part.id(), part.size(), &relative, config);
            members.push(Member {
                id: part.id(),
                part: Arc::downgrade(part),
                relative,
                volume: part.volume(),
            });
            part.set_body_handle(Some(body));
            done.insert(part.id());
            for joint in graph.joints_of(part.id()) {
                if !joint.is_merge() {
                    reattach.insert(joint.id());
                }
            }
        }
        world.refresh_mass(body);
        if let (false, Some((linear, angular))) = (is_static, velocity) {
            world.set_velocity(body, linear, angular);
        }

        debug!(
            ?body,
            %root,
            members = members.len(),
            is_static,
            "Built assembly"
        );
        maps.insert_assembly(Assembly {
            body,
            root,
            members,
            is_static,
            constraints: HashSet::new(),
        });
        report.built.push(body);
    }

    report.reattach = reattach.into_iter().collect();
    report.reattach.sort();
    trace!(built = report.built.len(), reattach = report.reattach.len(), "Assembly pass done");
    report
}
