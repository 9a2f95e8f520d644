//! Assemblies: groups of rigidly joined parts simulated as one body
//!
//! Assemblies live in an arena keyed by their body handle. Parts point into
//! the arena through `part_index`; assemblies only observe parts through
//! `Weak` references.

use crate::core::Pose;
use crate::physics::BodyHandle;
use crate::scene::{JointId, Part, PartId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

/// One part inside an assembly
#[derive(Debug, Clone)]
pub struct Member {
    pub id: PartId,
    pub part: Weak<Part>,
    /// Pose of the part relative to the assembly root
    pub relative: Pose,
    pub volume: f64,
}

#[derive(Debug, Clone)]
pub struct Assembly {
    pub body: BodyHandle,
    pub root: PartId,
    pub members: Vec<Member>,
    pub is_static: bool,
    /// Motor and hinge joints currently attached to this body
    pub constraints: HashSet<JointId>,
}

impl Assembly {
    pub fn member(&self, part: PartId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == part)
    }

    pub fn contains(&self, part: PartId) -> bool {
        self.member(part).is_some()
    }

    pub fn relative_of(&self, part: PartId) -> Option<Pose> {
        self.member(part).map(|m| m.relative)
    }

    pub fn member_ids(&self) -> Vec<PartId> {
        self.members.iter().map(|m| m.id).collect()
    }

    pub fn info(&self) -> AssemblyInfo {
        AssemblyInfo {
            body: self.body,
            root: self.root,
            members: self.member_ids(),
            is_static: self.is_static,
        }
    }
}

/// Read-only snapshot of an assembly for callers outside the simulation
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyInfo {
    pub body: BodyHandle,
    pub root: PartId,
    pub members: Vec<PartId>,
    pub is_static: bool,
}

/// Registered parts and the assembly arena
#[derive(Debug, Clone, Default)]
pub struct AssemblyMaps {
    registered: HashMap<PartId, Weak<Part>>,
    assemblies: HashMap<BodyHandle, Assembly>,
    part_index: HashMap<PartId, BodyHandle>,
}

impl AssemblyMaps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self, part: PartId) -> bool {
        self.registered.contains_key(&part)
    }

    /// Registered part, if it is still alive
    pub fn live_part(&self, part: PartId) -> Option<Arc<Part>> {
        self.registered.get(&part).and_then(Weak::upgrade)
    }

    /// Returns false if the part was already registered
    pub fn register(&mut self, part: &Arc<Part>) -> bool {
        self.registered
            .insert(part.id(), Arc::downgrade(part))
            .is_none()
    }

    pub fn unregister(&mut self, part: PartId) -> Option<Weak<Part>> {
        self.registered.remove(&part)
    }

    /// Registered parts whose scene object has been dropped
    pub fn dead_parts(&self) -> Vec<PartId> {
        self.registered
            .iter()
            .filter(|(_, weak)| weak.strong_count() == 0)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn body_of(&self, part: PartId) -> Option<BodyHandle> {
        self.part_index.get(&part).copied()
    }

    pub fn assembly_of(&self, part: PartId) -> Option<&Assembly> {
        self.body_of(part).and_then(|body| self.assemblies.get(&body))
    }

    pub fn assembly(&self, body: BodyHandle) -> Option<&Assembly> {
        self.assemblies.get(&body)
    }

    pub fn assembly_mut(&mut self, body: BodyHandle) -> Option<&mut Assembly> {
        self.assemblies.get_mut(&body)
    }

    pub fn assemblies(&self) -> impl Iterator<Item = &Assembly> + '_ {
        self.assemblies.values()
    }

    pub fn assembly_count(&self) -> usize {
        self.assemblies.len()
    }

    /// Add an assembly and index all of its members
    pub fn insert_assembly(&mut self, assembly: Assembly) {
        for member in &assembly.members {
            self.part_index.insert(member.id, assembly.body);
        }
        self.assemblies.insert(assembly.body, assembly);
    }

    /// Remove an assembly and any index entries still pointing at it
    pub fn remove_assembly(&mut self, body: BodyHandle) -> Option<Assembly> {
        let assembly = self.assemblies.remove(&body)?;
        for member in &assembly.members {
            if self.part_index.get(&member.id) == Some(&body) {
                self.part_index.remove(&member.id);
            }
        }
        Some(assembly)
    }

    /// Drop a single part from its assembly without rebuilding it
    pub fn detach_part(&mut self, part: PartId) -> Option<BodyHandle> {
        let body = self.part_index.remove(&part)?;
        if let Some(assembly) = self.assemblies.get_mut(&body) {
            assembly.members.retain(|m| m.id != part);
        }
        Some(body)
    }

    /// Every registered part sits in exactly one assembly and every member
    /// is registered
    pub fn is_partition(&self) -> bool {
        let mut seen = HashSet::new();
        for assembly in self.assemblies.values() {
            for member in &assembly.members {
                if !seen.insert(member.id) || !self.registered.contains_key(&member.id) {
                    return false;
                }
                if self.part_index.get(&member.id) != Some(&assembly.body) {
                    return false;
                }
            }
        }
        seen.len() == self.registered.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::PartProperties;
    use rapier3d_f64::prelude::RigidBodyHandle;

    fn member(part: &Arc<Part>) -> Member {
        Member {
            id: part.id(),
            part: Arc::downgrade(part),
            relative: Pose::IDENTITY,
            volume: part.volume(),
        }
    }

    #[test]
    fn test_insert_and_remove_assembly() {
        let a = Part::new("A", PartProperties::default());
        let b = Part::new("B", PartProperties::default());
        let body = RigidBodyHandle::from_raw_parts(0, 0);

        let mut maps = AssemblyMaps::new();
        maps.register(&a);
        maps.register(&b);
        maps.insert_assembly(Assembly {
            body,
            root: a.id(),
            members: vec![member(&a), member(&b)],
            is_static: false,
            constraints: HashSet::new(),
        });

        assert!(maps.is_partition());
        assert_eq!(maps.body_of(b.id()), Some(body));
        assert_eq!(maps.assembly_of(a.id()).unwrap().member_ids(), vec![a.id(), b.id()]);

        let removed = maps.remove_assembly(body).unwrap();
        assert_eq!(removed.members.len(), 2);
        assert!(maps.body_of(a.id()).is_none());
        assert!(!maps.is_partition());
    }

    #[test]
    fn test_detach_part() {
        let a = Part::new("A", PartProperties::default());
        let b = Part::new("B", PartProperties::default());
        let body = RigidBodyHandle::from_raw_parts(3, 1);

        let mut maps = AssemblyMaps::new();
        maps.register(&a);
        maps.register(&b);
        maps.insert_assembly(Assembly {
            body,
            root: a.id(),
            members: vec![member(&a), member(&b)],
            is_static: true,
            constraints: HashSet::new(),
        });

        assert_eq!(maps.detach_part(a.id()), Some(body));
        maps.unregister(a.id());
        assert!(maps.is_partition());
        assert_eq!(maps.assembly(body).unwrap().member_ids(), vec![b.id()]);
    }

    #[test]
    fn test_dead_parts() {
        let a = Part::new("A", PartProperties::default());
        let mut maps = AssemblyMaps::new();
        maps.register(&a);
        assert!(maps.dead_parts().is_empty());

        let id = a.id();
        drop(a);
        assert_eq!(maps.dead_parts(), vec![id]);
        assert!(maps.live_part(id).is_none());
    }
}
