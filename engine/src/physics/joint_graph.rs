//! Simulation-side adjacency of joints per part

use crate::scene::{Joint, JointId, JointKind, PartId};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct JointGraph {
    joints: HashMap<JointId, Arc<Joint>>,
    adjacency: HashMap<PartId, Vec<JointId>>,
}

impl JointGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the joint was already present
    pub fn insert(&mut self, joint: Arc<Joint>) -> bool {
        let id = joint.id();
        if self.joints.contains_key(&id) {
            return false;
        }
        let (a, b) = joint.part_ids();
        self.adjacency.entry(a).or_default().push(id);
        if b != a {
            self.adjacency.entry(b).or_default().push(id);
        }
        self.joints.insert(id, joint);
        true
    }

    pub fn remove(&mut self, id: JointId) -> Option<Arc<Joint>> {
        let joint = self.joints.remove(&id)?;
        let (a, b) = joint.part_ids();
        for part in [a, b] {
            if let Some(list) = self.adjacency.get_mut(&part) {
                list.retain(|j| *j != id);
                if list.is_empty() {
                    self.adjacency.remove(&part);
                }
            }
        }
        Some(joint)
    }

    pub fn get(&self, id: JointId) -> Option<&Arc<Joint>> {
        self.joints.get(&id)
    }

    pub fn contains(&self, id: JointId) -> bool {
        self.joints.contains_key(&id)
    }

    pub fn joints_of(&self, part: PartId) -> impl Iterator<Item = &Arc<Joint>> + '_ {
        self.adjacency
            .get(&part)
            .into_iter()
            .flatten()
            .filter_map(|id| self.joints.get(id))
    }

    /// Parts reachable from `part` through one merge-type joint
    pub fn merge_neighbors(&self, part: PartId) -> impl Iterator<Item = PartId> + '_ {
        self.joints_of(part)
            .filter(|joint| joint.is_merge())
            .map(move |joint| joint.other(part))
    }

    pub fn has_merge_between(&self, a: PartId, b: PartId) -> bool {
        self.joints_of(a)
            .any(|joint| joint.is_merge() && joint.other(a) == b)
    }

    /// Remove the auto-joins touching `part`
    pub fn remove_auto_joins(&mut self, part: PartId) -> Vec<Arc<Joint>> {
        let ids: Vec<JointId> = self
            .joints_of(part)
            .filter(|joint| joint.kind() == JointKind::AutoJoin)
            .map(|joint| joint.id())
            .collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Remove every joint touching `part`
    pub fn remove_all_of(&mut self, part: PartId) -> Vec<Arc<Joint>> {
        let ids: Vec<JointId> = self.joints_of(part).map(|joint| joint.id()).collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Remove joints with an endpoint the scene has already dropped
    pub fn remove_orphaned(&mut self) -> Vec<Arc<Joint>> {
        let ids: Vec<JointId> = self
            .joints
            .values()
            .filter(|joint| joint.part0().is_none() || joint.part1().is_none())
            .map(|joint| joint.id())
            .collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Joint>> + '_ {
        self.joints.values()
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }
}
