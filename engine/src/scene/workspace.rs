//! World container owning parts and joints
//!
//! The workspace is the scene side of the physics boundary: it owns the
//! `Arc`s, reports property edits to the physics service and removes parts
//! and joints the simulation reports as fallen or broken.

use crate::config::PhysicsConfig;
use crate::core::Pose;
use crate::physics::{FrameReport, PartProperty, PhysicsError, PhysicsService};
use crate::scene::{Joint, JointId, Part, PartId, Surfaces};
use glam::DVec3;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub struct Workspace {
    physics: Arc<PhysicsService>,
    parts: HashMap<PartId, Arc<Part>>,
    joints: HashMap<JointId, Arc<Joint>>,
    gravity: DVec3,
}

impl Workspace {
    pub fn new(config: PhysicsConfig) -> Result<Self, PhysicsError> {
        let gravity = config.gravity;
        let physics = Arc::new(PhysicsService::new(config)?);
        Ok(Self {
            physics,
            parts: HashMap::new(),
            joints: HashMap::new(),
            gravity,
        })
    }

    pub fn physics(&self) -> &Arc<PhysicsService> {
        &self.physics
    }

    pub fn add_part(&mut self, part: Arc<Part>) -> Arc<Part> {
        self.physics.register(&part);
        self.parts.insert(part.id(), part.clone());
        part
    }

    /// Add many parts with deferred registration, as a level load does
    pub fn load(&mut self, parts: impl IntoIterator<Item = Arc<Part>>, joints: impl IntoIterator<Item = Arc<Joint>>) {
        self.physics.set_defer_registration(true);
        let mut count = 0;
        for part in parts {
            self.add_part(part);
            count += 1;
        }
        for joint in joints {
            self.add_joint(joint);
        }
        self.physics.set_defer_registration(false);
        info!(parts = count, joints = self.joints.len(), "Loaded parts into workspace");
    }

    /// Remove a part and every joint attached to it
    pub fn remove_part(&mut self, id: PartId) -> Option<Arc<Part>> {
        let part = self.parts.remove(&id)?;
        self.physics.unregister(&part);
        let attached: Vec<JointId> = self
            .joints
            .values()
            .filter(|joint| joint.involves(id))
            .map(|joint| joint.id())
            .collect();
        for joint in attached {
            self.remove_joint(joint);
        }
        Some(part)
    }

    pub fn add_joint(&mut self, joint: Arc<Joint>) -> Arc<Joint> {
        self.physics.register_constraint(&joint);
        self.joints.insert(joint.id(), joint.clone());
        joint
    }

    pub fn remove_joint(&mut self, id: JointId) -> Option<Arc<Joint>> {
        let joint = self.joints.remove(&id)?;
        self.physics.unregister_constraint(&joint);
        Some(joint)
    }

    pub fn part(&self, id: PartId) -> Option<&Arc<Part>> {
        self.parts.get(&id)
    }

    pub fn parts(&self) -> impl Iterator<Item = &Arc<Part>> + '_ {
        self.parts.values()
    }

    pub fn joints(&self) -> impl Iterator<Item = &Arc<Joint>> + '_ {
        self.joints.values()
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn set_pose(&self, part: &Arc<Part>, pose: Pose) {
        part.update(|properties| properties.pose = pose);
        self.physics.notify_property_changed(part, PartProperty::Pose);
    }

    pub fn set_anchored(&self, part: &Arc<Part>, anchored: bool) {
        part.update(|properties| properties.anchored = anchored);
        self.physics.notify_property_changed(part, PartProperty::Anchored);
    }

    pub fn set_size(&self, part: &Arc<Part>, size: DVec3) {
        part.update(|properties| properties.size = size);
        self.physics.notify_property_changed(part, PartProperty::Size);
    }

    pub fn set_surfaces(&self, part: &Arc<Part>, surfaces: Surfaces) {
        part.update(|properties| properties.surfaces = surfaces);
        self.physics.notify_property_changed(part, PartProperty::Surfaces);
    }

    pub fn gravity(&self) -> DVec3 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: DVec3) {
        self.gravity = gravity;
        self.physics.set_gravity(gravity);
    }

    pub fn destroy_height(&self) -> f64 {
        self.physics.destroy_height()
    }

    pub fn set_destroy_height(&self, height: f64) {
        self.physics.set_destroy_height(height);
    }

    pub fn explode(&self, position: DVec3, radius: f64, pressure: f64) {
        self.physics.queue_explosion(position, radius, pressure);
    }

    /// Pull simulation results into the scene and drop what the simulation
    /// destroyed
    pub fn step(&mut self, dt: f64) -> FrameReport {
        let report = self.physics.step(dt);
        for part in &report.fallen {
            self.parts.remove(&part.id());
            let attached: Vec<JointId> = self
                .joints
                .values()
                .filter(|joint| joint.involves(part.id()))
                .map(|joint| joint.id())
                .collect();
            for joint in attached {
                self.remove_joint(joint);
            }
        }
        for joint in &report.broken_joints {
            if self.joints.remove(&joint.id()).is_some() {
                debug!(joint = ?joint.id(), kind = joint.kind().name(), "Joint broke");
            }
        }
        report
    }
}
