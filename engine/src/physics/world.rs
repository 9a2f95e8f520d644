//! Physics world resource managing the Rapier simulation
//!
//! This module provides the PhysicsWorld struct that wraps all Rapier
//! structures needed for physics simulation with f64 precision. It is owned
//! by the simulation loop and never touched from the consuming thread.

use crate::config::PhysicsConfig;
use crate::core::Pose;
use crate::physics::convert::{from_isometry, from_vector, to_isometry, to_point, to_vector};
use crate::physics::shape;
use crate::physics::{BodyHandle, ConstraintHandle};
use crate::scene::PartId;
use glam::DVec3;
use rapier3d_f64::prelude::*;
use tracing::{debug, info, trace};

/// Physics world resource containing all Rapier structures
pub struct PhysicsWorld {
    /// Set of rigid bodies in the simulation
    pub rigid_body_set: RigidBodySet,

    /// Set of colliders in the simulation
    pub collider_set: ColliderSet,

    /// Integration parameters for the simulation
    pub integration_parameters: IntegrationParameters,

    /// Physics pipeline for stepping the simulation
    pub physics_pipeline: PhysicsPipeline,

    /// Island manager for grouping connected bodies
    pub island_manager: IslandManager,

    /// Broad phase for coarse collision detection
    pub broad_phase: BroadPhase,

    /// Narrow phase for precise collision detection
    pub narrow_phase: NarrowPhase,

    /// Set of impulse-based joints
    pub impulse_joint_set: ImpulseJointSet,

    /// Set of multibody (articulated) joints
    pub multibody_joint_set: MultibodyJointSet,

    /// CCD solver for continuous collision detection
    pub ccd_solver: CCDSolver,

    /// Gravity vector for the simulation
    pub gravity: Vector<f64>,
}

impl PhysicsWorld {
    /// Create a new physics world from the service configuration
    pub fn new(config: &PhysicsConfig) -> Self {
        info!(gravity = ?config.gravity, "Initializing physics world with f64 precision");

        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = config.max_timestep;

        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: BroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            gravity: to_vector(config.gravity),
        }
    }

    /// Set the gravity vector for the simulation
    pub fn set_gravity(&mut self, gravity: DVec3) {
        self.gravity = to_vector(gravity);
        debug!("Physics gravity set to: {:?}", gravity);
    }

    pub fn gravity(&self) -> DVec3 {
        from_vector(&self.gravity)
    }

    /// Create the body of an assembly rooted at `root_pose`
    pub fn create_body(&mut self, root_pose: &Pose, is_static: bool) -> BodyHandle {
        let handle = self
            .rigid_body_set
            .insert(shape::body_builder(root_pose, is_static));
        trace!(?handle, is_static, "Created rigid body");
        handle
    }

    /// Attach the box collider of one member to an assembly body
    pub fn attach_member(
        &mut self,
        body: BodyHandle,
        part: PartId,
        size: DVec3,
        relative: &Pose,
        config: &PhysicsConfig,
    ) -> ColliderHandle {
        self.collider_set.insert_with_parent(
            shape::member_collider(part, size, relative, config),
            body,
            &mut self.rigid_body_set,
        )
    }

    /// Recompute mass properties right away so impulses applied before the
    /// next step act on the real mass
    pub fn refresh_mass(&mut self, body: BodyHandle) {
        if let Some(rb) = self.rigid_body_set.get_mut(body) {
            rb.recompute_mass_properties_from_colliders(&self.collider_set);
        }
    }

    /// Remove a body with its colliders and attached joints
    pub fn remove_body(&mut self, body: BodyHandle) -> bool {
        let removed = self
            .rigid_body_set
            .remove(
                body,
                &mut self.island_manager,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                true, // Also remove attached colliders
            )
            .is_some();
        if removed {
            trace!(?body, "Removed rigid body");
        }
        removed
    }

    pub fn contains_body(&self, body: BodyHandle) -> bool {
        self.rigid_body_set.contains(body)
    }

    pub fn insert_joint(
        &mut self,
        body0: BodyHandle,
        body1: BodyHandle,
        joint: GenericJoint,
    ) -> ConstraintHandle {
        self.impulse_joint_set.insert(body0, body1, joint, true)
    }

    /// Remove a joint; stale handles are ignored
    pub fn remove_joint(&mut self, handle: ConstraintHandle) -> bool {
        self.impulse_joint_set.remove(handle, true).is_some()
    }

    pub fn joint(&self, handle: ConstraintHandle) -> Option<&ImpulseJoint> {
        self.impulse_joint_set.get(handle)
    }

    pub fn joint_mut(&mut self, handle: ConstraintHandle) -> Option<&mut ImpulseJoint> {
        self.impulse_joint_set.get_mut(handle)
    }

    pub fn body_pose(&self, body: BodyHandle) -> Option<Pose> {
        self.rigid_body_set
            .get(body)
            .map(|rb| from_isometry(rb.position()))
    }

    pub fn set_body_pose(&mut self, body: BodyHandle, pose: &Pose) {
        if let Some(rb) = self.rigid_body_set.get_mut(body) {
            rb.set_position(to_isometry(pose), true);
        }
    }

    pub fn is_dynamic(&self, body: BodyHandle) -> bool {
        self.rigid_body_set
            .get(body)
            .is_some_and(|rb| rb.is_dynamic())
    }

    /// Linear and angular velocity of a body
    pub fn velocity(&self, body: BodyHandle) -> Option<(DVec3, DVec3)> {
        self.rigid_body_set
            .get(body)
            .map(|rb| (from_vector(rb.linvel()), from_vector(rb.angvel())))
    }

    pub fn set_velocity(&mut self, body: BodyHandle, linear: DVec3, angular: DVec3) {
        if let Some(rb) = self.rigid_body_set.get_mut(body) {
            if rb.is_dynamic() {
                rb.set_linvel(to_vector(linear), true);
                rb.set_angvel(to_vector(angular), true);
            }
        }
    }

    /// Apply an impulse at a world point; static bodies are left alone
    pub fn apply_impulse_at(&mut self, body: BodyHandle, impulse: DVec3, point: DVec3) -> bool {
        match self.rigid_body_set.get_mut(body) {
            Some(rb) if rb.is_dynamic() => {
                rb.apply_impulse_at_point(to_vector(impulse), to_point(point), true);
                true
            }
            _ => false,
        }
    }

    pub fn wake(&mut self, body: BodyHandle) {
        if let Some(rb) = self.rigid_body_set.get_mut(body) {
            rb.wake_up(true);
        }
    }

    /// Dynamic bodies that are awake
    pub fn active_bodies(&self) -> &[BodyHandle] {
        self.island_manager.active_dynamic_bodies()
    }

    pub fn body_count(&self) -> usize {
        self.rigid_body_set.len()
    }

    pub fn collider_count(&self) -> usize {
        self.collider_set.len()
    }

    pub fn joint_count(&self) -> usize {
        self.impulse_joint_set.len()
    }

    /// Step the physics simulation by `dt` seconds
    pub fn step(&mut self, dt: f64, hooks: &dyn PhysicsHooks, events: &dyn EventHandler) {
        self.integration_parameters.dt = dt;
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            hooks,
            events,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_remove_body() {
        let config = PhysicsConfig::default();
        let mut world = PhysicsWorld::new(&config);
        let pose = Pose::from_position(DVec3::new(0.0, 5.0, 0.0));

        let body = world.create_body(&pose, false);
        world.attach_member(
            body,
            PartId::from_bits(7),
            DVec3::new(2.0, 2.0, 2.0),
            &Pose::IDENTITY,
            &config,
        );
        assert_eq!(world.body_count(), 1);
        assert_eq!(world.collider_count(), 1);
        assert!(world.body_pose(body).unwrap().abs_diff_eq(&pose, 1e-12));

        assert!(world.remove_body(body));
        assert!(!world.remove_body(body));
        assert_eq!(world.collider_count(), 0);
    }

    #[test]
    fn test_static_body_ignores_velocity_and_impulse() {
        let config = PhysicsConfig::default();
        let mut world = PhysicsWorld::new(&config);
        let body = world.create_body(&Pose::IDENTITY, true);

        world.set_velocity(body, DVec3::X, DVec3::Y);
        assert!(!world.apply_impulse_at(body, DVec3::X, DVec3::ZERO));
        assert_eq!(world.velocity(body), Some((DVec3::ZERO, DVec3::ZERO)));
    }

    #[test]
    fn test_gravity_pulls_dynamic_body() {
        let config = PhysicsConfig::default().with_gravity(DVec3::new(0.0, -10.0, 0.0));
        let mut world = PhysicsWorld::new(&config);
        let body = world.create_body(&Pose::IDENTITY, false);
        world.attach_member(body, PartId::from_bits(1), DVec3::ONE, &Pose::IDENTITY, &config);

        world.step(1.0 / 60.0, &(), &());

        let (linear, _) = world.velocity(body).unwrap();
        assert!(linear.y < 0.0);
        assert!(world.body_pose(body).unwrap().position.y < 0.0);
    }
}
