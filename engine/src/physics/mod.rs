//! Physics coordination on top of Rapier with f64 precision
//!
//! Parts and joints from the scene are mapped onto assemblies: every group of
//! rigidly joined parts is simulated as one rigid body. Structural changes are
//! queued from any thread and applied by the simulation loop at tick start;
//! results flow back through swap-under-lock buffers.

pub mod assembly;
pub mod constraints;
pub mod contact;
pub mod convert;
pub mod error;
pub mod explosion;
pub mod joined_pairs;
pub mod joint_graph;
pub mod mutations;
pub mod rebuild;
pub mod service;
pub mod shape;
pub mod simulation;
pub mod sync;
pub mod world;


pub use assembly::{Assembly, AssemblyInfo, AssemblyMaps, Member};
pub use contact::{ContactSample, JoinDetector, JoinRejection};
pub use error::PhysicsError;
pub use explosion::explosion_impulse;
pub use joined_pairs::{JoinedPairRegistry, PartPair};
pub use joint_graph::JointGraph;
pub use mutations::{Explosion, Mutation, MutationQueue};
pub use service::{FrameReport, PartProperty, PhysicsService};
pub use simulation::Simulation;
pub use sync::{ContactEvent, ExplosionHit, SyncBuffers, TransformUpdate};
pub use world::PhysicsWorld;

/// Engine body backing one assembly
pub type BodyHandle = rapier3d_f64::prelude::RigidBodyHandle;

/// Engine constraint backing one motor or hinge joint
pub type ConstraintHandle = rapier3d_f64::prelude::ImpulseJointHandle;
