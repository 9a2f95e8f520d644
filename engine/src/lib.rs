//! Studwork engine: assembly physics for a block world
//!
//! This crate maps box-shaped parts and their joints onto Rapier rigid
//! bodies, auto-joins parts whose faces dock, processes explosions and hands
//! simulated transforms back to the scene from a background thread.

pub mod config;
pub mod core;
pub mod physics;
pub mod scene;

// Re-export commonly used types
pub mod prelude {
    // Math types
    pub use crate::core::{Pose, Signal};
    pub use glam::{DQuat, DVec3};

    // Config types
    pub use crate::config::{JoinCriteria, MotorSettings, PhysicsConfig};

    // Scene types
    pub use crate::scene::{
        Face, Joint, JointId, JointKind, Part, PartId, PartProperties, SurfaceType, Surfaces,
        Workspace,
    };

    // Physics types
    pub use crate::physics::{
        AssemblyInfo, ExplosionHit, FrameReport, PartProperty, PhysicsError, PhysicsService,
    };
}

/// Initialize logging for the engine
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
