//! Scene-side objects the physics core consumes
//!
//! Parts and joints are owned here; the physics core keeps only ids and weak
//! references.

pub mod joint;
pub mod part;
pub mod workspace;

pub use joint::{Joint, JointId, JointKind};
pub use part::{Face, Part, PartId, PartProperties, SurfaceType, Surfaces};
pub use workspace::Workspace;
