//! Core value types shared across the engine

pub mod pose;
pub mod signal;

pub use pose::Pose;
pub use signal::{ConnectionId, Signal};
