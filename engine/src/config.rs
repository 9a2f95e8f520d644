//! Configuration types for the engine

use crate::physics::PhysicsError;
use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Thresholds deciding when a new contact docks two parts together
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinCriteria {
    /// Maximum squared relative linear speed between the two bodies
    pub max_relative_speed_sq: f64,
    /// Minimum |component| of the dominant axis of a local contact normal
    pub axis_alignment: f64,
    /// Maximum |component| allowed on the two other axes
    pub off_axis_tolerance: f64,
    /// Contact points needed for a face-to-face manifold
    pub min_manifold_points: usize,
    /// Deeper contacts are treated as glitches and never joined
    pub max_penetration: f64,
}

impl Default for JoinCriteria {
    fn default() -> Self {
        Self {
            max_relative_speed_sq: 0.5,
            axis_alignment: 0.999,
            off_axis_tolerance: 0.01,
            min_manifold_points: 4,
            max_penetration: 0.1,
        }
    }
}

/// Drive parameters used for motor joints
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorSettings {
    /// Position-motor stiffness (Motor)
    pub stiffness: f64,
    /// Position-motor damping (Motor)
    pub damping: f64,
    /// Velocity-motor gain (VelocityMotor)
    pub velocity_factor: f64,
    /// Upper bound on the torque a motor may apply
    pub max_force: f64,
}

impl Default for MotorSettings {
    fn default() -> Self {
        Self {
            stiffness: 1.0e4,
            damping: 1.0e3,
            velocity_factor: 1.0e3,
            max_force: 1.0e6,
        }
    }
}

/// Configuration for the physics service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// World gravity
    pub gravity: DVec3,
    /// Upper bound for a single engine step, in seconds
    pub max_timestep: f64,
    /// Sleep between simulation ticks on the background thread
    pub tick_interval_micros: u64,
    /// Parts synced below this height are removed from the scene
    pub destroy_height: f64,
    /// Smallest half extent a box collider may have
    pub min_half_extent: f64,
    pub friction: f64,
    pub restitution: f64,
    pub density: f64,
    /// Multiplier applied to every explosion impulse
    pub explosion_impulse_scale: f64,
    /// Ticks during which a part whose joints were broken cannot auto-join
    pub rejoin_cooldown_ticks: u64,
    pub join: JoinCriteria,
    pub motor: MotorSettings,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: DVec3::new(0.0, -196.2, 0.0),
            max_timestep: 1.0 / 60.0,
            tick_interval_micros: 100,
            destroy_height: -500.0,
            min_half_extent: 0.05,
            friction: 0.5,
            restitution: 0.1,
            density: 1.0,
            explosion_impulse_scale: 5.0,
            rejoin_cooldown_ticks: 30,
            join: JoinCriteria::default(),
            motor: MotorSettings::default(),
        }
    }
}

impl PhysicsConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, PhysicsError> {
        let config: PhysicsConfig = serde_json::from_str(json)?;
        config.validate()?;
        debug!(?config, "Parsed physics configuration");
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PhysicsError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| PhysicsError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = ?path, "Loading physics configuration");
        Self::from_json_str(&json)
    }

    /// Builder-style gravity override
    pub fn with_gravity(mut self, gravity: DVec3) -> Self {
        self.gravity = gravity;
        self
    }

    /// Check that the values can drive a simulation
    pub fn validate(&self) -> Result<(), PhysicsError> {
        if !self.gravity.is_finite() {
            return Err(PhysicsError::InvalidConfig(format!(
                "gravity must be finite, got {:?}",
                self.gravity
            )));
        }
        if !(self.max_timestep.is_finite() && self.max_timestep > 0.0) {
            return Err(PhysicsError::InvalidConfig(format!(
                "max_timestep must be positive, got {}",
                self.max_timestep
            )));
        }
        if !(self.min_half_extent.is_finite() && self.min_half_extent > 0.0) {
            return Err(PhysicsError::InvalidConfig(format!(
                "min_half_extent must be positive, got {}",
                self.min_half_extent
            )));
        }
        if !(self.density.is_finite() && self.density > 0.0) {
            return Err(PhysicsError::InvalidConfig(format!(
                "density must be positive, got {}",
                self.density
            )));
        }
        if !self.destroy_height.is_finite() {
            return Err(PhysicsError::InvalidConfig(
                "destroy_height must be finite".to_string(),
            ));
        }
        if self.join.min_manifold_points == 0 {
            return Err(PhysicsError::InvalidConfig(
                "join.min_manifold_points must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = PhysicsConfig::default();
        assert_eq!(config.gravity, DVec3::new(0.0, -196.2, 0.0));
        assert_eq!(config.max_timestep, 1.0 / 60.0);
        assert_eq!(config.destroy_height, -500.0);
        assert_eq!(config.explosion_impulse_scale, 5.0);
        assert_eq!(config.join.min_manifold_points, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            PhysicsConfig::from_json_str(r#"{"destroy_height": -50.0, "join": {"min_manifold_points": 3}}"#)
                .unwrap();
        assert_eq!(config.destroy_height, -50.0);
        assert_eq!(config.join.min_manifold_points, 3);
        assert_eq!(config.join.max_relative_speed_sq, 0.5);
        assert_eq!(config.friction, 0.5);
    }

    #[test]
    fn test_invalid_timestep_rejected() {
        let result = PhysicsConfig::from_json_str(r#"{"max_timestep": 0.0}"#);
        assert!(matches!(result, Err(PhysicsError::InvalidConfig(_))));
    }

    #[test]
    fn test_malformed_json_rejected() {
        let result = PhysicsConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(PhysicsError::ConfigParse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"gravity": [0.0, -9.81, 0.0]}}"#).unwrap();

        let config = PhysicsConfig::load(file.path()).unwrap();
        assert_eq!(config.gravity, DVec3::new(0.0, -9.81, 0.0));
    }

    #[test]
    fn test_load_missing_file() {
        let result = PhysicsConfig::load("/definitely/not/here.json");
        assert!(matches!(result, Err(PhysicsError::ConfigIo { .. })));
    }
}
