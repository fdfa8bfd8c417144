//! Runtime configuration.
//!
//! Every field has a default, so a partial JSON document (or none at all)
//! yields a complete configuration.

use rapier3d::na::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{MarblieError, Result};

/// Top-level configuration for a marblie session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarblieConfig {
    pub track: TrackDimensions,
    pub physics: PhysicsConfig,
    pub marble: MarbleConfig,
    pub lights: LightPoolConfig,
    pub interaction: InteractionConfig,
    pub camera: CameraConfig,
    /// Seed for the session RNG. `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl MarblieConfig {
    /// Parses a configuration from JSON, filling missing fields with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rejects values that would produce degenerate geometry or physics.
    pub fn validate(&self) -> Result<()> {
        let t = &self.track;
        if t.track_width <= 0.0 || t.track_width >= t.width {
            return Err(MarblieError::Config(format!(
                "track_width {} must lie in (0, width {})",
                t.track_width, t.width
            )));
        }
        if t.track_depth * 2.0 >= t.height {
            return Err(MarblieError::Config(format!(
                "track_depth {} leaves no floor inside height {}",
                t.track_depth, t.height
            )));
        }
        if t.sections == 0 {
            return Err(MarblieError::Config("sections must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.lights.probability) {
            return Err(MarblieError::Config(format!(
                "light probability {} outside [0, 1]",
                self.lights.probability
            )));
        }
        if self.physics.timestep <= 0.0 {
            return Err(MarblieError::Config("physics timestep must be positive".into()));
        }
        Ok(())
    }
}

/// Cross-section and extrusion parameters shared by the generated track pieces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackDimensions {
    pub width: f32,
    pub height: f32,
    pub depth: f32,
    pub windmill_depth: f32,
    /// Width of the rolling channel between the two walls.
    pub track_width: f32,
    /// Depth of the rolling channel on each face.
    pub track_depth: f32,
    /// Number of sweep steps along a curve.
    pub sections: usize,
    pub curve_points: [[f32; 3]; 3],
    pub friction: f32,
}

impl Default for TrackDimensions {
    fn default() -> Self {
        Self {
            width: 1.5,
            height: 0.7,
            depth: 10.0,
            windmill_depth: 4.0,
            track_width: 1.3,
            track_depth: 0.2,
            sections: 50,
            curve_points: [[0.0, 0.0, 3.5], [0.0, -3.0, 0.0], [0.0, 0.0, -3.5]],
            friction: 0.5,
        }
    }
}

impl TrackDimensions {
    /// Thickness of each side wall.
    pub fn wall_width(&self) -> f32 {
        (self.width - self.track_width) / 2.0
    }

    /// Same dimensions with a different extrusion depth.
    pub fn with_depth(&self, depth: f32) -> Self {
        Self {
            depth,
            ..self.clone()
        }
    }

    pub fn default_curve_points(&self) -> [Point3<f32>; 3] {
        self.curve_points.map(|[x, y, z]| Point3::new(x, y, z))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub gravity: [f32; 3],
    pub timestep: f32,
    /// Half extents of the fixed backdrop wall behind the run.
    pub wall_half_extents: [f32; 3],
    pub wall_position: [f32; 3],
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: [0.0, -98.1, 0.0],
            timestep: 1.0 / 60.0,
            wall_half_extents: [0.05, 500.0, 500.0],
            wall_position: [-0.05, 0.0, 0.0],
        }
    }
}

impl PhysicsConfig {
    pub fn gravity(&self) -> Vector3<f32> {
        Vector3::from(self.gravity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarbleConfig {
    pub radius: f32,
    pub friction: f32,
    pub restitution: f32,
    /// Marbles below this height are disposed.
    pub floor_threshold: f32,
    /// Absolute x coordinate of freshly placed marbles.
    pub spawn_x: f32,
    /// Height above the starter piece at which marbles appear.
    pub spawn_height: f32,
}

impl Default for MarbleConfig {
    fn default() -> Self {
        Self {
            radius: 0.7,
            friction: 0.1,
            restitution: 0.1,
            floor_threshold: -50.0,
            spawn_x: 0.9,
            spawn_height: 2.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightPoolConfig {
    pub size: usize,
    /// Chance that a new marble attempts to borrow a free light.
    pub probability: f64,
    pub intensity: f32,
    pub range: f32,
}

impl Default for LightPoolConfig {
    fn default() -> Self {
        Self {
            size: 3,
            probability: 0.3,
            intensity: 1.5,
            range: 15.0,
        }
    }
}

/// Pointer interaction and animation timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    pub mouse_handles: HandleMetrics,
    pub touch_handles: HandleMetrics,
    pub auto_drop_interval: f32,
    pub appear_duration: f32,
    pub max_appear_delay: f32,
    pub dispose_duration: f32,
    pub light_fade_duration: f32,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            mouse_handles: HandleMetrics {
                offset: 1.0,
                radius: 1.0,
                lift: 0.8,
            },
            touch_handles: HandleMetrics {
                offset: 1.5,
                radius: 1.0,
                lift: 1.6,
            },
            auto_drop_interval: 3.0,
            appear_duration: 0.4,
            max_appear_delay: 0.5,
            dispose_duration: 0.4,
            light_fade_duration: 1.0,
        }
    }
}

/// Size and placement of drag handles for one input modality.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HandleMetrics {
    /// Gap between a track's extent and its end handles.
    pub offset: f32,
    /// Pick radius of a handle marker.
    pub radius: f32,
    /// Marker displacement towards the viewer (+X).
    pub lift: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Radians of orbit per pixel of pointer travel.
    pub orbit_speed: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [100.0, 0.0, 0.0],
            target: [0.0, 0.0, 0.0],
            fov_y_degrees: 25.0,
            near: 0.1,
            far: 1000.0,
            orbit_speed: 0.005,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = MarblieConfig::from_json(r#"{ "marble": { "radius": 0.5 } }"#).unwrap();
        assert_eq!(config.marble.radius, 0.5);
        assert_eq!(config.marble.floor_threshold, -50.0);
        assert_eq!(config.track, TrackDimensions::default());
        assert_eq!(config.lights.size, 3);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = MarblieConfig {
            seed: Some(7),
            ..Default::default()
        };
        let json = config.to_json().unwrap();
        assert_eq!(MarblieConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_wall_width() {
        let dims = TrackDimensions::default();
        assert!((dims.wall_width() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_validate_rejects_degenerate_profile() {
        let result = MarblieConfig::from_json(r#"{ "track": { "track_width": 2.0 } }"#);
        assert!(matches!(result, Err(MarblieError::Config(_))));

        let result = MarblieConfig::from_json(r#"{ "lights": { "probability": 1.5 } }"#);
        assert!(matches!(result, Err(MarblieError::Config(_))));
    }
}
