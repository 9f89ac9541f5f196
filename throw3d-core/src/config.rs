//! Viewer configuration
//!
//! Every field has a default, so a TOML file only needs the values it
//! overrides:
//!
//! ```toml
//! animation_duration = 4.0
//!
//! [sphere]
//! radius = 0.5
//! ```

use std::path::Path;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Edge length of the ground grid
    pub grid_size: f32,
    /// Number of grid cells along each edge
    pub grid_divisions: u32,
    pub light_position: [f32; 3],
    /// Ambient term added to every shaded face (0..1)
    pub ambient_intensity: f32,
    pub camera: CameraConfig,
    pub sphere: SphereConfig,
    /// Seconds a thrown ball takes from launch to the end of its track
    pub animation_duration: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: [f32; 3],
    pub look_at: [f32; 3],
    /// Vertical field of view in degrees
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SphereConfig {
    pub radius: f32,
    pub width_segments: u32,
    pub height_segments: u32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            grid_size: 50.0,
            grid_divisions: 10,
            light_position: [10.0, 10.0, 0.0],
            ambient_intensity: 0.25,
            camera: CameraConfig::default(),
            sphere: SphereConfig::default(),
            animation_duration: 10.0,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [10.0, 10.0, 0.0],
            look_at: [0.0, 0.0, 0.0],
            fov: 50.0,
            near: 0.1,
            far: 2000.0,
        }
    }
}

impl Default for SphereConfig {
    fn default() -> Self {
        Self {
            radius: 1.0,
            width_segments: 100,
            height_segments: 100,
        }
    }
}

impl ViewerConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn light_position(&self) -> Point3<f32> {
        Point3::from(self.light_position)
    }
}
