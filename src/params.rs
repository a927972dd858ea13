//! Configuration with documented units and ranges.
//!
//! Everything tunable lives here:
//! - Compute device pinning
//! - Frame-buffer, depth, multisampling and frame-rate options
//! - Camera limits and speeds
//! - Key bindings
//! - Procedural map generation
//!
//! A configuration file is JSON; every section and field is optional.

mod camera;
mod controls;
mod device;
mod generation;
mod render;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use camera::{CameraParams, DISTANCE_MAX, DISTANCE_MIN};
pub use controls::{Control, KeyBindings};
pub use device::DeviceSelection;
pub use generation::TerrainGeneration;
pub use render::{
    ColorBits, GraphicsConfig, WindowConfig, MAX_DEPTH_BUFFER_BITS, MAX_FRAMES_PER_SECOND,
    MAX_SAMPLE_BUFFERS,
};

use crate::error::ConfigError;

/// Read-only settings consumed by the renderer and the application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub device: DeviceSelection,
    pub graphics: GraphicsConfig,
    pub window: WindowConfig,
    pub camera: CameraParams,
    pub controls: KeyBindings,
    pub generation: TerrainGeneration,

    /// Directory holding `terrains/<name>.png`
    pub assets_dir: PathBuf,
}

impl Configuration {
    /// Read a configuration file. Out-of-range values are replaced by their
    /// defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Configuration =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        log::info!("Loaded configuration from {}", path.display());
        Ok(config.sanitized())
    }

    pub fn sanitized(&self) -> Self {
        let mut config = self.clone();
        config.graphics = self.graphics.sanitized();
        if let Err(e) = config.camera.validate() {
            log::warn!("Invalid camera parameters ({}), using defaults", e);
            config.camera = CameraParams::default();
        }
        config
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            device: DeviceSelection::default(),
            graphics: GraphicsConfig::default(),
            window: WindowConfig::default(),
            camera: CameraParams::default(),
            controls: KeyBindings::default(),
            generation: TerrainGeneration::default(),
            assets_dir: PathBuf::from("assets"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: Configuration = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Configuration::default());
        assert_eq!(config.assets_dir, PathBuf::from("assets"));
    }

    #[test]
    fn test_load_sanitizes_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("botcraft.json");
        std::fs::write(
            &path,
            r#"{
                "device": { "device": "Test Adapter" },
                "graphics": { "frames_per_second": 500, "depth_buffer_bits": 24 }
            }"#,
        )
        .unwrap();

        let config = Configuration::load(&path).unwrap();
        assert_eq!(config.graphics.frames_per_second, MAX_FRAMES_PER_SECOND);
        assert_eq!(config.graphics.depth_buffer_bits, 24);
        assert_eq!(config.device.device.as_deref(), Some("Test Adapter"));
        assert!(config.device.is_pinned());
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ graphics: ").unwrap();
        assert!(matches!(
            Configuration::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_invalid_camera_falls_back() {
        let mut config = Configuration::default();
        config.camera.distance_min = -1.0;
        assert_eq!(config.sanitized().camera, CameraParams::default());
    }

    #[test]
    fn test_nan_camera_bound_falls_back() {
        let mut config = Configuration::default();
        config.camera.elevation_max = f32::NAN;
        assert_eq!(config.sanitized().camera, CameraParams::default());
    }
}
