//! Procedural map generation parameters.

use serde::{Deserialize, Serialize};

/// Perlin terrain generator settings. Heights are normalized to [-1, 1]
/// before banding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainGeneration {
    pub seed: u32,

    /// Noise frequency (cycles per tile)
    pub frequency: f64,

    /// Altitude of a normalized height of 1 (map units)
    pub amplitude: f32,

    /// Normalized height below which tiles become water
    pub sea_level: f32,

    /// Normalized band above sea level covered by sand
    pub beach_width: f32,

    /// Normalized height above which tiles become ice
    pub snow_line: f32,
}

impl Default for TerrainGeneration {
    fn default() -> Self {
        Self {
            seed: 42,
            frequency: 0.08,
            amplitude: 8.0,
            sea_level: -0.15,
            beach_width: 0.08,
            snow_line: 0.55,
        }
    }
}
