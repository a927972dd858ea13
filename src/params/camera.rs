//! Orbit camera limits and input speeds.

use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

use serde::{Deserialize, Serialize};

/// Closest allowed distance between the eye and the look-at target (map units)
pub const DISTANCE_MIN: f32 = 1.0;

/// Farthest allowed distance between the eye and the look-at target (map units)
pub const DISTANCE_MAX: f32 = 100.0;

/// Orbit camera parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraParams {
    /// Minimum eye distance; also the near clipping plane (map units)
    pub distance_min: f32,

    /// Maximum eye distance; the far plane extends past it by the map diagonal
    pub distance_max: f32,

    /// Panning speed (map units per second)
    pub scrolling_speed: f32,

    /// Turn and pitch speed (radians per second)
    pub rotation_speed: f32,

    /// Zoom speed (map units per second)
    pub zooming_speed: f32,

    /// Width of the window border that triggers edge panning (pixels)
    pub scroll_padding: f32,

    /// Wheel rotation units per map unit of zoom
    pub wheel_divisor: f32,

    /// Lowest elevation angle (radians, 0 = horizontal)
    pub elevation_min: f32,

    /// Highest elevation angle (radians, π/2 = straight down)
    pub elevation_max: f32,

    /// Vertical field of view (degrees)
    pub fov_y_degrees: f32,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            distance_min: DISTANCE_MIN,
            distance_max: DISTANCE_MAX,
            scrolling_speed: 5.0,
            rotation_speed: FRAC_PI_4,
            zooming_speed: 5.0,
            scroll_padding: 10.0,
            wheel_divisor: 10.0,
            elevation_min: 0.0,
            elevation_max: FRAC_PI_2,
            fov_y_degrees: 60.0,
        }
    }
}

impl CameraParams {
    /// Speed on each axis for a diagonal pan (keeps total speed constant)
    pub fn diagonal_speed(&self) -> f32 {
        std::f32::consts::FRAC_1_SQRT_2 * self.scrolling_speed
    }

    pub fn validate(&self) -> Result<(), String> {
        let values = [
            ("distance_min", self.distance_min),
            ("distance_max", self.distance_max),
            ("scrolling_speed", self.scrolling_speed),
            ("rotation_speed", self.rotation_speed),
            ("zooming_speed", self.zooming_speed),
            ("scroll_padding", self.scroll_padding),
            ("wheel_divisor", self.wheel_divisor),
            ("elevation_min", self.elevation_min),
            ("elevation_max", self.elevation_max),
            ("fov_y_degrees", self.fov_y_degrees),
        ];
        if let Some((name, value)) = values.iter().find(|(_, value)| !value.is_finite()) {
            return Err(format!("{} must be finite (got {})", name, value));
        }
        if !(self.distance_min > 0.0 && self.distance_min <= self.distance_max) {
            return Err(format!(
                "distance range [{}, {}] is invalid",
                self.distance_min, self.distance_max
            ));
        }
        if self.elevation_min > self.elevation_max {
            return Err("elevation_min must not exceed elevation_max".to_string());
        }
        if self.wheel_divisor == 0.0 {
            return Err("wheel_divisor must be non-zero".to_string());
        }
        if !(self.fov_y_degrees > 0.0 && self.fov_y_degrees < 180.0) {
            return Err(format!("fov_y_degrees {} is out of range", self.fov_y_degrees));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let params = CameraParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.distance_min, 1.0);
        assert_eq!(params.distance_max, 100.0);
    }

    #[test]
    fn test_diagonal_speed() {
        let params = CameraParams::default();
        let expected = 2.0_f32.sqrt() / 2.0 * params.scrolling_speed;
        assert!((params.diagonal_speed() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_inverted_distance_range_is_invalid() {
        let params = CameraParams {
            distance_min: 50.0,
            distance_max: 10.0,
            ..CameraParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_non_finite_bounds_are_invalid() {
        for value in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let cases = [
                CameraParams {
                    distance_max: value,
                    ..CameraParams::default()
                },
                CameraParams {
                    elevation_min: value,
                    ..CameraParams::default()
                },
                CameraParams {
                    elevation_max: value,
                    ..CameraParams::default()
                },
                CameraParams {
                    rotation_speed: value,
                    ..CameraParams::default()
                },
            ];
            for params in cases {
                assert!(params.validate().is_err(), "accepted {:?}", params);
            }
        }
    }
}
