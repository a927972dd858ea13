//! Window and frame-buffer configuration.

use serde::{Deserialize, Serialize};

pub const MAX_FRAMES_PER_SECOND: u32 = 120;
pub const MAX_DEPTH_BUFFER_BITS: u32 = 32;
pub const MAX_SAMPLE_BUFFERS: u32 = 16;
pub const MAX_COLOR_BITS: u32 = 16;

/// Requested bits per frame-buffer channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorBits {
    pub red: u32,
    pub green: u32,
    pub blue: u32,
    pub alpha: u32,
}

impl Default for ColorBits {
    fn default() -> Self {
        Self {
            red: 8,
            green: 8,
            blue: 8,
            alpha: 8,
        }
    }
}

impl ColorBits {
    /// Widest requested channel
    pub fn max_channel(&self) -> u32 {
        self.red.max(self.green).max(self.blue).max(self.alpha)
    }
}

/// Graphics surface options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub frame_buffer_bits: ColorBits,

    /// Depth buffer precision (bits, 1..=32)
    pub depth_buffer_bits: u32,

    /// Anti-aliasing samples (0..=16, 0 disables multisampling)
    pub sample_buffers: u32,

    /// When false only a software adapter is accepted
    pub hardware_accelerated: bool,

    /// When true presentation waits for vertical sync
    pub double_buffered: bool,

    /// Target render rate (frames per second, 1..=120)
    pub frames_per_second: u32,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            frame_buffer_bits: ColorBits::default(),
            depth_buffer_bits: MAX_DEPTH_BUFFER_BITS,
            sample_buffers: MAX_SAMPLE_BUFFERS,
            hardware_accelerated: true,
            double_buffered: true,
            frames_per_second: MAX_FRAMES_PER_SECOND,
        }
    }
}

impl GraphicsConfig {
    /// Replace out-of-range values with their defaults
    pub fn sanitized(&self) -> Self {
        let clamp_bits = |bits: u32| {
            if (1..=MAX_COLOR_BITS).contains(&bits) {
                bits
            } else {
                8
            }
        };
        Self {
            frame_buffer_bits: ColorBits {
                red: clamp_bits(self.frame_buffer_bits.red),
                green: clamp_bits(self.frame_buffer_bits.green),
                blue: clamp_bits(self.frame_buffer_bits.blue),
                alpha: clamp_bits(self.frame_buffer_bits.alpha),
            },
            depth_buffer_bits: if (1..=MAX_DEPTH_BUFFER_BITS).contains(&self.depth_buffer_bits) {
                self.depth_buffer_bits
            } else {
                MAX_DEPTH_BUFFER_BITS
            },
            sample_buffers: if self.sample_buffers <= MAX_SAMPLE_BUFFERS {
                self.sample_buffers
            } else {
                MAX_SAMPLE_BUFFERS
            },
            hardware_accelerated: self.hardware_accelerated,
            double_buffered: self.double_buffered,
            frames_per_second: if (1..=MAX_FRAMES_PER_SECOND).contains(&self.frames_per_second) {
                self.frames_per_second
            } else {
                MAX_FRAMES_PER_SECOND
            },
        }
    }

    /// Time budget of one frame
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.frames_per_second.max(1) as f64)
    }
}

/// Window configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window width (pixels)
    pub width: u32,

    /// Window height (pixels)
    pub height: u32,

    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "Botcraft".to_string(),
        }
    }
}

impl WindowConfig {
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_values_fall_back() {
        let config = GraphicsConfig {
            frame_buffer_bits: ColorBits {
                red: 0,
                green: 10,
                blue: 40,
                alpha: 8,
            },
            depth_buffer_bits: 64,
            sample_buffers: 32,
            frames_per_second: 0,
            ..GraphicsConfig::default()
        }
        .sanitized();

        assert_eq!(config.frame_buffer_bits.red, 8);
        assert_eq!(config.frame_buffer_bits.green, 10);
        assert_eq!(config.frame_buffer_bits.blue, 8);
        assert_eq!(config.depth_buffer_bits, 32);
        assert_eq!(config.sample_buffers, 16);
        assert_eq!(config.frames_per_second, 120);
    }

    #[test]
    fn test_in_range_values_are_kept() {
        let config = GraphicsConfig {
            depth_buffer_bits: 24,
            sample_buffers: 0,
            frames_per_second: 30,
            ..GraphicsConfig::default()
        };
        assert_eq!(config.sanitized(), config);
    }

    #[test]
    fn test_frame_interval() {
        let config = GraphicsConfig {
            frames_per_second: 50,
            ..GraphicsConfig::default()
        };
        assert_eq!(config.frame_interval().as_millis(), 20);
    }

    #[test]
    fn test_aspect_ratio() {
        let window = WindowConfig::default();
        assert!((window.aspect_ratio() - 16.0 / 9.0).abs() < 1e-6);
    }
}
