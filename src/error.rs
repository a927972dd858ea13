//! Error types for map handling, configuration and rendering.

use std::path::PathBuf;

/// Errors raised while building, editing or persisting a [`crate::map::Map`].
#[derive(thiserror::Error, Debug)]
pub enum MapError {
    /// A map dimension was zero
    #[error("{axis} size must be positive")]
    NonPositiveSize { axis: &'static str },

    /// A tile index fell outside the grid
    #[error("{axis} must be between 0 and {limit} (got {value})")]
    OutOfRange {
        axis: &'static str,
        limit: usize,
        value: usize,
    },

    /// The persisted document could not be decoded into a map
    #[error("failed to load map from {path}")]
    Load {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    /// The map could not be written
    #[error("failed to save map to {path}")]
    Save {
        path: PathBuf,
        #[source]
        source: FormatError,
    },
}

/// Structural problems with a persisted map document.
#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("map must have exactly {expected} tiles (found {found})")]
    TileCount { expected: usize, found: usize },

    #[error("{axis} size must be positive")]
    ZeroSize { axis: &'static str },

    #[error("{axis} size {size} does not fit in 16 bits")]
    SizeOverflow { axis: &'static str, size: usize },
}

/// Errors raised while reading the configuration file.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Device and initialization failures. Fatal to the component being built.
#[derive(thiserror::Error, Debug)]
pub enum RendererError {
    #[error("no adapter supports both compute kernels and presenting to the window")]
    NoDevice,

    #[error("failed to create surface: {0}")]
    Surface(String),

    #[error("failed to request device: {0}")]
    Device(String),

    #[error("failed to build kernel program {name}:\n{log}")]
    KernelBuild { name: String, log: String },

    #[error("failed to compile shader {name}:\n{log}")]
    ShaderCompile { name: String, log: String },

    #[error("failed to link program ({vertex}, {fragment}):\n{log}")]
    ProgramLink {
        vertex: String,
        fragment: String,
        log: String,
    },

    #[error("a {latitudinal}x{longitudinal} map is too large for one terrain mesh")]
    MeshTooLarge {
        latitudinal: usize,
        longitudinal: usize,
    },

    #[error("failed to load texture {path}")]
    Texture {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

pub type RendererResult<T> = Result<T, RendererError>;

/// Failure to obtain the next frame from the surface
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Surface must be reconfigured before the next frame
    #[error("surface lost or outdated")]
    Lost,

    #[error("timed out waiting for the next frame")]
    Timeout,

    #[error("out of memory")]
    OutOfMemory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_message_names_limit() {
        let err = MapError::OutOfRange {
            axis: "Latitude",
            limit: 10,
            value: 12,
        };
        assert_eq!(err.to_string(), "Latitude must be between 0 and 10 (got 12)");
    }

    #[test]
    fn test_load_error_wraps_cause() {
        let err = MapError::Load {
            path: PathBuf::from("broken.json"),
            source: FormatError::TileCount {
                expected: 4,
                found: 3,
            },
        };
        let cause = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(
            cause.as_deref(),
            Some("map must have exactly 4 tiles (found 3)")
        );
    }
}
