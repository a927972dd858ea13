//! Botcraft terrain viewer: tile maps turned into GPU-synthesized meshes.
//!
//! A [`map::Map`] is uploaded to the device, two compute kernels expand it
//! into a triangulated mesh written straight into vertex buffers, and the
//! [`rendering::TerrainRenderer`] draws it through an orbit
//! [`camera::CameraController`].

pub mod backend;
pub mod camera;
pub mod cli;
pub mod error;
pub mod map;
pub mod mesh;
pub mod params;
pub mod rendering;
