//! g3dj-export library
//!
//! Builds a [`g3dj::Scene`] from a glTF/GLB file for the CLI and for any
//! host tool that wants to drive the exporter directly.

pub mod import;

pub use import::load_gltf;
