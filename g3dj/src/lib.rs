//! g3dj - libGDX G3DJ scene serializer
//!
//! Converts an in-memory hierarchical 3D scene (meshes, materials, bones,
//! node tree, keyframe animation) into a G3DJ text document. Mesh parts
//! are indexed with a fixed-width unsigned type, so oversized meshes are
//! transparently partitioned into index-safe sub-meshes first.
//!
//! The crate exposes one operation, [`export`]: it snapshots the caller's
//! scene, partitions the snapshot, serializes it, and flushes the document
//! to the sink in a single write. The snapshot is released on every exit
//! path.

use std::io;

pub mod error;
pub mod material;
pub mod scene;
pub mod serialize;
pub mod split;
pub mod writer;

pub use error::ExportError;
pub use material::TexturePool;
pub use scene::{
    Animation, Bone, Face, Material, MaterialProperty, Mesh, Node, NodeChannel, PropertyType,
    PropertyValue, QuatKey, Scene, TextureSemantic, UvChannel, VectorKey, VertexWeight,
};
pub use writer::{FloatPolicy, JsonWriter};

/// Default index-width limit: a 16-bit signed index buffer's positive range.
pub const DEFAULT_INDEX_LIMIT: u32 = 1 << 15;

#[derive(Debug, Clone, Copy)]
pub struct ExportOptions {
    /// Maximum distinct vertices one mesh part may reference.
    pub index_limit: u32,
    /// Rendering of non-finite floats.
    pub float_policy: FloatPolicy,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            index_limit: DEFAULT_INDEX_LIMIT,
            float_policy: FloatPolicy::Sentinel,
        }
    }
}

/// Export `scene` as a G3DJ document into `sink`.
///
/// The caller's scene is never mutated: partitioning runs on an owned
/// deep copy. The document is buffered in full and flushed once.
pub fn export<W: io::Write>(
    scene: &Scene,
    options: &ExportOptions,
    sink: W,
) -> Result<(), ExportError> {
    if scene.is_empty() {
        return Err(ExportError::EmptyScene);
    }

    let mut snapshot = scene.clone();
    split::split_scene(&mut snapshot, options.index_limit)?;

    let mut writer = JsonWriter::new(sink, options.float_policy);
    serialize::write_document(&snapshot, &mut writer);
    writer.finish()?;
    Ok(())
}

/// Convenience wrapper over [`export`] collecting the document in memory.
pub fn export_to_string(scene: &Scene, options: &ExportOptions) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    export(scene, options, &mut buf)?;
    // The writer buffers a String internally, so the bytes are UTF-8.
    Ok(String::from_utf8(buf).expect("document writer emits UTF-8"))
}
