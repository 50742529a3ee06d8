//! Export error taxonomy.

/// Errors an export can fail with. Decode problems inside material
/// property bags are not represented here: the resolver logs and skips
/// them instead of aborting the document.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The scene holds no meshes, no child nodes and no animations.
    #[error("scene contains nothing to export")]
    EmptyScene,

    /// A single face references more distinct vertices than the index
    /// limit allows, so no partitioning can make it fit.
    #[error(
        "face {face} of mesh '{mesh}' references {count} distinct vertices, \
         which exceeds the index limit of {limit}"
    )]
    FaceTooLarge {
        mesh: String,
        face: usize,
        count: usize,
        limit: u32,
    },

    /// The output sink rejected the flush.
    #[error("failed to write document")]
    Io(#[from] std::io::Error),
}
