//! Owned scene data model.
//!
//! The exporter never touches the caller's scene graph directly: `export`
//! clones the whole `Scene` and mutates only the copy. Nodes own their
//! children outright; the only cross-links in the model (bone -> node,
//! animation channel -> node) are name-keyed weak references.

use glam::{Mat4, Quat, Vec3, Vec4};
use smallvec::SmallVec;

/// A complete scene: meshes, materials, a node tree and animations.
///
/// Invariant: every mesh index stored on a node is `< meshes.len()`.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub root: Node,
    pub animations: Vec<Animation>,
}

impl Scene {
    /// True when there is nothing worth exporting: no meshes, no child
    /// nodes and no animations.
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty() && self.root.children.is_empty() && self.animations.is_empty()
    }
}

/// One mesh, or after partitioning one index-safe sub-mesh.
///
/// Every attribute array is parallel to the vertex list: either absent or
/// exactly `vertex_count` entries long. Face indices and bone weight
/// vertex ids are `< vertex_count`.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub name: String,
    /// Sub-mesh ordinal within the source mesh; 0 for unpartitioned meshes.
    pub split: u32,
    pub vertex_count: usize,
    pub positions: Option<Vec<Vec3>>,
    pub normals: Option<Vec<Vec3>>,
    /// Vertex color channels, each `vertex_count` long.
    pub colors: Vec<Vec<Vec4>>,
    /// Present together with `bitangents` or not at all.
    pub tangents: Option<Vec<Vec3>>,
    pub bitangents: Option<Vec<Vec3>>,
    pub uvs: Vec<UvChannel>,
    pub faces: Vec<Face>,
    pub bones: Vec<Bone>,
    /// Index into `Scene::materials`.
    pub material: usize,
}

impl Mesh {
    /// Stable part identifier, `"<meshName>.<splitIndex>"`. Unique across
    /// the scene once the partitioner has run.
    pub fn part_id(&self) -> String {
        format!("{}.{}", self.name, self.split)
    }
}

/// An ordered run of vertex indices. Arity 1/2/3 denotes a point, line or
/// triangle; anything larger is a polygon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Face {
    pub indices: SmallVec<[u32; 4]>,
}

impl Face {
    pub fn new(indices: impl IntoIterator<Item = u32>) -> Self {
        Self {
            indices: indices.into_iter().collect(),
        }
    }
}

/// One UV coordinate channel. Only the first `components` coordinates of
/// each entry are meaningful (1-3; texture coordinates are commonly 2D).
#[derive(Debug, Clone, Default)]
pub struct UvChannel {
    pub components: usize,
    pub coords: Vec<Vec3>,
}

/// A bone influencing a mesh. `node` names the scene node the bone tracks;
/// the correlation is by name, never by reference.
#[derive(Debug, Clone)]
pub struct Bone {
    pub node: String,
    /// Mesh-space to bone-space offset, decomposed to TRS on output.
    pub offset: Mat4,
    pub weights: Vec<VertexWeight>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexWeight {
    pub vertex: u32,
    pub weight: f32,
}

/// A node in the scene tree. Children are owned exclusively by their
/// parent; there are no back-pointers.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub name: String,
    pub transform: Mat4,
    pub children: Vec<Node>,
    /// Indices of the meshes this node instances.
    pub meshes: Vec<usize>,
}

/// A material: an unordered bag of typed properties keyed by string
/// identifiers. There is no fixed schema; the resolver interprets only
/// recognized keys and ignores the rest.
#[derive(Debug, Clone, Default)]
pub struct Material {
    pub properties: Vec<MaterialProperty>,
}

#[derive(Debug, Clone)]
pub struct MaterialProperty {
    pub key: String,
    /// Set for texture-slot properties, `None` otherwise.
    pub semantic: Option<TextureSemantic>,
    /// Texture stack layer; higher layers shadow lower ones per semantic.
    pub layer: u32,
    pub value: PropertyValue,
}

/// Texture slot semantics as tagged by the importing side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureSemantic {
    Diffuse,
    Specular,
    Height,
    Displacement,
    Normals,
}

/// Wire type of a property value's byte blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    Float,
    Int,
    Bool,
    Str,
    Binary,
}

/// A typed byte blob. Decoding is always length-checked: truncated or
/// misaligned data yields a [`PropertyDecodeError`] instead of a silently
/// misread value.
#[derive(Debug, Clone)]
pub struct PropertyValue {
    pub ty: PropertyType,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropertyDecodeError {
    #[error("expected a {expected:?} value, found {found:?}")]
    WrongType {
        expected: PropertyType,
        found: PropertyType,
    },
    #[error("value is {len} bytes, expected {expected}")]
    Length { len: usize, expected: usize },
    #[error("value is {len} bytes, not a whole number of 32-bit values")]
    Misaligned { len: usize },
    #[error("string value is not valid UTF-8")]
    Utf8,
}

impl PropertyValue {
    pub fn float(value: f32) -> Self {
        Self::floats(&[value])
    }

    pub fn floats(values: &[f32]) -> Self {
        let mut data = Vec::with_capacity(values.len() * 4);
        for v in values {
            data.extend_from_slice(&v.to_le_bytes());
        }
        Self {
            ty: PropertyType::Float,
            data,
        }
    }

    pub fn int(value: u32) -> Self {
        Self {
            ty: PropertyType::Int,
            data: value.to_le_bytes().to_vec(),
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self {
            ty: PropertyType::Bool,
            data: vec![value as u8],
        }
    }

    pub fn string(value: &str) -> Self {
        Self {
            ty: PropertyType::Str,
            data: value.as_bytes().to_vec(),
        }
    }

    pub fn binary(data: Vec<u8>) -> Self {
        Self {
            ty: PropertyType::Binary,
            data,
        }
    }

    fn check_type(&self, expected: PropertyType) -> Result<(), PropertyDecodeError> {
        if self.ty == expected {
            Ok(())
        } else {
            Err(PropertyDecodeError::WrongType {
                expected,
                found: self.ty,
            })
        }
    }

    /// Decode as a run of little-endian `f32`s (color arrays).
    pub fn as_floats(&self) -> Result<Vec<f32>, PropertyDecodeError> {
        self.check_type(PropertyType::Float)?;
        if self.data.len() % 4 != 0 {
            return Err(PropertyDecodeError::Misaligned {
                len: self.data.len(),
            });
        }
        Ok(self
            .data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Decode as exactly one `f32`.
    pub fn as_f32(&self) -> Result<f32, PropertyDecodeError> {
        self.check_type(PropertyType::Float)?;
        match <[u8; 4]>::try_from(self.data.as_slice()) {
            Ok(bytes) => Ok(f32::from_le_bytes(bytes)),
            Err(_) => Err(PropertyDecodeError::Length {
                len: self.data.len(),
                expected: 4,
            }),
        }
    }

    pub fn as_u32(&self) -> Result<u32, PropertyDecodeError> {
        self.check_type(PropertyType::Int)?;
        match <[u8; 4]>::try_from(self.data.as_slice()) {
            Ok(bytes) => Ok(u32::from_le_bytes(bytes)),
            Err(_) => Err(PropertyDecodeError::Length {
                len: self.data.len(),
                expected: 4,
            }),
        }
    }

    pub fn as_bool(&self) -> Result<bool, PropertyDecodeError> {
        self.check_type(PropertyType::Bool)?;
        match self.data.as_slice() {
            [b] => Ok(*b != 0),
            _ => Err(PropertyDecodeError::Length {
                len: self.data.len(),
                expected: 1,
            }),
        }
    }

    pub fn as_str(&self) -> Result<&str, PropertyDecodeError> {
        self.check_type(PropertyType::Str)?;
        std::str::from_utf8(&self.data).map_err(|_| PropertyDecodeError::Utf8)
    }

    /// Raw bytes of an untyped blob. Unlike the other accessors there is
    /// no length to check, only the type tag.
    pub fn as_bytes(&self) -> Result<&[u8], PropertyDecodeError> {
        self.check_type(PropertyType::Binary)?;
        Ok(&self.data)
    }
}

/// An animation clip: one channel per animated node.
#[derive(Debug, Clone, Default)]
pub struct Animation {
    pub name: String,
    pub channels: Vec<NodeChannel>,
}

/// Per-node animation data. The three key lists are independently sized
/// and independently timed; alignment happens at serialization time.
#[derive(Debug, Clone, Default)]
pub struct NodeChannel {
    pub node: String,
    pub positions: Vec<VectorKey>,
    pub rotations: Vec<QuatKey>,
    pub scales: Vec<VectorKey>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorKey {
    pub time: f32,
    pub value: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuatKey {
    pub time: f32,
    pub value: Quat,
}
