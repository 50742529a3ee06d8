//! Material property resolution and the texture filename pool.
//!
//! Materials arrive as generic property bags. Resolution is two steps:
//! classify each property key into a closed set of known meanings, then
//! length-check-decode its value. A property that fails to decode is
//! logged and skipped, never silently misread and never fatal; unknown
//! keys are ignored outright.

use hashbrown::HashMap;

use crate::scene::{Material, MaterialProperty, TextureSemantic};

// The classic Assimp material bag identifiers.
pub const KEY_DIFFUSE_COLOR: &str = "$clr.diffuse";
pub const KEY_SPECULAR_COLOR: &str = "$clr.specular";
pub const KEY_AMBIENT_COLOR: &str = "$clr.ambient";
pub const KEY_EMISSIVE_COLOR: &str = "$clr.emissive";
pub const KEY_TWO_SIDED: &str = "$mat.twosided";
pub const KEY_BLEND_MODE: &str = "$mat.blend";
pub const KEY_OPACITY: &str = "$mat.opacity";
pub const KEY_SHININESS: &str = "$mat.shininess";
pub const KEY_TEXTURE: &str = "$tex.file";

/// Blend mode value for additive blending; anything else is treated as
/// standard alpha blending.
pub const BLEND_ADDITIVE: u32 = 1;

/// Deduplicated texture filename pool. Identity is by filename content;
/// ids are assigned sequentially in first-discovery order and are stable
/// for the lifetime of one export.
#[derive(Debug, Default)]
pub struct TexturePool {
    filenames: Vec<String>,
    index: HashMap<String, u32>,
}

impl TexturePool {
    /// Intern a filename, returning its pool id.
    pub fn intern(&mut self, filename: &str) -> u32 {
        if let Some(&id) = self.index.get(filename) {
            return id;
        }
        let id = self.filenames.len() as u32;
        self.filenames.push(filename.to_string());
        self.index.insert(filename.to_string(), id);
        id
    }

    pub fn is_empty(&self) -> bool {
        self.filenames.is_empty()
    }

    /// Filenames in id order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.filenames.iter().map(String::as_str)
    }
}

/// Texture slots of the output schema, in schema order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextureSlot {
    Diffuse = 0,
    Specular = 1,
    Bump = 2,
    Normal = 3,
}

pub const TEXTURE_SLOT_COUNT: usize = 4;

impl TextureSlot {
    fn from_semantic(semantic: TextureSemantic) -> Self {
        match semantic {
            TextureSemantic::Diffuse => Self::Diffuse,
            TextureSemantic::Specular => Self::Specular,
            TextureSemantic::Height | TextureSemantic::Displacement => Self::Bump,
            TextureSemantic::Normals => Self::Normal,
        }
    }
}

/// What a recognized property means. Classification happens before any
/// value bytes are touched.
enum PropertyClass {
    DiffuseColor,
    SpecularColor,
    AmbientColor,
    EmissiveColor,
    TwoSided,
    BlendMode,
    Opacity,
    Shininess,
    Texture(TextureSlot, u32),
}

fn classify(property: &MaterialProperty) -> Option<PropertyClass> {
    match property.key.as_str() {
        KEY_DIFFUSE_COLOR => Some(PropertyClass::DiffuseColor),
        KEY_SPECULAR_COLOR => Some(PropertyClass::SpecularColor),
        KEY_AMBIENT_COLOR => Some(PropertyClass::AmbientColor),
        KEY_EMISSIVE_COLOR => Some(PropertyClass::EmissiveColor),
        KEY_TWO_SIDED => Some(PropertyClass::TwoSided),
        KEY_BLEND_MODE => Some(PropertyClass::BlendMode),
        KEY_OPACITY => Some(PropertyClass::Opacity),
        KEY_SHININESS => Some(PropertyClass::Shininess),
        KEY_TEXTURE => property
            .semantic
            .map(|s| PropertyClass::Texture(TextureSlot::from_semantic(s), property.layer)),
        _ => None,
    }
}

/// Blending state of a resolved material.
#[derive(Debug, Clone, PartialEq)]
pub struct Blended {
    pub opacity: f32,
    pub source: Option<&'static str>,
    pub destination: Option<&'static str>,
}

/// The shading properties the document schema knows about, extracted from
/// one material's bag. Field order mirrors the output record order.
#[derive(Debug, Default)]
pub struct ResolvedMaterial {
    pub diffuse_color: Option<Vec<f32>>,
    pub specular_color: Option<Vec<f32>>,
    pub ambient_color: Option<Vec<f32>>,
    pub emissive_color: Option<Vec<f32>>,
    pub cullface: Option<&'static str>,
    pub shininess: Option<f32>,
    pub blended: Option<Blended>,
    /// Slot order: diffuse, specular, bump, normal.
    pub textures: [Option<String>; TEXTURE_SLOT_COUNT],
}

/// Resolve every material, interning texture paths into one shared pool.
/// Pool ids follow first-discovery order: materials in array order, slots
/// in schema order within a material.
pub fn resolve_materials(materials: &[Material]) -> (Vec<ResolvedMaterial>, TexturePool) {
    let mut pool = TexturePool::default();
    let resolved = materials
        .iter()
        .map(|m| resolve_material(m, &mut pool))
        .collect();
    (resolved, pool)
}

/// Resolve one material's property bag. The whole bag is scanned; later
/// occurrences of a recognized key overwrite earlier ones, and texture
/// slots keep only the highest-layer entry per semantic.
pub fn resolve_material(material: &Material, pool: &mut TexturePool) -> ResolvedMaterial {
    let mut out = ResolvedMaterial::default();
    let mut blend_mode = None;
    let mut opacity = None;
    // Per slot: (layer, path) of the highest layer seen so far.
    let mut textures: [Option<(u32, String)>; TEXTURE_SLOT_COUNT] = Default::default();

    for property in &material.properties {
        let Some(class) = classify(property) else {
            continue;
        };
        let value = &property.value;
        let decoded = match class {
            PropertyClass::DiffuseColor => value.as_floats().map(|c| out.diffuse_color = Some(c)),
            PropertyClass::SpecularColor => {
                value.as_floats().map(|c| out.specular_color = Some(c))
            }
            PropertyClass::AmbientColor => value.as_floats().map(|c| out.ambient_color = Some(c)),
            PropertyClass::EmissiveColor => {
                value.as_floats().map(|c| out.emissive_color = Some(c))
            }
            PropertyClass::TwoSided => value.as_bool().map(|two_sided| {
                out.cullface = Some(if two_sided { "NONE" } else { "BACK" });
            }),
            PropertyClass::BlendMode => value.as_u32().map(|mode| blend_mode = Some(mode)),
            PropertyClass::Opacity => value.as_f32().map(|o| opacity = Some(o)),
            PropertyClass::Shininess => value.as_f32().map(|s| out.shininess = Some(s)),
            PropertyClass::Texture(slot, layer) => value.as_str().map(|path| {
                let entry = &mut textures[slot as usize];
                let shadowed = entry.as_ref().is_some_and(|(l, _)| *l >= layer);
                if !shadowed {
                    *entry = Some((layer, path.to_string()));
                }
            }),
        };
        if let Err(e) = decoded {
            tracing::warn!("Skipping material property '{}': {}", property.key, e);
        }
    }

    // A material is blended only when a blend mode is explicit or the
    // opacity says it is translucent.
    if blend_mode.is_some() || opacity.is_some_and(|o| o < 1.0) {
        let (source, destination) = match blend_mode {
            Some(BLEND_ADDITIVE) => (Some("ONE"), Some("ONE")),
            Some(_) => (Some("SRC_ALPHA"), Some("ONE_MINUS_SRC_ALPHA")),
            None => (None, None),
        };
        out.blended = Some(Blended {
            opacity: opacity.unwrap_or(1.0),
            source,
            destination,
        });
    }

    for (slot, texture) in textures.into_iter().enumerate() {
        if let Some((_, path)) = texture {
            pool.intern(&path);
            out.textures[slot] = Some(path);
        }
    }
    out
}
