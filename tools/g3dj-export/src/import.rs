//! glTF/GLB scene import.
//!
//! Loads the document and its buffers only; images are never decoded
//! because the exported document references textures by filename.

use anyhow::{bail, Context, Result};
use glam::{Mat4, Quat, Vec3, Vec4};
use hashbrown::HashMap;
use std::path::Path;

use g3dj::material::{
    KEY_BLEND_MODE, KEY_DIFFUSE_COLOR, KEY_EMISSIVE_COLOR, KEY_OPACITY, KEY_TEXTURE,
    KEY_TWO_SIDED,
};
use g3dj::{
    Animation, Bone, Face, Material, MaterialProperty, Mesh, Node, NodeChannel, PropertyValue,
    QuatKey, Scene, TextureSemantic, UvChannel, VectorKey, VertexWeight,
};

/// Per-vertex joint/weight streams of one primitive, kept until the node
/// pass resolves which skin they belong to.
struct RawSkinning {
    joints: Vec<[u16; 4]>,
    weights: Vec<[f32; 4]>,
}

/// Build a [`Scene`] from a glTF or GLB file.
pub fn load_gltf(path: &Path) -> Result<Scene> {
    let gltf = gltf::Gltf::open(path).with_context(|| format!("Failed to open glTF: {:?}", path))?;
    let document = gltf.document;
    let buffers = gltf::import_buffers(&document, path.parent(), gltf.blob)
        .with_context(|| format!("Failed to load glTF buffers for {:?}", path))?;

    let mut scene = Scene::default();
    let default_material = document.materials().count();

    // One core mesh per primitive; remember which run of core meshes each
    // glTF mesh produced so nodes can reference them.
    let mut mesh_runs = Vec::new();
    let mut skinning: Vec<Option<RawSkinning>> = Vec::new();
    let mut needs_default_material = false;
    for mesh in document.meshes() {
        let base_name = mesh
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("mesh_{}", mesh.index()));
        let primitive_count = mesh.primitives().count();
        let start = scene.meshes.len();
        for primitive in mesh.primitives() {
            let name = if primitive_count > 1 {
                format!("{}_{}", base_name, primitive.index())
            } else {
                base_name.clone()
            };
            let (core, raw) = convert_primitive(&name, &primitive, &buffers, default_material)?;
            needs_default_material |= core.material == default_material;
            scene.meshes.push(core);
            skinning.push(raw);
        }
        mesh_runs.push(start..scene.meshes.len());
    }

    for material in document.materials() {
        scene.materials.push(convert_material(&material));
    }
    if needs_default_material {
        scene.materials.push(Material::default());
    }

    let gltf_scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .context("glTF file has no scene")?;
    let mut roots: Vec<Node> = gltf_scene
        .nodes()
        .map(|n| convert_node(&n, &mesh_runs))
        .collect();
    scene.root = match roots.len() {
        1 => roots.remove(0),
        // Multiple scene roots hang under a synthetic root.
        _ => Node {
            name: "RootNode".to_string(),
            transform: Mat4::IDENTITY,
            children: roots,
            meshes: Vec::new(),
        },
    };

    attach_bones(&document, &buffers, &mesh_runs, &skinning, &mut scene);

    for (index, animation) in document.animations().enumerate() {
        scene
            .animations
            .push(convert_animation(index, &animation, &buffers));
    }

    tracing::info!(
        "Imported {:?}: {} meshes, {} materials, {} animations",
        path,
        scene.meshes.len(),
        scene.materials.len(),
        scene.animations.len()
    );
    Ok(scene)
}

fn node_name(node: &gltf::Node) -> String {
    node.name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("node_{}", node.index()))
}

fn convert_primitive(
    name: &str,
    primitive: &gltf::Primitive,
    buffers: &[gltf::buffer::Data],
    default_material: usize,
) -> Result<(Mesh, Option<RawSkinning>)> {
    let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

    let positions: Vec<Vec3> = reader
        .read_positions()
        .with_context(|| format!("Mesh '{}' has no positions", name))?
        .map(Vec3::from)
        .collect();
    let vertex_count = positions.len();

    let normals: Option<Vec<Vec3>> = reader
        .read_normals()
        .map(|iter| iter.map(Vec3::from).collect());

    // Tangent W carries the bitangent sign; resolve it here so the core
    // model stores the tangent/bitangent pair directly.
    let (tangents, bitangents) = match (reader.read_tangents(), &normals) {
        (Some(iter), Some(normals)) => {
            let mut tangents = Vec::with_capacity(vertex_count);
            let mut bitangents = Vec::with_capacity(vertex_count);
            for (raw, normal) in iter.zip(normals) {
                let tangent = Vec3::new(raw[0], raw[1], raw[2]);
                tangents.push(tangent);
                bitangents.push(normal.cross(tangent) * raw[3]);
            }
            (Some(tangents), Some(bitangents))
        }
        _ => (None, None),
    };

    let mut colors = Vec::new();
    let mut set = 0;
    while let Some(channel) = reader.read_colors(set) {
        colors.push(channel.into_rgba_f32().map(Vec4::from).collect());
        set += 1;
    }

    let mut uvs = Vec::new();
    let mut set = 0;
    while let Some(channel) = reader.read_tex_coords(set) {
        uvs.push(UvChannel {
            components: 2,
            coords: channel
                .into_f32()
                .map(|uv| Vec3::new(uv[0], uv[1], 0.0))
                .collect(),
        });
        set += 1;
    }

    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..vertex_count as u32).collect(),
    };
    let arity = match primitive.mode() {
        gltf::mesh::Mode::Points => 1,
        gltf::mesh::Mode::Lines => 2,
        gltf::mesh::Mode::Triangles => 3,
        mode => bail!("Mesh '{}': unsupported primitive mode {:?}", name, mode),
    };
    let faces = indices
        .chunks_exact(arity)
        .map(|chunk| Face::new(chunk.iter().copied()))
        .collect();

    let raw_skinning = match (reader.read_joints(0), reader.read_weights(0)) {
        (Some(joints), Some(weights)) => Some(RawSkinning {
            joints: joints.into_u16().collect(),
            weights: weights.into_f32().collect(),
        }),
        _ => None,
    };

    let mesh = Mesh {
        name: name.to_string(),
        split: 0,
        vertex_count,
        positions: Some(positions),
        normals,
        colors,
        tangents,
        bitangents,
        uvs,
        faces,
        bones: Vec::new(),
        material: primitive
            .material()
            .index()
            .unwrap_or(default_material),
    };
    Ok((mesh, raw_skinning))
}

/// Invert the per-vertex JOINTS/WEIGHTS streams into per-bone weight
/// lists. Zero weights are dropped; joints no vertex references yield no
/// bone at all.
fn build_bones(raw: &RawSkinning, joints: &[(String, Mat4)]) -> Vec<Bone> {
    let mut per_joint: Vec<Vec<VertexWeight>> = vec![Vec::new(); joints.len()];
    for (vertex, (indices, weights)) in raw.joints.iter().zip(&raw.weights).enumerate() {
        for slot in 0..4 {
            let weight = weights[slot];
            let joint = indices[slot] as usize;
            if weight > 0.0 && joint < per_joint.len() {
                per_joint[joint].push(VertexWeight {
                    vertex: vertex as u32,
                    weight,
                });
            }
        }
    }
    joints
        .iter()
        .zip(per_joint)
        .filter(|(_, weights)| !weights.is_empty())
        .map(|((node, offset), weights)| Bone {
            node: node.clone(),
            offset: *offset,
            weights,
        })
        .collect()
}

fn attach_bones(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
    mesh_runs: &[std::ops::Range<usize>],
    skinning: &[Option<RawSkinning>],
    scene: &mut Scene,
) {
    for node in document.nodes() {
        let (Some(mesh), Some(skin)) = (node.mesh(), node.skin()) else {
            continue;
        };
        let reader = skin.reader(|buffer| Some(&buffers[buffer.index()]));
        let mut matrices = reader.read_inverse_bind_matrices();
        let joints: Vec<(String, Mat4)> = skin
            .joints()
            .map(|joint| {
                let offset = matrices
                    .as_mut()
                    .and_then(|iter| iter.next())
                    .map(|m| Mat4::from_cols_array_2d(&m))
                    .unwrap_or(Mat4::IDENTITY);
                (node_name(&joint), offset)
            })
            .collect();

        for index in mesh_runs[mesh.index()].clone() {
            if !scene.meshes[index].bones.is_empty() {
                continue;
            }
            if let Some(raw) = &skinning[index] {
                scene.meshes[index].bones = build_bones(raw, &joints);
            }
        }
    }
}

fn convert_node(node: &gltf::Node, mesh_runs: &[std::ops::Range<usize>]) -> Node {
    Node {
        name: node_name(node),
        transform: Mat4::from_cols_array_2d(&node.transform().matrix()),
        children: node
            .children()
            .map(|child| convert_node(&child, mesh_runs))
            .collect(),
        meshes: node
            .mesh()
            .map(|mesh| mesh_runs[mesh.index()].clone().collect())
            .unwrap_or_default(),
    }
}

fn texture_filename(texture: &gltf::Texture) -> String {
    match texture.source().source() {
        gltf::image::Source::Uri { uri, .. } => uri.to_string(),
        // Embedded images have no filename; reference them by index.
        gltf::image::Source::View { .. } => format!("*{}", texture.source().index()),
    }
}

/// Map the PBR factors onto the classic material bag the resolver reads.
fn convert_material(material: &gltf::Material) -> Material {
    let mut properties = Vec::new();
    let mut push = |key: &str, value: PropertyValue| {
        properties.push(MaterialProperty {
            key: key.to_string(),
            semantic: None,
            layer: 0,
            value,
        });
    };

    let pbr = material.pbr_metallic_roughness();
    let base_color = pbr.base_color_factor();
    push(KEY_DIFFUSE_COLOR, PropertyValue::floats(&base_color));
    let emissive = material.emissive_factor();
    if emissive != [0.0; 3] {
        push(KEY_EMISSIVE_COLOR, PropertyValue::floats(&emissive));
    }
    push(KEY_TWO_SIDED, PropertyValue::boolean(material.double_sided()));
    if material.alpha_mode() == gltf::material::AlphaMode::Blend {
        push(KEY_BLEND_MODE, PropertyValue::int(0));
        push(KEY_OPACITY, PropertyValue::float(base_color[3]));
    }

    let mut push_texture = |semantic: TextureSemantic, texture: &gltf::Texture| {
        properties.push(MaterialProperty {
            key: KEY_TEXTURE.to_string(),
            semantic: Some(semantic),
            layer: 0,
            value: PropertyValue::string(&texture_filename(texture)),
        });
    };
    if let Some(info) = pbr.base_color_texture() {
        push_texture(TextureSemantic::Diffuse, &info.texture());
    }
    if let Some(info) = material.normal_texture() {
        push_texture(TextureSemantic::Normals, &info.texture());
    }

    Material { properties }
}

/// Pull the value keyframes out of a sampler output, taking the middle
/// element of each cubic-spline triple.
fn sampled_values<T>(values: impl Iterator<Item = T>, cubic: bool) -> Vec<T> {
    if cubic {
        values.skip(1).step_by(3).collect()
    } else {
        values.collect()
    }
}

fn convert_animation(
    index: usize,
    animation: &gltf::Animation,
    buffers: &[gltf::buffer::Data],
) -> Animation {
    let name = animation
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("animation_{}", index));

    // Group the flat channel list per target node, first-seen order.
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, NodeChannel> = HashMap::new();

    for channel in animation.channels() {
        let target = node_name(&channel.target().node());
        let reader = channel.reader(|buffer| Some(&buffers[buffer.index()]));
        let Some(inputs) = reader.read_inputs() else {
            continue;
        };
        let Some(outputs) = reader.read_outputs() else {
            continue;
        };
        let times: Vec<f32> = inputs.collect();
        let cubic = channel.sampler().interpolation()
            == gltf::animation::Interpolation::CubicSpline;

        let entry = grouped.entry(target.clone()).or_insert_with(|| {
            order.push(target.clone());
            NodeChannel {
                node: target.clone(),
                ..Default::default()
            }
        });
        match outputs {
            gltf::animation::util::ReadOutputs::Translations(iter) => {
                entry.positions = times
                    .iter()
                    .zip(sampled_values(iter.map(Vec3::from), cubic))
                    .map(|(&time, value)| VectorKey { time, value })
                    .collect();
            }
            gltf::animation::util::ReadOutputs::Rotations(rotations) => {
                entry.rotations = times
                    .iter()
                    .zip(sampled_values(
                        rotations.into_f32().map(Quat::from_array),
                        cubic,
                    ))
                    .map(|(&time, value)| QuatKey { time, value })
                    .collect();
            }
            gltf::animation::util::ReadOutputs::Scales(iter) => {
                entry.scales = times
                    .iter()
                    .zip(sampled_values(iter.map(Vec3::from), cubic))
                    .map(|(&time, value)| VectorKey { time, value })
                    .collect();
            }
            gltf::animation::util::ReadOutputs::MorphTargetWeights(_) => {}
        }
    }

    Animation {
        name,
        channels: order
            .into_iter()
            .filter_map(|node| grouped.remove(&node))
            .collect(),
    }
}
