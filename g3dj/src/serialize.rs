//! Scene tree walker: drives the document writer over a partitioned scene.
//!
//! The walk order is fixed by the document schema: version marker, meshes,
//! materials, texture pool, node tree, animations. Sections with nothing
//! to say are omitted entirely.

use std::io;

use glam::{Quat, Vec3};

use crate::material::{self, ResolvedMaterial, TexturePool};
use crate::scene::{Animation, Mesh, Node, NodeChannel, Scene};
use crate::writer::JsonWriter;

/// Format version written as the document's `version` marker.
pub const FORMAT_VERSION: [i64; 2] = [0, 3];

/// Serialize the whole (already partitioned) scene. Writing is infallible;
/// the buffered document reaches the sink when the caller finishes the
/// writer.
pub fn write_document<W: io::Write>(scene: &Scene, w: &mut JsonWriter<W>) {
    w.start_object();

    w.key("version");
    w.start_array();
    w.int(FORMAT_VERSION[0]);
    w.int(FORMAT_VERSION[1]);
    w.end_array();

    if !scene.meshes.is_empty() {
        w.key("meshes");
        w.start_array();
        for mesh in &scene.meshes {
            write_mesh(mesh, w);
        }
        w.end_array();
    }

    if !scene.materials.is_empty() {
        let (resolved, pool) = material::resolve_materials(&scene.materials);
        w.key("materials");
        w.start_array();
        for (index, material) in resolved.iter().enumerate() {
            write_material(index, material, w);
        }
        w.end_array();
        write_texture_pool(&pool, w);
    }

    w.key("nodes");
    w.start_array();
    write_node(&scene.root, scene, w);
    w.end_array();

    if !scene.animations.is_empty() {
        w.key("animations");
        w.start_array();
        for animation in &scene.animations {
            write_animation(animation, w);
        }
        w.end_array();
    }

    w.end_object();
}

fn write_vec3(v: Vec3, w: &mut JsonWriter<impl io::Write>) {
    w.float(v.x);
    w.float(v.y);
    w.float(v.z);
}

fn write_quat(q: Quat, w: &mut JsonWriter<impl io::Write>) {
    w.float(q.w);
    w.float(q.x);
    w.float(q.y);
    w.float(q.z);
}

fn write_attribute(usage: &str, size: i64, w: &mut JsonWriter<impl io::Write>) {
    w.start_object();
    w.key("usage");
    w.string(usage);
    w.key("size");
    w.int(size);
    w.key("type");
    w.string("FLOAT");
    w.end_object();
}

/// Primitive type label for a part, derived from its first face's arity.
fn part_type(mesh: &Mesh) -> &'static str {
    match mesh.faces.first().map_or(0, |f| f.indices.len()) {
        1 => "POINTS",
        2 => "LINES",
        3 => "TRIANGLES",
        // Larger polygons have no exact match in the part grammar.
        _ => "TRIANGLE_STRIP",
    }
}

fn write_mesh(mesh: &Mesh, w: &mut JsonWriter<impl io::Write>) {
    w.start_object();

    w.key("attributes");
    w.start_array();
    if mesh.positions.is_some() {
        write_attribute("POSITION", 3, w);
    }
    if mesh.normals.is_some() {
        write_attribute("NORMAL", 3, w);
    }
    if !mesh.colors.is_empty() {
        write_attribute("COLOR", 4 * mesh.colors.len() as i64, w);
    }
    if mesh.tangents.is_some() && mesh.bitangents.is_some() {
        write_attribute("TANGENT", 3, w);
        write_attribute("BINORMAL", 3, w);
    }
    w.end_array();

    // Flattened vertex stream, vertex-major, channels in attribute order.
    w.key("vertices");
    w.start_array();
    for i in 0..mesh.vertex_count {
        if let Some(positions) = &mesh.positions {
            write_vec3(positions[i], w);
        }
        if let Some(normals) = &mesh.normals {
            write_vec3(normals[i], w);
        }
        for channel in &mesh.colors {
            let c = channel[i];
            w.float(c.x);
            w.float(c.y);
            w.float(c.z);
            w.float(c.w);
        }
        if let (Some(tangents), Some(bitangents)) = (&mesh.tangents, &mesh.bitangents) {
            write_vec3(tangents[i], w);
            write_vec3(bitangents[i], w);
        }
    }
    w.end_array();

    // One part per sub-mesh; the partitioner guarantees the indices fit.
    w.key("parts");
    w.start_array();
    w.start_object();
    w.key("id");
    w.string(&mesh.part_id());
    w.key("type");
    w.string(part_type(mesh));
    w.key("indices");
    w.start_array();
    for face in &mesh.faces {
        for &index in &face.indices {
            w.int(index as i64);
        }
    }
    w.end_array();
    w.end_object();
    w.end_array();

    w.end_object();
}

fn write_color(key: &str, color: &Option<Vec<f32>>, w: &mut JsonWriter<impl io::Write>) {
    if let Some(color) = color {
        w.key(key);
        w.start_array();
        for &c in color {
            w.float(c);
        }
        w.end_array();
    }
}

fn write_material(index: usize, material: &ResolvedMaterial, w: &mut JsonWriter<impl io::Write>) {
    w.start_object();
    w.key("id");
    w.int(index as i64);
    write_color("diffuseColor", &material.diffuse_color, w);
    write_color("specularColor", &material.specular_color, w);
    write_color("ambientColor", &material.ambient_color, w);
    write_color("emissiveColor", &material.emissive_color, w);
    if let Some(cullface) = material.cullface {
        w.key("cullface");
        w.string(cullface);
    }
    if let Some(shininess) = material.shininess {
        w.key("shininess");
        w.float(shininess);
    }
    if let Some(blended) = &material.blended {
        w.key("blended");
        w.start_object();
        w.key("opacity");
        w.float(blended.opacity);
        if let Some(source) = blended.source {
            w.key("source");
            w.string(source);
        }
        if let Some(destination) = blended.destination {
            w.key("destination");
            w.string(destination);
        }
        w.end_object();
    }
    let keys = [
        "diffuseTexture",
        "specularTexture",
        "bumpTexture",
        "normalTexture",
    ];
    for (key, path) in keys.iter().zip(&material.textures) {
        if let Some(path) = path {
            w.key(key);
            w.string(path);
        }
    }
    w.end_object();
}

fn write_texture_pool(pool: &TexturePool, w: &mut JsonWriter<impl io::Write>) {
    w.key("texture");
    w.start_array();
    for (id, filename) in pool.iter().enumerate() {
        w.start_object();
        w.key("id");
        w.int(id as i64);
        w.key("filename");
        w.string(filename);
        w.end_object();
    }
    w.end_array();
}

fn write_node(node: &Node, scene: &Scene, w: &mut JsonWriter<impl io::Write>) {
    w.start_object();

    w.key("name");
    w.string(&node.name);

    let (scale, rotation, translation) = node.transform.to_scale_rotation_translation();
    w.key("translation");
    w.start_array();
    write_vec3(translation, w);
    w.end_array();
    w.key("rotation");
    w.start_array();
    write_quat(rotation, w);
    w.end_array();
    w.key("scale");
    w.start_array();
    write_vec3(scale, w);
    w.end_array();

    if !node.meshes.is_empty() {
        w.key("parts");
        w.start_array();
        for &mesh_index in &node.meshes {
            write_node_part(&scene.meshes[mesh_index], w);
        }
        w.end_array();
    }

    if !node.children.is_empty() {
        w.key("children");
        w.start_array();
        for child in &node.children {
            write_node(child, scene, w);
        }
        w.end_array();
    }

    w.end_object();
}

fn write_node_part(mesh: &Mesh, w: &mut JsonWriter<impl io::Write>) {
    w.start_object();
    w.key("meshpartid");
    w.string(&mesh.part_id());
    w.key("materialid");
    w.int(mesh.material as i64);

    if !mesh.bones.is_empty() {
        w.key("bones");
        w.start_array();
        for bone in &mesh.bones {
            w.start_object();
            w.key("node");
            w.string(&bone.node);
            let (scale, rotation, translation) = bone.offset.to_scale_rotation_translation();
            w.key("translation");
            w.start_array();
            write_vec3(translation, w);
            w.end_array();
            w.key("rotation");
            w.start_array();
            write_quat(rotation, w);
            w.end_array();
            w.key("scale");
            w.start_array();
            write_vec3(scale, w);
            w.end_array();
            w.end_object();
        }
        w.end_array();
    }

    if !mesh.uvs.is_empty() {
        // One inner array per channel, vertex-major, only the meaningful
        // coordinates of each entry.
        w.key("uvMapping");
        w.start_array();
        for channel in &mesh.uvs {
            let components = if channel.components == 0 {
                2
            } else {
                channel.components.min(3)
            };
            w.start_array();
            for coord in &channel.coords {
                for c in 0..components {
                    w.float(coord[c]);
                }
            }
            w.end_array();
        }
        w.end_array();
    }

    w.end_object();
}

/// One coalesced keyframe: whichever channels have an exact key at `time`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe {
    pub time: f32,
    pub translation: Option<Vec3>,
    pub rotation: Option<Quat>,
    pub scale: Option<Vec3>,
}

/// Merge a node channel's three independently-timed key lists into one
/// ascending-time keyframe sequence.
///
/// A channel contributes to a record only on an exact time match; there
/// is no interpolation or nearest-key snapping. Every position-key time
/// produces a record first (picking up rotation and scale at the same
/// instant), then rotation-key times not already covered, then the
/// remaining scale-key times. The record count is the size of the union
/// of the three time sets. Duplicate times within one source list keep
/// the last value.
pub fn coalesce_keyframes(channel: &NodeChannel) -> Vec<Keyframe> {
    let positions = dedup_keys(channel.positions.iter().map(|k| (k.time, k.value)));
    let rotations = dedup_keys(channel.rotations.iter().map(|k| (k.time, k.value)));
    let scales = dedup_keys(channel.scales.iter().map(|k| (k.time, k.value)));

    let mut frames = Vec::with_capacity(positions.len() + rotations.len() + scales.len());
    for &(time, value) in &positions {
        frames.push(Keyframe {
            time,
            translation: Some(value),
            rotation: lookup(&rotations, time),
            scale: lookup(&scales, time),
        });
    }
    for &(time, value) in &rotations {
        if lookup(&positions, time).is_some() {
            continue;
        }
        frames.push(Keyframe {
            time,
            translation: None,
            rotation: Some(value),
            scale: lookup(&scales, time),
        });
    }
    for &(time, value) in &scales {
        if lookup(&positions, time).is_some() || lookup(&rotations, time).is_some() {
            continue;
        }
        frames.push(Keyframe {
            time,
            translation: None,
            rotation: None,
            scale: Some(value),
        });
    }
    frames.sort_by(|a, b| a.time.total_cmp(&b.time));
    frames
}

/// Sort keys by time and collapse duplicate times, keeping the last value.
fn dedup_keys<T: Copy>(keys: impl Iterator<Item = (f32, T)>) -> Vec<(f32, T)> {
    let mut sorted: Vec<(f32, T)> = keys.collect();
    // Stable sort: among equal times the later source key stays later.
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut deduped: Vec<(f32, T)> = Vec::with_capacity(sorted.len());
    for key in sorted {
        match deduped.last_mut() {
            Some(last) if last.0.total_cmp(&key.0).is_eq() => *last = key,
            _ => deduped.push(key),
        }
    }
    deduped
}

fn lookup<T: Copy>(keys: &[(f32, T)], time: f32) -> Option<T> {
    keys.binary_search_by(|(t, _)| t.total_cmp(&time))
        .ok()
        .map(|i| keys[i].1)
}

fn write_animation(animation: &Animation, w: &mut JsonWriter<impl io::Write>) {
    w.start_object();
    w.key("id");
    w.string(&animation.name);
    if !animation.channels.is_empty() {
        w.key("nodes");
        w.start_array();
        for channel in &animation.channels {
            write_channel(channel, w);
        }
        w.end_array();
    }
    w.end_object();
}

fn write_channel(channel: &NodeChannel, w: &mut JsonWriter<impl io::Write>) {
    w.start_object();
    w.key("node");
    w.string(&channel.node);
    w.key("keyframes");
    w.start_array();
    for frame in coalesce_keyframes(channel) {
        w.start_object();
        w.key("keytime");
        w.float(frame.time);
        if let Some(translation) = frame.translation {
            w.key("translation");
            w.start_array();
            write_vec3(translation, w);
            w.end_array();
        }
        if let Some(rotation) = frame.rotation {
            w.key("rotation");
            w.start_array();
            write_quat(rotation, w);
            w.end_array();
        }
        if let Some(scale) = frame.scale {
            w.key("scaling");
            w.start_array();
            write_vec3(scale, w);
            w.end_array();
        }
        w.end_object();
    }
    w.end_array();
    w.end_object();
}
