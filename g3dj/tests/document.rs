//! Document-level tests: export a scene and re-parse the emitted JSON.

use glam::{Mat4, Quat, Vec3};
use serde_json::Value;

use g3dj::{
    export_to_string, Animation, Bone, ExportOptions, Face, FloatPolicy, Material,
    MaterialProperty, Mesh, Node, NodeChannel, PropertyValue, QuatKey, Scene, TextureSemantic,
    UvChannel, VectorKey, VertexWeight,
};

fn texture_property(semantic: TextureSemantic, path: &str) -> MaterialProperty {
    MaterialProperty {
        key: "$tex.file".to_string(),
        semantic: Some(semantic),
        layer: 0,
        value: PropertyValue::string(path),
    }
}

fn color_property(key: &str, rgba: &[f32]) -> MaterialProperty {
    MaterialProperty {
        key: key.to_string(),
        semantic: None,
        layer: 0,
        value: PropertyValue::floats(rgba),
    }
}

/// A small but full scene: a skinned quad, two materials sharing one
/// texture, a two-level node tree and an animation.
fn sample_scene() -> Scene {
    let quad = Mesh {
        name: "quad".to_string(),
        vertex_count: 4,
        positions: Some(vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ]),
        normals: Some(vec![Vec3::Z; 4]),
        uvs: vec![UvChannel {
            components: 2,
            coords: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
        }],
        faces: vec![Face::new([0u32, 1, 2]), Face::new([2u32, 3, 0])],
        bones: vec![Bone {
            node: "joint".to_string(),
            offset: Mat4::IDENTITY,
            weights: vec![VertexWeight {
                vertex: 0,
                weight: 1.0,
            }],
        }],
        material: 0,
        ..Default::default()
    };

    let materials = vec![
        Material {
            properties: vec![
                color_property("$clr.diffuse", &[1.0, 0.0, 0.0, 1.0]),
                texture_property(TextureSemantic::Diffuse, "shared.png"),
            ],
        },
        Material {
            properties: vec![
                texture_property(TextureSemantic::Normals, "shared.png"),
                texture_property(TextureSemantic::Specular, "gloss.png"),
            ],
        },
    ];

    let root = Node {
        name: "root".to_string(),
        transform: Mat4::IDENTITY,
        meshes: vec![0],
        children: vec![Node {
            name: "joint".to_string(),
            transform: Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0)),
            ..Default::default()
        }],
    };

    let animations = vec![Animation {
        name: "wave".to_string(),
        channels: vec![NodeChannel {
            node: "joint".to_string(),
            positions: vec![
                VectorKey {
                    time: 0.0,
                    value: Vec3::ZERO,
                },
                VectorKey {
                    time: 5.0,
                    value: Vec3::X,
                },
                VectorKey {
                    time: 10.0,
                    value: Vec3::Y,
                },
            ],
            rotations: vec![
                QuatKey {
                    time: 0.0,
                    value: Quat::IDENTITY,
                },
                QuatKey {
                    time: 10.0,
                    value: Quat::IDENTITY,
                },
                QuatKey {
                    time: 15.0,
                    value: Quat::IDENTITY,
                },
            ],
            scales: vec![VectorKey {
                time: 5.0,
                value: Vec3::ONE,
            }],
        }],
    }];

    Scene {
        meshes: vec![quad],
        materials,
        root,
        animations,
    }
}

fn parse(document: &str) -> Value {
    serde_json::from_str(document).expect("emitted document is valid JSON")
}

#[test]
fn test_document_structure() {
    let doc = export_to_string(&sample_scene(), &ExportOptions::default()).unwrap();
    let value = parse(&doc);

    assert_eq!(value["version"], serde_json::json!([0, 3]));

    let meshes = value["meshes"].as_array().unwrap();
    assert_eq!(meshes.len(), 1);
    let attributes: Vec<&str> = meshes[0]["attributes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["usage"].as_str().unwrap())
        .collect();
    assert_eq!(attributes, vec!["POSITION", "NORMAL"]);

    // 4 vertices x (3 position + 3 normal) floats.
    assert_eq!(meshes[0]["vertices"].as_array().unwrap().len(), 24);

    let parts = meshes[0]["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0]["id"], "quad.0");
    assert_eq!(parts[0]["type"], "TRIANGLES");
    assert_eq!(parts[0]["indices"].as_array().unwrap().len(), 6);

    let root = &value["nodes"][0];
    assert_eq!(root["name"], "root");
    assert_eq!(root["parts"][0]["meshpartid"], "quad.0");
    assert_eq!(root["parts"][0]["materialid"], 0);
    assert_eq!(root["parts"][0]["bones"][0]["node"], "joint");
    // One uvMapping array per channel, 2 components per vertex.
    assert_eq!(
        root["parts"][0]["uvMapping"][0].as_array().unwrap().len(),
        8
    );
    assert_eq!(root["children"][0]["name"], "joint");
    let translation: Vec<f64> = root["children"][0]["translation"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_f64().unwrap())
        .collect();
    assert_eq!(translation, vec![0.0, 2.0, 0.0]);
}

#[test]
fn test_texture_pool_deduplicated_in_discovery_order() {
    let doc = export_to_string(&sample_scene(), &ExportOptions::default()).unwrap();
    let value = parse(&doc);

    let pool = value["texture"].as_array().unwrap();
    assert_eq!(pool.len(), 2);
    assert_eq!(pool[0]["id"], 0);
    assert_eq!(pool[0]["filename"], "shared.png");
    assert_eq!(pool[1]["filename"], "gloss.png");

    let materials = value["materials"].as_array().unwrap();
    assert_eq!(materials[0]["diffuseTexture"], "shared.png");
    assert_eq!(materials[1]["normalTexture"], "shared.png");
    assert_eq!(materials[1]["specularTexture"], "gloss.png");
}

#[test]
fn test_keyframes_coalesced() {
    let doc = export_to_string(&sample_scene(), &ExportOptions::default()).unwrap();
    let value = parse(&doc);

    let animation = &value["animations"][0];
    assert_eq!(animation["id"], "wave");
    let keyframes = animation["nodes"][0]["keyframes"].as_array().unwrap();
    let times: Vec<f64> = keyframes
        .iter()
        .map(|k| k["keytime"].as_f64().unwrap())
        .collect();
    assert_eq!(times, vec![0.0, 5.0, 10.0, 15.0]);

    // Exact-match contributions only; time 15 is rotation alone.
    let last = &keyframes[3];
    assert!(last.get("translation").is_none());
    assert!(last.get("scaling").is_none());
    assert!(last.get("rotation").is_some());
    let mid = &keyframes[1];
    assert!(mid.get("translation").is_some());
    assert!(mid.get("scaling").is_some());
    assert!(mid.get("rotation").is_none());
}

#[test]
fn test_partition_reflected_in_document() {
    // 12 vertices, 4 triangles, limit 3: every face needs its own part.
    let mut scene = sample_scene();
    scene.meshes[0] = Mesh {
        name: "strip".to_string(),
        vertex_count: 12,
        positions: Some((0..12).map(|i| Vec3::splat(i as f32)).collect()),
        faces: vec![
            Face::new([0u32, 1, 2]),
            Face::new([3u32, 4, 5]),
            Face::new([6u32, 7, 8]),
            Face::new([9u32, 10, 11]),
        ],
        ..Default::default()
    };

    let options = ExportOptions {
        index_limit: 3,
        ..Default::default()
    };
    let value = parse(&export_to_string(&scene, &options).unwrap());

    // Re-parsed counts match the post-partition scene, not the input.
    let meshes = value["meshes"].as_array().unwrap();
    assert_eq!(meshes.len(), 4);
    let ids: Vec<&str> = meshes
        .iter()
        .map(|m| m["parts"][0]["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["strip.0", "strip.1", "strip.2", "strip.3"]);

    let parts = value["nodes"][0]["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 4);
    assert_eq!(parts[0]["meshpartid"], "strip.0");
}

#[test]
fn test_nonfinite_float_policies() {
    let mut scene = sample_scene();
    scene.meshes[0].normals.as_mut().unwrap()[0] = Vec3::new(f32::INFINITY, 0.0, 0.0);

    let substitute = ExportOptions {
        float_policy: FloatPolicy::Substitute,
        ..Default::default()
    };
    let value = parse(&export_to_string(&scene, &substitute).unwrap());
    // Position floats precede the normals; the substituted normal.x is the
    // 4th entry of the first vertex.
    assert_eq!(value["meshes"][0]["vertices"][3], 0.0);

    let sentinel = ExportOptions {
        float_policy: FloatPolicy::Sentinel,
        ..Default::default()
    };
    let value = parse(&export_to_string(&scene, &sentinel).unwrap());
    assert_eq!(value["meshes"][0]["vertices"][3], "Infinity");
}
