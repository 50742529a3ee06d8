//! Index-constrained mesh partitioning.
//!
//! Mesh parts are indexed with a fixed-width unsigned type, so a mesh may
//! reference at most `limit` distinct vertices per part. Oversized meshes
//! are split into sub-meshes by walking the face list in order and opening
//! a new sub-mesh whenever the next face would push the open one past the
//! limit. Face order is never changed, so concatenating the sub-meshes'
//! faces (mapped back through their local->original vertex maps) rebuilds
//! the original face list exactly.

use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

use crate::error::ExportError;
use crate::scene::{Bone, Face, Mesh, Node, Scene, UvChannel, VertexWeight};

/// Partition every mesh in the scene and rewrite node mesh indices to the
/// resulting sub-mesh indices. Meshes with no faces vanish from node lists.
pub fn split_scene(scene: &mut Scene, limit: u32) -> Result<(), ExportError> {
    let mut sub_meshes = Vec::with_capacity(scene.meshes.len());
    let mut remap = Vec::with_capacity(scene.meshes.len());

    for mesh in &scene.meshes {
        let parts = split_mesh(mesh, limit)?;
        if parts.len() != 1 {
            tracing::debug!(
                "Split mesh '{}' ({} vertices, {} faces) into {} sub-meshes (limit {})",
                mesh.name,
                mesh.vertex_count,
                mesh.faces.len(),
                parts.len(),
                limit
            );
        }
        let start = sub_meshes.len();
        sub_meshes.extend(parts);
        remap.push(start..sub_meshes.len());
    }

    scene.meshes = sub_meshes;
    rewrite_mesh_indices(&mut scene.root, &remap);
    Ok(())
}

fn rewrite_mesh_indices(node: &mut Node, remap: &[std::ops::Range<usize>]) {
    node.meshes = node
        .meshes
        .iter()
        .flat_map(|&m| remap[m].clone())
        .collect();
    for child in &mut node.children {
        rewrite_mesh_indices(child, remap);
    }
}

/// Split one mesh into index-safe sub-meshes.
///
/// - A mesh with no faces produces no sub-meshes.
/// - A mesh whose vertex count already fits the limit is passed through as
///   a single sub-mesh, numerically identical to the input.
/// - Otherwise vertices are renumbered per sub-mesh in first-reference
///   order; vertices no face references are dropped.
pub fn split_mesh(mesh: &Mesh, limit: u32) -> Result<Vec<Mesh>, ExportError> {
    if mesh.faces.is_empty() {
        return Ok(Vec::new());
    }
    if mesh.vertex_count <= limit as usize {
        let mut clone = mesh.clone();
        clone.split = 0;
        return Ok(vec![clone]);
    }

    let mut parts: Vec<Mesh> = Vec::new();
    // original id -> local id for the open sub-mesh, plus the locals in
    // assignment order (the local->original map).
    let mut local: HashMap<u32, u32> = HashMap::new();
    let mut order: Vec<u32> = Vec::new();
    let mut faces: Vec<Face> = Vec::new();

    for (face_index, face) in mesh.faces.iter().enumerate() {
        // Distinct vertices of this face, duplicates within the face
        // counted once. Linear scan for the common small arities, hash
        // set for degenerate giant polygons.
        let distinct: SmallVec<[u32; 16]> = if face.indices.len() <= 16 {
            let mut distinct = SmallVec::new();
            for &index in &face.indices {
                if !distinct.contains(&index) {
                    distinct.push(index);
                }
            }
            distinct
        } else {
            let set: HashSet<u32> = face.indices.iter().copied().collect();
            set.into_iter().collect()
        };
        if distinct.len() > limit as usize {
            return Err(ExportError::FaceTooLarge {
                mesh: mesh.name.clone(),
                face: face_index,
                count: distinct.len(),
                limit,
            });
        }

        let unseen = distinct.iter().filter(|v| !local.contains_key(*v)).count();
        if local.len() + unseen > limit as usize && !faces.is_empty() {
            let split = parts.len() as u32;
            parts.push(build_sub_mesh(
                mesh,
                split,
                &local,
                std::mem::take(&mut order),
                std::mem::take(&mut faces),
            ));
            local.clear();
        }

        let mut rewritten = Face::default();
        for &index in &face.indices {
            let next = order.len() as u32;
            let local_id = *local.entry(index).or_insert_with(|| {
                order.push(index);
                next
            });
            rewritten.indices.push(local_id);
        }
        faces.push(rewritten);
    }

    let split = parts.len() as u32;
    parts.push(build_sub_mesh(mesh, split, &local, order, faces));
    Ok(parts)
}

/// Assemble a sub-mesh from the source mesh and one local vertex map.
/// Every attribute array is a function of vertex id, so each is resliced
/// through the same local->original order list.
fn build_sub_mesh(
    source: &Mesh,
    split: u32,
    local: &HashMap<u32, u32>,
    order: Vec<u32>,
    faces: Vec<Face>,
) -> Mesh {
    fn reslice<T: Copy>(values: &Option<Vec<T>>, order: &[u32]) -> Option<Vec<T>> {
        values
            .as_ref()
            .map(|v| order.iter().map(|&i| v[i as usize]).collect())
    }

    let bones = source
        .bones
        .iter()
        .filter_map(|bone| {
            let weights: Vec<VertexWeight> = bone
                .weights
                .iter()
                .filter_map(|w| {
                    local.get(&w.vertex).map(|&vertex| VertexWeight {
                        vertex,
                        weight: w.weight,
                    })
                })
                .collect();
            // Bones that touch no vertex of this sub-mesh are omitted.
            if weights.is_empty() {
                None
            } else {
                Some(Bone {
                    node: bone.node.clone(),
                    offset: bone.offset,
                    weights,
                })
            }
        })
        .collect();

    Mesh {
        name: source.name.clone(),
        split,
        vertex_count: order.len(),
        positions: reslice(&source.positions, &order),
        normals: reslice(&source.normals, &order),
        colors: source
            .colors
            .iter()
            .map(|channel| order.iter().map(|&i| channel[i as usize]).collect())
            .collect(),
        tangents: reslice(&source.tangents, &order),
        bitangents: reslice(&source.bitangents, &order),
        uvs: source
            .uvs
            .iter()
            .map(|channel| UvChannel {
                components: channel.components,
                coords: order.iter().map(|&i| channel.coords[i as usize]).collect(),
            })
            .collect(),
        faces,
        bones,
        material: source.material,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec3};

    /// Mesh with `vertex_count` position-only vertices and the given faces.
    fn mesh_with_faces(vertex_count: usize, faces: &[&[u32]]) -> Mesh {
        Mesh {
            name: "test".to_string(),
            vertex_count,
            positions: Some(
                (0..vertex_count)
                    .map(|i| Vec3::new(i as f32, 0.0, 0.0))
                    .collect(),
            ),
            faces: faces.iter().map(|f| Face::new(f.iter().copied())).collect(),
            ..Default::default()
        }
    }

    /// Distinct vertex count of a sub-mesh's faces.
    fn distinct_vertices(mesh: &Mesh) -> usize {
        let mut seen = hashbrown::HashSet::new();
        for face in &mesh.faces {
            seen.extend(face.indices.iter().copied());
        }
        seen.len()
    }

    #[test]
    fn test_zero_faces_yields_zero_sub_meshes() {
        let mesh = mesh_with_faces(10, &[]);
        assert!(split_mesh(&mesh, 4).unwrap().is_empty());
    }

    #[test]
    fn test_small_mesh_passes_through_identically() {
        let mesh = mesh_with_faces(4, &[&[0, 1, 2], &[2, 3, 0]]);
        let parts = split_mesh(&mesh, 65536).unwrap();
        assert_eq!(parts.len(), 1);
        let part = &parts[0];
        assert_eq!(part.split, 0);
        assert_eq!(part.part_id(), "test.0");
        assert_eq!(part.vertex_count, 4);
        assert_eq!(part.positions, mesh.positions);
        assert_eq!(part.faces, mesh.faces);
    }

    #[test]
    fn test_vertex_bound_holds_for_all_limits() {
        let mesh = mesh_with_faces(
            12,
            &[
                &[0, 1, 2],
                &[2, 3, 4],
                &[4, 5, 6],
                &[6, 7, 8],
                &[8, 9, 10],
                &[10, 11, 0],
            ],
        );
        for limit in 3..=12u32 {
            // Force the splitting path regardless of vertex count.
            let mut big = mesh.clone();
            big.vertex_count = limit as usize + 100;
            big.positions = Some(
                (0..big.vertex_count)
                    .map(|i| Vec3::new(i as f32, 0.0, 0.0))
                    .collect(),
            );
            for part in split_mesh(&big, limit).unwrap() {
                assert!(
                    distinct_vertices(&part) <= limit as usize,
                    "limit {} violated",
                    limit
                );
                assert_eq!(part.vertex_count, distinct_vertices(&part));
            }
        }
    }

    #[test]
    fn test_face_reassembly_reproduces_original_order() {
        let faces: Vec<Vec<u32>> = vec![
            vec![0, 1, 2],
            vec![2, 3, 4],
            vec![5, 6, 7],
            vec![7, 1, 0],
            vec![8, 9, 2],
        ];
        let face_refs: Vec<&[u32]> = faces.iter().map(|f| f.as_slice()).collect();
        let mut mesh = mesh_with_faces(10, &face_refs);
        mesh.vertex_count = 1000; // force the splitting path
        mesh.positions = Some(
            (0..1000).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect(),
        );

        let parts = split_mesh(&mesh, 4).unwrap();
        assert!(parts.len() > 1);

        // Positions encode the original vertex id in x, so the resliced
        // position array doubles as the local->original map.
        let mut reassembled: Vec<Vec<u32>> = Vec::new();
        for part in &parts {
            let positions = part.positions.as_ref().unwrap();
            for face in &part.faces {
                reassembled.push(
                    face.indices
                        .iter()
                        .map(|&i| positions[i as usize].x as u32)
                        .collect(),
                );
            }
        }
        assert_eq!(reassembled, faces);
    }

    #[test]
    fn test_oversized_face_is_fatal() {
        let mut mesh = mesh_with_faces(10, &[&[0, 1, 2, 3, 4]]);
        mesh.vertex_count = 100;
        mesh.positions = Some(vec![Vec3::ZERO; 100]);
        let err = split_mesh(&mesh, 3).unwrap_err();
        match err {
            ExportError::FaceTooLarge {
                mesh: name,
                face,
                count,
                limit,
            } => {
                assert_eq!(name, "test");
                assert_eq!(face, 0);
                assert_eq!(count, 5);
                assert_eq!(limit, 3);
            }
            other => panic!("expected FaceTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn test_bone_weights_remapped_and_empty_bones_dropped() {
        let mut mesh = mesh_with_faces(10, &[&[0, 1, 2], &[3, 4, 5]]);
        mesh.vertex_count = 100;
        mesh.positions = Some(vec![Vec3::ZERO; 100]);
        mesh.bones = vec![
            Bone {
                node: "hip".to_string(),
                offset: Mat4::IDENTITY,
                weights: vec![
                    VertexWeight {
                        vertex: 0,
                        weight: 0.5,
                    },
                    VertexWeight {
                        vertex: 4,
                        weight: 1.0,
                    },
                ],
            },
            Bone {
                node: "knee".to_string(),
                offset: Mat4::IDENTITY,
                weights: vec![VertexWeight {
                    vertex: 5,
                    weight: 0.25,
                }],
            },
        ];

        let parts = split_mesh(&mesh, 3).unwrap();
        assert_eq!(parts.len(), 2);

        // First sub-mesh holds vertices {0,1,2}; only the hip touches it.
        assert_eq!(parts[0].bones.len(), 1);
        assert_eq!(parts[0].bones[0].node, "hip");
        assert_eq!(
            parts[0].bones[0].weights,
            vec![VertexWeight {
                vertex: 0,
                weight: 0.5
            }]
        );

        // Second sub-mesh holds {3,4,5} as locals {0,1,2}.
        assert_eq!(parts[1].bones.len(), 2);
        assert_eq!(
            parts[1].bones[0].weights,
            vec![VertexWeight {
                vertex: 1,
                weight: 1.0
            }]
        );
        assert_eq!(
            parts[1].bones[1].weights,
            vec![VertexWeight {
                vertex: 2,
                weight: 0.25
            }]
        );
    }

    #[test]
    fn test_attribute_channels_resliced_together() {
        let mut mesh = mesh_with_faces(10, &[&[2, 1, 0], &[5, 4, 3]]);
        mesh.vertex_count = 100;
        let ids = |count: usize| -> Vec<Vec3> {
            (0..count).map(|i| Vec3::splat(i as f32)).collect()
        };
        mesh.positions = Some(ids(100));
        mesh.normals = Some(ids(100));
        mesh.colors = vec![(0..100).map(|i| glam::Vec4::splat(i as f32)).collect()];
        mesh.uvs = vec![UvChannel {
            components: 2,
            coords: ids(100),
        }];

        let parts = split_mesh(&mesh, 3).unwrap();
        // Locals were assigned in first-reference order: 2, 1, 0.
        let part = &parts[0];
        let expect = vec![Vec3::splat(2.0), Vec3::splat(1.0), Vec3::splat(0.0)];
        assert_eq!(part.positions.as_ref().unwrap(), &expect);
        assert_eq!(part.normals.as_ref().unwrap(), &expect);
        assert_eq!(part.uvs[0].coords, expect);
        assert_eq!(part.colors[0][0], glam::Vec4::splat(2.0));
    }

    #[test]
    fn test_polygon_duplicates_counted_once() {
        // A 12-arity polygon revisiting vertices references only 10
        // distinct ones, so it fits a limit of 10 on its own.
        let face: Vec<u32> = vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 0, 1];
        let mut mesh = mesh_with_faces(10, &[&face]);
        mesh.vertex_count = 100;
        mesh.positions = Some(vec![Vec3::ZERO; 100]);

        let parts = split_mesh(&mesh, 10).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].vertex_count, 10);
        assert_eq!(parts[0].faces[0].indices.len(), 12);

        assert!(matches!(
            split_mesh(&mesh, 9).unwrap_err(),
            ExportError::FaceTooLarge { count: 10, .. }
        ));
    }

    #[test]
    fn test_large_mesh_end_to_end() {
        // 70000 vertices, 3 polygon faces over distinct vertex ranges,
        // 16-bit limit. The last 1000 vertices are never referenced.
        let mut mesh = mesh_with_faces(70000, &[]);
        mesh.faces = vec![
            Face::new(0..30000u32),
            Face::new(30000..60000u32),
            Face::new(60000..69000u32),
        ];

        let parts = split_mesh(&mesh, 65536).unwrap();
        assert_eq!(parts.len(), 2);

        // Faces 0 and 1 share the first sub-mesh (60000 <= 65536); face 2
        // would push it to 69000, so it opens the second.
        assert_eq!(parts[0].faces.len(), 2);
        assert_eq!(parts[1].faces.len(), 1);

        // Sum of sub-mesh vertex counts equals the distinct referenced
        // vertices, not the source vertex count.
        let total: usize = parts.iter().map(|p| p.vertex_count).sum();
        assert_eq!(total, 69000);
    }

    #[test]
    fn test_split_scene_rewrites_node_indices() {
        let mut big = mesh_with_faces(10, &[&[0, 1, 2], &[3, 4, 5], &[6, 7, 8]]);
        big.vertex_count = 1000;
        big.positions = Some(vec![Vec3::ZERO; 1000]);
        let empty = mesh_with_faces(4, &[]);
        let small = mesh_with_faces(3, &[&[0, 1, 2]]);

        let mut scene = Scene {
            meshes: vec![big, empty, small],
            root: Node {
                name: "root".to_string(),
                meshes: vec![0, 1, 2],
                children: vec![Node {
                    name: "child".to_string(),
                    meshes: vec![2],
                    ..Default::default()
                }],
                ..Default::default()
            },
            ..Default::default()
        };

        split_scene(&mut scene, 3).unwrap();

        // Mesh 0 split into 3, mesh 1 vanished, mesh 2 passed through.
        assert_eq!(scene.meshes.len(), 4);
        assert_eq!(scene.root.meshes, vec![0, 1, 2, 3]);
        assert_eq!(scene.root.children[0].meshes, vec![3]);
        assert_eq!(scene.meshes[3].part_id(), "test.0");
        assert_eq!(scene.meshes[1].part_id(), "test.1");
    }
}
