//! End-to-end PLY loading tests over in-memory sources.

use std::io::Cursor;

use mesh_chunks::{DataChunk, LoadError, LoaderOptions, PlyChunks};

fn session(data: &[u8], options: LoaderOptions) -> PlyChunks<Cursor<Vec<u8>>> {
    PlyChunks::new(Cursor::new(data.to_vec()), options).unwrap()
}

fn collect_chunks(chunks: &mut PlyChunks<Cursor<Vec<u8>>>) -> Vec<DataChunk> {
    let mut out = Vec::new();
    while chunks.has_next() {
        out.push(chunks.next_chunk().unwrap());
    }
    out
}

fn cube_ascii() -> String {
    let mut ply = String::from(
        "ply\nformat ascii 1.0\ncomment unit cube\nelement vertex 8\n\
         property float x\nproperty float y\nproperty float z\n\
         element face 12\nproperty list uchar int vertex_indices\nend_header\n",
    );
    for z in [0, 1] {
        for y in [0, 1] {
            for x in [0, 1] {
                ply.push_str(&format!("{x} {y} {z}\n"));
            }
        }
    }
    // Two triangles per side, wound consistently.
    let faces = [
        [0, 2, 1],
        [1, 2, 3],
        [4, 5, 6],
        [5, 7, 6],
        [0, 1, 4],
        [1, 5, 4],
        [2, 6, 3],
        [3, 6, 7],
        [0, 4, 2],
        [2, 4, 6],
        [1, 3, 5],
        [3, 7, 5],
    ];
    for [a, b, c] in faces {
        ply.push_str(&format!("3 {a} {b} {c}\n"));
    }
    ply
}

#[test]
fn test_ascii_cube_without_dedup() {
    let mut chunks = session(cube_ascii().as_bytes(), LoaderOptions::default());
    let emitted = collect_chunks(&mut chunks);
    assert_eq!(emitted.len(), 1);

    let chunk = &emitted[0];
    assert_eq!(chunk.vertex_count(), 36);
    assert_eq!(chunk.coords.as_ref().unwrap().len(), 108);
    assert_eq!(chunk.indices.as_ref().unwrap().len(), 36);
    assert!(chunk.normals.is_none());
    assert!(chunk.colors.is_none());
    assert_eq!(chunk.aabb.min, [0.0, 0.0, 0.0]);
    assert_eq!(chunk.aabb.max, [1.0, 1.0, 1.0]);
}

#[test]
fn test_ascii_cube_with_dedup() {
    let options = LoaderOptions {
        allow_duplicate_vertices: false,
        ..LoaderOptions::default()
    };
    let mut chunks = session(cube_ascii().as_bytes(), options);
    let emitted = collect_chunks(&mut chunks);
    assert_eq!(emitted.len(), 1);

    let chunk = &emitted[0];
    assert_eq!(chunk.vertex_count(), 8);
    let indices = chunk.indices.as_ref().unwrap();
    assert_eq!(indices.len(), 36);
    // Every index stays inside the deduplicated vertex table.
    assert!(indices.iter().all(|&i| (0..8).contains(&i)));
}

#[test]
fn test_header_metadata_exposed() {
    let chunks = session(cube_ascii().as_bytes(), LoaderOptions::default());
    let header = chunks.header();
    assert_eq!(header.comments, vec!["unit cube"]);
    assert_eq!(header.element("vertex").unwrap().count, 8);
    assert_eq!(header.element("face").unwrap().count, 12);
}

fn binary_le_colored_triangle() -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(
        b"ply\nformat binary_little_endian 1.0\nelement vertex 3\n\
          property float x\nproperty float y\nproperty float z\n\
          property uchar red\nproperty uchar green\nproperty uchar blue\n\
          element face 1\nproperty list uchar int vertex_indices\nend_header\n",
    );
    let vertices: [([f32; 3], [u8; 3]); 3] = [
        ([0.0, 0.0, 0.0], [255, 0, 0]),
        ([1.0, 0.0, 0.0], [0, 255, 0]),
        ([0.0, 1.0, 0.0], [0, 0, 255]),
    ];
    for (pos, color) in vertices {
        for c in pos {
            data.extend_from_slice(&c.to_le_bytes());
        }
        data.extend_from_slice(&color);
    }
    data.push(3);
    for i in [0i32, 1, 2] {
        data.extend_from_slice(&i.to_le_bytes());
    }
    data
}

#[test]
fn test_binary_little_endian_with_colors() {
    let mut chunks = session(&binary_le_colored_triangle(), LoaderOptions::default());
    let emitted = collect_chunks(&mut chunks);
    assert_eq!(emitted.len(), 1);

    let chunk = &emitted[0];
    assert_eq!(chunk.coords.as_ref().unwrap().len(), 9);
    assert_eq!(chunk.color_components, 3);
    assert_eq!(
        chunk.colors.as_ref().unwrap(),
        &[255, 0, 0, 0, 255, 0, 0, 0, 255]
    );
    assert_eq!(chunk.indices.as_ref().unwrap(), &[0, 1, 2]);
    assert!(chunk.normals.is_none());
}

#[test]
fn test_binary_big_endian_matches_little_endian() {
    let mut data = Vec::new();
    data.extend_from_slice(
        b"ply\nformat binary_big_endian 1.0\nelement vertex 3\n\
          property float x\nproperty float y\nproperty float z\n\
          element face 1\nproperty list uchar int vertex_indices\nend_header\n",
    );
    for pos in [[0.5f32, 0.0, 0.0], [0.0, 0.5, 0.0], [0.0, 0.0, 0.5]] {
        for c in pos {
            data.extend_from_slice(&c.to_be_bytes());
        }
    }
    data.push(3);
    for i in [0i32, 1, 2] {
        data.extend_from_slice(&i.to_be_bytes());
    }

    let mut chunks = session(&data, LoaderOptions::default());
    let chunk = chunks.next_chunk().unwrap();
    assert_eq!(
        chunk.coords.as_ref().unwrap(),
        &[0.5, 0.0, 0.0, 0.0, 0.5, 0.0, 0.0, 0.0, 0.5]
    );
}

#[test]
fn test_quad_face_is_triangulated() {
    let ply = "ply\nformat ascii 1.0\nelement vertex 4\n\
               property float x\nproperty float y\nproperty float z\n\
               element face 1\nproperty list uchar int vertex_indices\nend_header\n\
               0 0 0\n1 0 0\n1 1 0\n0 1 0\n4 0 1 2 3\n";

    let mut chunks = session(ply.as_bytes(), LoaderOptions::default());
    let emitted = collect_chunks(&mut chunks);
    assert_eq!(emitted.len(), 1);
    let chunk = &emitted[0];
    assert_eq!(chunk.indices.as_ref().unwrap().len(), 6);
    assert_eq!(chunk.vertex_count(), 6);
    assert_eq!(chunk.aabb.min, [0.0, 0.0, 0.0]);
    assert_eq!(chunk.aabb.max, [1.0, 1.0, 0.0]);

    let options = LoaderOptions {
        allow_duplicate_vertices: false,
        ..LoaderOptions::default()
    };
    let mut chunks = session(ply.as_bytes(), options);
    let chunk = chunks.next_chunk().unwrap();
    assert_eq!(chunk.indices.as_ref().unwrap().len(), 6);
    assert_eq!(chunk.vertex_count(), 4);
}

#[test]
fn test_degenerate_polygon_is_skipped_not_fatal() {
    // The 4-gon is a straight line; the triangle after it must survive.
    let ply = "ply\nformat ascii 1.0\nelement vertex 7\n\
               property float x\nproperty float y\nproperty float z\n\
               element face 2\nproperty list uchar int vertex_indices\nend_header\n\
               0 0 0\n1 0 0\n2 0 0\n3 0 0\n0 1 0\n1 1 0\n0 2 0\n\
               4 0 1 2 3\n3 4 5 6\n";

    let mut chunks = session(ply.as_bytes(), LoaderOptions::default());
    let emitted = collect_chunks(&mut chunks);
    assert_eq!(emitted.len(), 1);
    let chunk = &emitted[0];
    assert_eq!(chunk.vertex_count(), 3);
    assert_eq!(chunk.indices.as_ref().unwrap(), &[0, 1, 2]);
}

#[test]
fn test_unknown_property_does_not_shift_values() {
    let plain = "ply\nformat ascii 1.0\nelement vertex 3\n\
                 property float x\nproperty float y\nproperty float z\n\
                 element face 1\nproperty list uchar int vertex_indices\nend_header\n\
                 1 2 3\n4 5 6\n7 8 9\n3 0 1 2\n";
    let with_extra = "ply\nformat ascii 1.0\nelement vertex 3\n\
                      property float confidence\n\
                      property float x\nproperty float y\nproperty float z\n\
                      element face 1\nproperty list uchar int vertex_indices\nend_header\n\
                      0.9 1 2 3\n0.8 4 5 6\n0.7 7 8 9\n3 0 1 2\n";

    let mut plain_chunks = session(plain.as_bytes(), LoaderOptions::default());
    let mut extra_chunks = session(with_extra.as_bytes(), LoaderOptions::default());
    let expected = plain_chunks.next_chunk().unwrap();
    let actual = extra_chunks.next_chunk().unwrap();
    assert_eq!(expected.coords, actual.coords);
    assert_eq!(expected.indices, actual.indices);
    assert_eq!(expected.aabb, actual.aabb);
}

#[test]
fn test_faces_never_split_across_chunks() {
    let mut ply = String::from(
        "ply\nformat ascii 1.0\nelement vertex 4\n\
         property float x\nproperty float y\nproperty float z\n\
         element face 9\nproperty list uchar int vertex_indices\nend_header\n\
         0 0 0\n1 0 0\n0 1 0\n0 0 1\n",
    );
    for i in 0..9 {
        let a = i % 4;
        ply.push_str(&format!("3 {} {} {}\n", a, (a + 1) % 4, (a + 2) % 4));
    }

    // Capacity 7 leaves room for two triangles per chunk, never a third.
    let options = LoaderOptions {
        max_vertices_per_chunk: 7,
        ..LoaderOptions::default()
    };
    let mut chunks = session(ply.as_bytes(), options);
    let emitted = collect_chunks(&mut chunks);
    assert_eq!(emitted.len(), 5);

    let mut total_indices = 0;
    for chunk in &emitted {
        let indices = chunk.indices.as_ref().unwrap();
        assert_eq!(indices.len() % 3, 0);
        assert!(chunk.vertex_count() <= 7);
        total_indices += indices.len();
    }
    assert_eq!(total_indices, 27);
}

#[test]
fn test_chunk_invariants_hold() {
    let mut chunks = session(cube_ascii().as_bytes(), LoaderOptions::default());
    for chunk in collect_chunks(&mut chunks) {
        let verts = chunk.vertex_count();
        assert_eq!(chunk.coords.as_ref().unwrap().len(), 3 * verts);
        let indices = chunk.indices.as_ref().unwrap();
        assert_eq!(indices.len() % 3, 0);
        assert!(indices.iter().all(|&i| (i as usize) < verts));

        let coords = chunk.coords.as_ref().unwrap();
        for v in coords.chunks_exact(3) {
            assert!(chunk.aabb.contains([v[0], v[1], v[2]]));
        }
    }
}

#[test]
fn test_out_of_order_face_references_with_tiny_cache() {
    let mut ply = String::from(
        "ply\nformat ascii 1.0\nelement vertex 12\n\
         property float x\nproperty float y\nproperty float z\n\
         element face 4\nproperty list uchar int vertex_indices\nend_header\n",
    );
    for i in 0..12 {
        ply.push_str(&format!("{i} 0 0\n"));
    }
    ply.push_str("3 11 0 5\n3 2 9 4\n3 7 1 10\n3 3 8 6\n");

    let options = LoaderOptions {
        max_stream_positions: 2,
        ..LoaderOptions::default()
    };
    let mut chunks = session(ply.as_bytes(), options);
    let chunk = chunks.next_chunk().unwrap();

    // Each packed row's x must equal the original index it was fetched
    // for, no matter how the checkpoint cache evicted.
    let coords = chunk.coords.as_ref().unwrap();
    let expected = [11.0, 0.0, 5.0, 2.0, 9.0, 4.0, 7.0, 1.0, 10.0, 3.0, 8.0, 6.0];
    let xs: Vec<f32> = coords.chunks_exact(3).map(|v| v[0]).collect();
    assert_eq!(xs, expected);
}

#[test]
fn test_face_index_out_of_range_terminates_session() {
    let ply = "ply\nformat ascii 1.0\nelement vertex 3\n\
               property float x\nproperty float y\nproperty float z\n\
               element face 1\nproperty list uchar int vertex_indices\nend_header\n\
               0 0 0\n1 0 0\n0 1 0\n3 0 1 3\n";

    let mut chunks = session(ply.as_bytes(), LoaderOptions::default());
    assert!(matches!(
        chunks.next_chunk(),
        Err(LoadError::CorruptData(_))
    ));
    assert!(!chunks.has_next());
    assert!(matches!(chunks.next_chunk(), Err(LoadError::NotAvailable)));
}

#[test]
fn test_list_shorter_than_triangle_is_fatal() {
    let ply = "ply\nformat ascii 1.0\nelement vertex 3\n\
               property float x\nproperty float y\nproperty float z\n\
               element face 1\nproperty list uchar int vertex_indices\nend_header\n\
               0 0 0\n1 0 0\n0 1 0\n2 0 1\n";
    let mut chunks = session(ply.as_bytes(), LoaderOptions::default());
    assert!(matches!(
        chunks.next_chunk(),
        Err(LoadError::CorruptData(_))
    ));
}

#[test]
fn test_list_larger_than_capacity_is_fatal() {
    let ply = "ply\nformat ascii 1.0\nelement vertex 5\n\
               property float x\nproperty float y\nproperty float z\n\
               element face 1\nproperty list uchar int vertex_indices\nend_header\n\
               0 0 0\n1 0 0\n1 1 0\n0 1 0\n0.5 0.5 0\n5 0 1 2 3 4\n";
    let options = LoaderOptions {
        max_vertices_per_chunk: 4,
        ..LoaderOptions::default()
    };
    let mut chunks = session(ply.as_bytes(), options);
    assert!(matches!(
        chunks.next_chunk(),
        Err(LoadError::CorruptData(_))
    ));
}

#[test]
fn test_truncated_binary_payload_is_corrupt() {
    let mut data = binary_le_colored_triangle();
    data.truncate(data.len() - 6);
    let mut chunks = session(&data, LoaderOptions::default());
    assert!(matches!(
        chunks.next_chunk(),
        Err(LoadError::CorruptData(_))
    ));
}

#[test]
fn test_binary_vertex_list_property_is_rejected() {
    let data = b"ply\nformat binary_little_endian 1.0\nelement vertex 1\n\
                 property list uchar float weights\n\
                 element face 1\nproperty list uchar int vertex_indices\nend_header\n";
    assert!(matches!(
        PlyChunks::new(Cursor::new(data.to_vec()), LoaderOptions::default()),
        Err(LoadError::CorruptData(_))
    ));
}

#[test]
fn test_normals_and_alpha_flow_through() {
    let ply = "ply\nformat ascii 1.0\nelement vertex 3\n\
               property float x\nproperty float y\nproperty float z\n\
               property float nx\nproperty float ny\nproperty float nz\n\
               property uchar red\nproperty uchar green\nproperty uchar blue\n\
               property uchar alpha\n\
               element face 1\nproperty list uchar int vertex_indices\nend_header\n\
               0 0 0 0 0 1 10 20 30 40\n\
               1 0 0 0 0 1 50 60 70 80\n\
               0 1 0 0 0 1 90 100 110 120\n\
               3 0 1 2\n";

    let mut chunks = session(ply.as_bytes(), LoaderOptions::default());
    let chunk = chunks.next_chunk().unwrap();
    assert_eq!(
        chunk.normals.as_ref().unwrap(),
        &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0]
    );
    assert_eq!(chunk.color_components, 4);
    assert_eq!(
        chunk.colors.as_ref().unwrap(),
        &[10, 20, 30, 40, 50, 60, 70, 80, 90, 100, 110, 120]
    );
}

#[test]
fn test_double_coordinates_narrow_to_f32() {
    let ply = "ply\nformat ascii 1.0\nelement vertex 3\n\
               property double x\nproperty double y\nproperty double z\n\
               element face 1\nproperty list uchar int vertex_indices\nend_header\n\
               0.125 0 0\n1.5 0 0\n0 2.25 0\n3 0 1 2\n";
    let mut chunks = session(ply.as_bytes(), LoaderOptions::default());
    let chunk = chunks.next_chunk().unwrap();
    assert_eq!(
        chunk.coords.as_ref().unwrap(),
        &[0.125, 0.0, 0.0, 1.5, 0.0, 0.0, 0.0, 2.25, 0.0]
    );
}

#[test]
fn test_wide_list_types_for_face_indices() {
    // ushort length with uint values must behave like uchar/int.
    let ply = "ply\nformat ascii 1.0\nelement vertex 3\n\
               property float x\nproperty float y\nproperty float z\n\
               element face 1\nproperty list ushort uint vertex_indices\nend_header\n\
               0 0 0\n1 0 0\n0 1 0\n3 0 1 2\n";
    let mut chunks = session(ply.as_bytes(), LoaderOptions::default());
    let chunk = chunks.next_chunk().unwrap();
    assert_eq!(chunk.indices.as_ref().unwrap(), &[0, 1, 2]);
    assert_eq!(chunk.vertex_count(), 3);
}

#[test]
fn test_ushort_colors_are_truncated_not_clamped() {
    let ply = "ply\nformat ascii 1.0\nelement vertex 3\n\
               property float x\nproperty float y\nproperty float z\n\
               property ushort red\nproperty ushort green\nproperty ushort blue\n\
               element face 1\nproperty list uchar int vertex_indices\nend_header\n\
               0 0 0 65535 0 255\n1 0 0 256 32768 1\n0 1 0 0 40000 2\n\
               3 0 1 2\n";
    let mut chunks = session(ply.as_bytes(), LoaderOptions::default());
    let chunk = chunks.next_chunk().unwrap();
    assert_eq!(
        chunk.colors.as_ref().unwrap(),
        &[-1, 0, 255, 256, -32768, 1, 0, -25536, 2]
    );
}

#[test]
fn test_ascii_element_between_vertex_and_face_is_skipped() {
    let ply = "ply\nformat ascii 1.0\nelement vertex 3\n\
               property float x\nproperty float y\nproperty float z\n\
               element edge 2\nproperty int vertex1\nproperty int vertex2\n\
               element face 1\nproperty list uchar int vertex_indices\nend_header\n\
               0 0 0\n1 0 0\n0 1 0\n\
               0 1\n1 2\n\
               3 0 1 2\n";
    let mut chunks = session(ply.as_bytes(), LoaderOptions::default());
    let chunk = chunks.next_chunk().unwrap();
    assert_eq!(chunk.vertex_count(), 3);
    assert_eq!(chunk.indices.as_ref().unwrap(), &[0, 1, 2]);
}

#[test]
fn test_binary_element_before_vertex_is_skipped_arithmetically() {
    let mut data = Vec::new();
    data.extend_from_slice(
        b"ply\nformat binary_little_endian 1.0\n\
          element camera 1\nproperty float cx\nproperty float cy\n\
          element vertex 3\nproperty float x\nproperty float y\nproperty float z\n\
          element face 1\nproperty list uchar int vertex_indices\nend_header\n",
    );
    for c in [10.0f32, 20.0] {
        data.extend_from_slice(&c.to_le_bytes());
    }
    for pos in [[0.0f32, 0.0, 0.0], [4.0, 0.0, 0.0], [0.0, 4.0, 0.0]] {
        for c in pos {
            data.extend_from_slice(&c.to_le_bytes());
        }
    }
    data.push(3);
    for i in [0i32, 1, 2] {
        data.extend_from_slice(&i.to_le_bytes());
    }

    let mut chunks = session(&data, LoaderOptions::default());
    let chunk = chunks.next_chunk().unwrap();
    assert_eq!(
        chunk.coords.as_ref().unwrap(),
        &[0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 0.0, 4.0, 0.0]
    );
    assert_eq!(chunk.aabb.max, [4.0, 4.0, 0.0]);
}

#[test]
fn test_obj_info_metadata_exposed() {
    let ply = "ply\nformat ascii 1.0\nobj_info scanner v3\nelement vertex 3\n\
               property float x\nproperty float y\nproperty float z\n\
               element face 1\nproperty list uchar int vertex_indices\nend_header\n\
               0 0 0\n1 0 0\n0 1 0\n3 0 1 2\n";
    let chunks = session(ply.as_bytes(), LoaderOptions::default());
    assert_eq!(chunks.header().obj_info, vec!["scanner v3"]);
}

#[test]
fn test_iterator_interface_matches_next_chunk() {
    let mut chunks = session(cube_ascii().as_bytes(), LoaderOptions::default());
    let first = chunks.next();
    assert!(matches!(first, Some(Ok(_))));
    assert!(chunks.next().is_none());
}
