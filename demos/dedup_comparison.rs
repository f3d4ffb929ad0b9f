//! Compare chunk sizes with vertex deduplication on and off.
//!
//! Builds a grid mesh in memory and streams it both ways. Dedup shrinks
//! the vertex arrays (shared corners collapse) at the cost of a map
//! lookup per index.

use std::io::Cursor;

use mesh_chunks::{LoadError, LoaderOptions, PlyChunks};

fn grid_ply(size: usize) -> Vec<u8> {
    let vertex_count = size * size;
    let face_count = 2 * (size - 1) * (size - 1);
    let mut ply = format!(
        "ply\nformat ascii 1.0\nelement vertex {vertex_count}\n\
         property float x\nproperty float y\nproperty float z\n\
         element face {face_count}\nproperty list uchar int vertex_indices\nend_header\n"
    );
    for row in 0..size {
        for col in 0..size {
            ply.push_str(&format!("{col} {row} 0\n"));
        }
    }
    for row in 0..size - 1 {
        for col in 0..size - 1 {
            let a = row * size + col;
            let (b, c, d) = (a + 1, a + size, a + size + 1);
            ply.push_str(&format!("3 {a} {b} {c}\n3 {b} {d} {c}\n"));
        }
    }
    ply.into_bytes()
}

fn run(data: &[u8], options: LoaderOptions, label: &str) -> Result<(), LoadError> {
    let mut chunks = PlyChunks::new(Cursor::new(data.to_vec()), options)?;
    let mut vertices = 0;
    let mut indices = 0;
    let mut count = 0;
    while chunks.has_next() {
        let chunk = chunks.next_chunk()?;
        vertices += chunk.vertex_count();
        indices += chunk.index_count();
        count += 1;
    }
    println!("{label}: {count} chunk(s), {vertices} vertex rows, {indices} indices");
    Ok(())
}

fn main() -> Result<(), LoadError> {
    let data = grid_ply(64);

    run(&data, LoaderOptions::default(), "duplicates allowed")?;
    run(
        &data,
        LoaderOptions {
            allow_duplicate_vertices: false,
            ..LoaderOptions::default()
        },
        "deduplicated     ",
    )?;
    Ok(())
}
