//! Stream any supported mesh file and print per-chunk statistics.
//!
//! ```sh
//! cargo run --example dump_chunks -- model.ply
//! ```

use mesh_chunks::{DataChunk, LoadError, ObjLoader, PlyLoader, StlLoader};

fn describe(index: usize, chunk: &DataChunk) {
    println!(
        "chunk {index}: {} vertices, {} indices, {} color components",
        chunk.vertex_count(),
        chunk.index_count(),
        chunk.color_components,
    );
    println!("  aabb min {:?} max {:?}", chunk.aabb.min, chunk.aabb.max);
    println!(
        "  normals: {}, colors: {}",
        chunk.normals.is_some(),
        chunk.colors.is_some()
    );
}

fn main() -> Result<(), LoadError> {
    let path = std::env::args()
        .nth(1)
        .expect("usage: dump_chunks <file.{ply,stl,obj}>");

    let extension = std::path::Path::new(&path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let mut total_vertices = 0;
    let mut chunk_count = 0;

    match extension.as_str() {
        "ply" => {
            let mut loader = PlyLoader::from_path(&path);
            let mut chunks = loader.load()?;
            println!("comments: {:?}", chunks.header().comments);
            while chunks.has_next() {
                let chunk = chunks.next_chunk()?;
                describe(chunk_count, &chunk);
                total_vertices += chunk.vertex_count();
                chunk_count += 1;
            }
        }
        "stl" => {
            let mut loader = StlLoader::from_path(&path);
            let mut chunks = loader.load()?;
            while chunks.has_next() {
                let chunk = chunks.next_chunk()?;
                describe(chunk_count, &chunk);
                total_vertices += chunk.vertex_count();
                chunk_count += 1;
            }
        }
        "obj" => {
            let mut loader = ObjLoader::from_path(&path);
            let mut chunks = loader.load()?;
            while chunks.has_next() {
                let chunk = chunks.next_chunk()?;
                describe(chunk_count, &chunk);
                total_vertices += chunk.vertex_count();
                chunk_count += 1;
            }
        }
        other => {
            eprintln!("unsupported extension: '{other}'");
            std::process::exit(1);
        }
    }

    println!("{chunk_count} chunk(s), {total_vertices} vertex rows");
    Ok(())
}
