//! Streaming mesh loading into GPU-sized chunks.
//!
//! This crate reads polygon meshes in three on-disk formats (PLY in ASCII
//! and both binary byte orders, STL in ASCII and binary, and OBJ) and
//! emits them as a lazy sequence of fixed-capacity [`DataChunk`]s, sized
//! for direct upload as vertex/index buffers (65 535 vertices per chunk by
//! default, the 16-bit index ceiling). Files are never materialized as a
//! mesh graph: each `next_chunk()` call decodes just enough faces to fill
//! one chunk.
//!
//! # Example
//!
//! ```rust
//! use std::io::Cursor;
//! use mesh_chunks::{LoaderOptions, PlyChunks};
//!
//! let ply_data = "ply
//! format ascii 1.0
//! element vertex 3
//! property float x
//! property float y
//! property float z
//! element face 1
//! property list uchar int vertex_indices
//! end_header
//! 0 0 0
//! 1 0 0
//! 0 1 0
//! 3 0 1 2
//! ";
//!
//! let mut chunks = PlyChunks::new(
//!     Cursor::new(ply_data.as_bytes().to_vec()),
//!     LoaderOptions::default(),
//! )
//! .unwrap();
//!
//! while chunks.has_next() {
//!     let chunk = chunks.next_chunk().unwrap();
//!     let coords = chunk.coords.as_ref().unwrap();
//!     assert_eq!(coords.len(), 9);
//!     assert_eq!(chunk.indices.as_ref().unwrap(), &[0, 1, 2]);
//! }
//! ```
//!
//! File-backed sessions go through the per-format loaders ([`PlyLoader`],
//! [`StlLoader`], [`ObjLoader`]), which add the session lock, progress
//! listener and validity checks on top of the same iterators.

mod chunk;
mod error;
mod loader;
pub mod obj;
pub mod ply;
mod reader;
pub mod stl;
mod triangulate;

pub use chunk::{Aabb, DataChunk};
pub use error::LoadError;
pub use loader::{LoaderListener, LoaderOptions};
pub use obj::{MaterialListener, ObjChunks, ObjLoader};
pub use ply::{PlyChunks, PlyHeader, PlyLoader};
pub use reader::ByteReader;
pub use stl::{StlChunks, StlLoader};
pub use triangulate::{EarClipper, Triangulate, TriangulationError};
