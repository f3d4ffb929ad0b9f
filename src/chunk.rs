//! Fixed-capacity vertex chunks and the packer that fills them.
//!
//! A [`DataChunk`] is one graphics-API upload: tightly packed coordinate,
//! normal, color and index arrays plus the bounding box of the vertices it
//! contains. The [`ChunkBuilder`] accumulates vertices face by face and
//! hands the arrays over by ownership when a chunk is emitted.

use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Componentwise min/max bounds of the vertices in a chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Aabb {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Aabb {
    /// An empty box: +inf mins, -inf maxes, grown by the first vertex.
    pub fn empty() -> Self {
        Self {
            min: [f32::INFINITY; 3],
            max: [f32::NEG_INFINITY; 3],
        }
    }

    pub fn grow(&mut self, x: f32, y: f32, z: f32) {
        let v = [x, y, z];
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(v[axis]);
            self.max[axis] = self.max[axis].max(v[axis]);
        }
    }

    pub fn contains(&self, v: [f32; 3]) -> bool {
        (0..3).all(|axis| self.min[axis] <= v[axis] && v[axis] <= self.max[axis])
    }
}

/// One batch of mesh data sized for a single vertex-buffer upload.
///
/// Categories the source file does not carry are `None`; `colors` holds
/// `color_components` values per vertex.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DataChunk {
    pub coords: Option<Vec<f32>>,
    pub normals: Option<Vec<f32>>,
    pub colors: Option<Vec<i16>>,
    pub indices: Option<Vec<i32>>,
    pub color_components: usize,
    pub aabb: Aabb,
}

impl DataChunk {
    pub fn vertex_count(&self) -> usize {
        self.coords.as_ref().map_or(0, |c| c.len() / 3)
    }

    pub fn index_count(&self) -> usize {
        self.indices.as_ref().map_or(0, |i| i.len())
    }
}

/// Scratch state for the vertex currently being decoded.
///
/// Format decoders overwrite individual fields as properties arrive; the
/// remaining fields keep their previous values, so the defaults only apply
/// until a file first writes them.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingVertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub nx: f32,
    pub ny: f32,
    pub nz: f32,
    pub red: i16,
    pub green: i16,
    pub blue: i16,
    pub alpha: i16,
    pub index: i64,
    pub list_len: i32,
}

impl Default for PendingVertex {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            nx: 1.0,
            ny: 1.0,
            nz: 1.0,
            red: 0,
            green: 0,
            blue: 0,
            alpha: 255,
            index: 0,
            list_len: 1,
        }
    }
}

/// Accumulates vertices and indices for the chunk under construction.
pub(crate) struct ChunkBuilder {
    capacity: usize,
    color_components: usize,
    has_normals: bool,
    dedup: bool,

    coords: Vec<f32>,
    normals: Vec<f32>,
    colors: Vec<i16>,
    indices: Vec<i32>,
    original_indices: Vec<i64>,
    slot_by_original: HashMap<i64, i32>,
    aabb: Aabb,
}

impl ChunkBuilder {
    pub fn new(capacity: usize, color_components: usize, has_normals: bool, dedup: bool) -> Self {
        Self {
            capacity,
            color_components,
            has_normals,
            dedup,
            coords: Vec::new(),
            normals: Vec::new(),
            colors: Vec::new(),
            indices: Vec::new(),
            original_indices: Vec::new(),
            slot_by_original: HashMap::new(),
            aabb: Aabb::empty(),
        }
    }

    /// Allocate fresh arrays for the next chunk and reset all per-chunk
    /// state. Called at the start of every `next_chunk()`.
    pub fn begin(&mut self) {
        self.coords = Vec::with_capacity(3 * self.capacity);
        self.normals = if self.has_normals {
            Vec::with_capacity(3 * self.capacity)
        } else {
            Vec::new()
        };
        self.colors = Vec::with_capacity(self.color_components * self.capacity);
        self.indices = Vec::with_capacity(self.capacity);
        self.original_indices = Vec::with_capacity(self.capacity);
        self.slot_by_original.clear();
        self.aabb = Aabb::empty();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn vertex_count(&self) -> usize {
        self.coords.len() / 3
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Chunk-local slot previously assigned to this original vertex, when
    /// deduplication is on.
    pub fn try_dedup(&self, original: i64) -> Option<i32> {
        if self.dedup {
            self.slot_by_original.get(&original).copied()
        } else {
            None
        }
    }

    /// Append a full vertex row from the pending scratch state and record
    /// an index entry pointing at it. Returns the new chunk-local slot.
    pub fn add_new_vertex(&mut self, v: &PendingVertex) -> i32 {
        let slot = self.vertex_count() as i32;
        self.coords.extend_from_slice(&[v.x, v.y, v.z]);
        if self.has_normals {
            self.normals.extend_from_slice(&[v.nx, v.ny, v.nz]);
        }
        let color = [v.red, v.green, v.blue, v.alpha];
        self.colors.extend_from_slice(&color[..self.color_components]);
        self.aabb.grow(v.x, v.y, v.z);

        if self.dedup {
            self.slot_by_original.insert(v.index, slot);
        }
        self.indices.push(slot);
        self.original_indices.push(v.index);
        slot
    }

    /// Append an index entry reusing a slot already present in this chunk.
    /// `slot` must come from `try_dedup` for the same original index.
    pub fn add_existing_vertex(&mut self, slot: i32, original: i64) {
        self.indices.push(slot);
        self.original_indices.push(original);
    }

    /// Original vertex index recorded for each packed index entry.
    #[cfg(test)]
    pub fn original_rows(&self) -> &[i64] {
        &self.original_indices
    }

    /// Package the accumulated arrays into a chunk, dropping categories
    /// that ended up empty or that the source never provided.
    pub fn finish(&mut self) -> DataChunk {
        let verts = self.vertex_count();
        debug_assert_eq!(self.original_indices.len(), self.indices.len());
        let coords = std::mem::take(&mut self.coords);
        let normals = std::mem::take(&mut self.normals);
        let colors = std::mem::take(&mut self.colors);
        let indices = std::mem::take(&mut self.indices);
        self.original_indices = Vec::new();
        self.slot_by_original.clear();

        DataChunk {
            coords: (verts > 0).then_some(coords),
            normals: (verts > 0 && self.has_normals).then_some(normals),
            colors: (verts > 0 && self.color_components > 0).then_some(colors),
            indices: (!indices.is_empty()).then_some(indices),
            color_components: self.color_components,
            aabb: self.aabb,
        }
    }
}
