//! Random-access vertex positioning.
//!
//! Polygon index lists reference vertices in arbitrary order, so the
//! iterator must be able to park the reader at any vertex's first byte.
//! Binary payloads have a constant stride and the target is plain
//! arithmetic; ASCII payloads have no stride at all, so positions are
//! found by scanning forward from the nearest known checkpoint.

use std::collections::BTreeMap;
use std::io::{Read, Seek};

use crate::ply::decode::read_scalar;
use crate::ply::header::{ElementDef, PropertyKind, StorageMode};
use crate::reader::ByteReader;
use crate::LoadError;

pub(crate) enum VertexFetcher {
    Binary {
        first_vertex_pos: u64,
        stride: u64,
        vertex_count: u64,
    },
    Ascii(AsciiFetcher),
}

impl VertexFetcher {
    /// Position the reader at vertex `index`'s first byte.
    pub fn fetch<R: Read + Seek>(
        &mut self,
        reader: &mut ByteReader<R>,
        element: &ElementDef,
        index: i64,
    ) -> Result<(), LoadError> {
        match self {
            VertexFetcher::Binary {
                first_vertex_pos,
                stride,
                vertex_count,
            } => {
                if index < 0 || index as u64 >= *vertex_count {
                    return Err(LoadError::corrupt(format!(
                        "face references vertex {index} of {vertex_count}"
                    )));
                }
                reader.seek(*first_vertex_pos + index as u64 * *stride)?;
                Ok(())
            }
            VertexFetcher::Ascii(fetcher) => fetcher.fetch(reader, element, index),
        }
    }
}

/// Forward-scanning fetcher for ASCII payloads with a bounded
/// index-to-position checkpoint map.
///
/// When the map is full the smallest key is evicted. Keeping the earliest
/// checkpoints dense near the front of the file keeps the floor lookup
/// cheap for index bursts there, which is how faces tend to arrive.
pub(crate) struct AsciiFetcher {
    first_vertex_pos: u64,
    vertex_count: u64,
    positions: BTreeMap<u64, u64>,
    max_positions: usize,
}

impl AsciiFetcher {
    pub fn new(first_vertex_pos: u64, vertex_count: u64, max_positions: usize) -> Self {
        Self {
            first_vertex_pos,
            vertex_count,
            positions: BTreeMap::new(),
            max_positions: max_positions.max(1),
        }
    }

    fn fetch<R: Read + Seek>(
        &mut self,
        reader: &mut ByteReader<R>,
        element: &ElementDef,
        index: i64,
    ) -> Result<(), LoadError> {
        if index < 0 || index as u64 >= self.vertex_count {
            return Err(LoadError::corrupt(format!(
                "face references vertex {index} of {}",
                self.vertex_count
            )));
        }
        let target = index as u64;

        // Start at the closest checkpoint at or below the target.
        let (mut current, start_pos) = self
            .positions
            .range(..=target)
            .next_back()
            .map(|(&idx, &pos)| (idx, pos))
            .unwrap_or((0, self.first_vertex_pos));

        reader.seek(start_pos)?;

        while current < target {
            self.record(current, reader.position());
            skip_ascii_instance(reader, element)?;
            current += 1;
        }
        self.record(target, reader.position());
        Ok(())
    }

    fn record(&mut self, index: u64, pos: u64) {
        if self.positions.len() >= self.max_positions && !self.positions.contains_key(&index) {
            self.positions.pop_first();
        }
        self.positions.insert(index, pos);
    }

    #[cfg(test)]
    fn checkpoint_count(&self) -> usize {
        self.positions.len()
    }
}

/// Decode and discard one ASCII element instance to advance the stream.
pub(crate) fn skip_ascii_instance<R: Read + Seek>(
    reader: &mut ByteReader<R>,
    element: &ElementDef,
) -> Result<(), LoadError> {
    for property in &element.properties {
        match property.kind {
            PropertyKind::Scalar(ty) => {
                read_scalar(reader, ty, StorageMode::Ascii)?;
            }
            PropertyKind::List { count, value } => {
                let len = read_scalar(reader, count, StorageMode::Ascii)?.to_i64();
                for _ in 0..len.max(0) {
                    read_scalar(reader, value, StorageMode::Ascii)?;
                }
            }
        }
    }
    Ok(())
}
