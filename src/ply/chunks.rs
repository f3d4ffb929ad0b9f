//! The PLY chunk iterator.
//!
//! Drives the whole pipeline: face records are decoded in file order,
//! n-gons are triangulated, referenced vertices are fetched and decoded
//! through the installed role table, and the chunk packer emits a batch
//! whenever the next face would overflow it. A face is never split across
//! two chunks.

use std::io::{Read, Seek};
use std::sync::Arc;

use crate::chunk::{ChunkBuilder, DataChunk, PendingVertex};
use crate::loader::{LoaderListener, LoaderOptions, ProgressNotifier, SessionLock};
use crate::ply::decode::{read_scalar, SemanticRole};
use crate::ply::fetch::{skip_ascii_instance, AsciiFetcher, VertexFetcher};
use crate::ply::header::{ElementDef, PlyHeader, PropertyKind, StorageMode};
use crate::reader::ByteReader;
use crate::triangulate::Triangulate;
use crate::LoadError;

pub struct PlyChunks<R: Read + Seek> {
    reader: Option<ByteReader<R>>,
    header: PlyHeader,
    vertex_element: ElementDef,
    face_element: Option<ElementDef>,
    vertex_roles: Vec<SemanticRole>,
    fetcher: VertexFetcher,
    builder: ChunkBuilder,
    pending: PendingVertex,
    triangulator: Arc<dyn Triangulate>,
    notifier: ProgressNotifier,
    lock: Option<SessionLock>,
    face_count: u64,
    current_face: u64,
    progress_step: u64,
}

impl<R: Read + Seek> PlyChunks<R> {
    /// Start a chunk session over any seekable source using the default
    /// triangulator and no listener.
    pub fn new(source: R, options: LoaderOptions) -> Result<Self, LoadError> {
        Self::with_session(
            source,
            options,
            Arc::new(crate::triangulate::EarClipper),
            None,
            None,
        )
    }

    pub(crate) fn with_session(
        source: R,
        options: LoaderOptions,
        triangulator: Arc<dyn Triangulate>,
        listener: Option<Arc<dyn LoaderListener>>,
        lock: Option<SessionLock>,
    ) -> Result<Self, LoadError> {
        let mut reader = ByteReader::new(source);
        let header = PlyHeader::parse(&mut reader)?;

        let vertex_index = header
            .elements
            .iter()
            .position(|e| e.name == "vertex")
            .ok_or_else(|| LoadError::corrupt("no vertex element declared"))?;
        let face_index = header.elements.iter().position(|e| e.name == "face");

        let vertex_element = header.elements[vertex_index].clone();
        let face_element = face_index.map(|i| header.elements[i].clone());

        // Install the slot extractors once; unrecognized names decode and
        // discard so the stream position stays exact.
        let vertex_roles: Vec<SemanticRole> = vertex_element
            .properties
            .iter()
            .map(|p| SemanticRole::for_vertex_property(&p.name))
            .collect();
        for (property, role) in vertex_element.properties.iter().zip(&vertex_roles) {
            if *role == SemanticRole::Ignored {
                log::warn!("ignoring vertex property '{}'", property.name);
            }
        }

        let color_components = vertex_roles
            .iter()
            .filter(|r| {
                matches!(
                    r,
                    SemanticRole::Red
                        | SemanticRole::Green
                        | SemanticRole::Blue
                        | SemanticRole::Alpha
                )
            })
            .count();
        let has_normals = vertex_roles.iter().any(|r| {
            matches!(
                r,
                SemanticRole::NormalX | SemanticRole::NormalY | SemanticRole::NormalZ
            )
        });

        let (first_vertex_pos, first_face_pos) =
            element_positions(&mut reader, &header, vertex_index, face_index)
                .map_err(map_truncation)?;

        let fetcher = match header.mode {
            StorageMode::Ascii => VertexFetcher::Ascii(AsciiFetcher::new(
                first_vertex_pos,
                vertex_element.count,
                options.max_stream_positions,
            )),
            StorageMode::LittleEndian | StorageMode::BigEndian => {
                let stride = vertex_element.fixed_row_size().ok_or_else(|| {
                    LoadError::corrupt("list property on a binary vertex element")
                })?;
                VertexFetcher::Binary {
                    first_vertex_pos,
                    stride,
                    vertex_count: vertex_element.count,
                }
            }
        };

        let face_count = face_element.as_ref().map_or(0, |e| e.count);
        if let Some(pos) = first_face_pos {
            reader.seek(pos)?;
        }

        let builder = ChunkBuilder::new(
            options.max_vertices_per_chunk.max(1),
            color_components,
            has_normals,
            !options.allow_duplicate_vertices,
        );
        let progress_step =
            ((options.progress_delta as f64 * face_count as f64) as u64).max(1);

        let notifier = ProgressNotifier::new(listener, options.progress_delta);
        notifier.start();

        let mut chunks = Self {
            reader: Some(reader),
            header,
            vertex_element,
            face_element,
            vertex_roles,
            fetcher,
            builder,
            pending: PendingVertex::default(),
            triangulator,
            notifier,
            lock,
            face_count,
            current_face: 0,
            progress_step,
        };
        if chunks.face_count == 0 {
            chunks.finish_session();
        }
        Ok(chunks)
    }

    /// The parsed schema, including comments and `obj_info` metadata.
    pub fn header(&self) -> &PlyHeader {
        &self.header
    }

    pub fn has_next(&self) -> bool {
        self.current_face < self.face_count
    }

    /// Produce the next chunk. IO and corruption errors terminate the
    /// session; afterwards only `NotAvailable` is returned.
    pub fn next_chunk(&mut self) -> Result<DataChunk, LoadError> {
        if !self.has_next() || self.reader.is_none() {
            return Err(LoadError::NotAvailable);
        }
        match self.fill_chunk() {
            Ok(chunk) => {
                log::debug!(
                    "emitted chunk: {} vertices, {} indices",
                    chunk.vertex_count(),
                    chunk.index_count()
                );
                if !self.has_next() {
                    self.notifier.progress(1.0);
                    self.finish_session();
                }
                Ok(chunk)
            }
            Err(err) => {
                self.abort_session();
                Err(map_truncation(err))
            }
        }
    }

    fn fill_chunk(&mut self) -> Result<DataChunk, LoadError> {
        self.builder.begin();
        let capacity = self.builder.capacity();
        let mode = self.header.mode;
        let reader = self.reader.as_mut().expect("session is live");
        let face_element = self.face_element.as_ref().expect("faces exist");
        let mut list_indices: Vec<i64> = Vec::new();
        let mut end_of_chunk = false;

        while self.current_face < self.face_count {
            let face_start = reader.position();

            for property in &face_element.properties {
                // Scalar face properties carry no indices; decode them to
                // keep the stream position exact.
                let (count, value) = match property.kind {
                    PropertyKind::Scalar(ty) => {
                        read_scalar(reader, ty, mode)?;
                        continue;
                    }
                    PropertyKind::List { count, value } => (count, value),
                };

                let len_slot = read_scalar(reader, count, mode)?;
                SemanticRole::ListLength.apply(len_slot, &mut self.pending);
                let list_len = self.pending.list_len;
                if list_len < 3 {
                    return Err(LoadError::corrupt(format!(
                        "polygon with {list_len} vertices"
                    )));
                }
                if list_len as usize > capacity {
                    return Err(LoadError::corrupt(format!(
                        "polygon with {list_len} vertices can never fit a chunk of {capacity}"
                    )));
                }
                if self.builder.vertex_count() + list_len as usize > capacity {
                    // The face would overflow this chunk; rewind so the
                    // next chunk starts with it.
                    reader.seek(face_start)?;
                    end_of_chunk = true;
                    break;
                }

                list_indices.clear();
                for _ in 0..list_len {
                    let slot = read_scalar(reader, value, mode)?;
                    SemanticRole::VertexIndex.apply(slot, &mut self.pending);
                    list_indices.push(self.pending.index);
                }
                let after_list = reader.position();

                let mut skip_face = false;
                if list_len > 3 {
                    let mut polygon = Vec::with_capacity(list_len as usize);
                    for &original in &list_indices {
                        self.fetcher
                            .fetch(reader, &self.vertex_element, original)?;
                        read_vertex(
                            reader,
                            &self.vertex_element,
                            &self.vertex_roles,
                            mode,
                            &mut self.pending,
                        )?;
                        polygon.push([self.pending.x, self.pending.y, self.pending.z]);
                    }
                    match self.triangulator.triangulate(&polygon) {
                        Ok(triples) => {
                            let mut flattened = Vec::with_capacity(triples.len() * 3);
                            for triple in triples {
                                for corner in triple {
                                    flattened.push(list_indices[corner]);
                                }
                            }
                            list_indices = flattened;
                        }
                        Err(_) => {
                            log::warn!(
                                "skipping degenerate polygon at face {}",
                                self.current_face
                            );
                            reader.seek(after_list)?;
                            skip_face = true;
                        }
                    }
                }

                if !skip_face {
                    for &original in &list_indices {
                        if let Some(slot) = self.builder.try_dedup(original) {
                            self.builder.add_existing_vertex(slot, original);
                        } else {
                            self.fetcher
                                .fetch(reader, &self.vertex_element, original)?;
                            read_vertex(
                                reader,
                                &self.vertex_element,
                                &self.vertex_roles,
                                mode,
                                &mut self.pending,
                            )?;
                            self.pending.index = original;
                            self.builder.add_new_vertex(&self.pending);
                        }
                    }
                    reader.seek(after_list)?;
                }
            }

            if end_of_chunk {
                break;
            }
            self.current_face += 1;
            if self.current_face % self.progress_step == 0 {
                self.notifier
                    .progress(self.current_face as f32 / self.face_count as f32);
            }
        }

        Ok(self.builder.finish())
    }

    fn finish_session(&mut self) {
        if self.reader.take().is_some() {
            self.notifier.end();
        }
        self.lock = None;
    }

    fn abort_session(&mut self) {
        self.current_face = self.face_count;
        self.reader = None;
        self.lock = None;
    }
}

impl<R: Read + Seek> Iterator for PlyChunks<R> {
    type Item = Result<DataChunk, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.has_next() {
            return None;
        }
        Some(self.next_chunk())
    }
}

/// Decode one vertex instance, routing each property through its role.
fn read_vertex<R: Read + Seek>(
    reader: &mut ByteReader<R>,
    element: &ElementDef,
    roles: &[SemanticRole],
    mode: StorageMode,
    pending: &mut PendingVertex,
) -> Result<(), LoadError> {
    for (property, &role) in element.properties.iter().zip(roles) {
        match property.kind {
            PropertyKind::Scalar(ty) => {
                let slot = read_scalar(reader, ty, mode)?;
                role.apply(slot, pending);
            }
            PropertyKind::List { count, value } => {
                let len = read_scalar(reader, count, mode)?.to_i64();
                for _ in 0..len.max(0) {
                    let slot = read_scalar(reader, value, mode)?;
                    role.apply(slot, pending);
                }
            }
        }
    }
    Ok(())
}

/// Stream positions of the first vertex and first face instance.
///
/// Binary modes compute them arithmetically from the fixed row sizes;
/// ASCII walks elements in declared order, skipping instances, until both
/// targets have been reached.
fn element_positions<R: Read + Seek>(
    reader: &mut ByteReader<R>,
    header: &PlyHeader,
    vertex_index: usize,
    face_index: Option<usize>,
) -> Result<(u64, Option<u64>), LoadError> {
    match header.mode {
        StorageMode::Ascii => {
            reader.seek(header.data_start)?;
            let mut vertex_pos = None;
            let mut face_pos = None;
            for (i, element) in header.elements.iter().enumerate() {
                if i == vertex_index {
                    vertex_pos = Some(reader.position());
                }
                if Some(i) == face_index {
                    face_pos = Some(reader.position());
                }
                if vertex_pos.is_some() && (face_index.is_none() || face_pos.is_some()) {
                    break;
                }
                for _ in 0..element.count {
                    skip_ascii_instance(reader, element)?;
                }
            }
            Ok((vertex_pos.expect("vertex element exists"), face_pos))
        }
        StorageMode::LittleEndian | StorageMode::BigEndian => {
            let mut offset = Some(header.data_start);
            let mut vertex_pos = None;
            let mut face_pos = None;
            for (i, element) in header.elements.iter().enumerate() {
                if i == vertex_index {
                    vertex_pos = Some(offset.ok_or_else(variable_prefix)?);
                }
                if Some(i) == face_index {
                    face_pos = Some(offset.ok_or_else(variable_prefix)?);
                }
                if vertex_pos.is_some() && (face_index.is_none() || face_pos.is_some()) {
                    break;
                }
                offset = match (offset, element.fixed_row_size()) {
                    (Some(base), Some(row)) => Some(base + element.count * row),
                    _ => None,
                };
            }
            Ok((vertex_pos.expect("vertex element exists"), face_pos))
        }
    }
}

fn variable_prefix() -> LoadError {
    LoadError::corrupt("list property in a binary element preceding the face data")
}

/// Running out of payload before the declared counts is corruption, not a
/// plain IO failure.
fn map_truncation(err: LoadError) -> LoadError {
    match err {
        LoadError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            LoadError::corrupt("stream ended before the declared element counts")
        }
        other => other,
    }
}
