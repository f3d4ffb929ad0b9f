//! OBJ loading (secondary surface).
//!
//! Wavefront OBJ geometry streams through the shared chunk packer under
//! the same iterator contract as the PLY and STL loaders. Positions and
//! normals are accumulated as their records stream past and faces resolve
//! against them (1-based, with negative indices relative to the records
//! seen so far); n-gon faces go through the triangulator. Material and
//! texture handling lives outside this crate: `mtllib`/`usemtl` records
//! are surfaced to a [`MaterialListener`] and texture coordinates are
//! parsed only to keep the scan moving.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::chunk::{ChunkBuilder, DataChunk, PendingVertex};
use crate::loader::{LoaderListener, LoaderOptions, ProgressNotifier, SessionLock};
use crate::reader::ByteReader;
use crate::triangulate::{EarClipper, Triangulate};
use crate::LoadError;

/// Callbacks for the material references an OBJ file makes. Loading the
/// `.mtl` library and its textures is the listener's business.
pub trait MaterialListener {
    fn on_material_library(&self, _name: &str) {}
    fn on_use_material(&self, _name: &str) {}
}

pub struct ObjLoader {
    path: Option<PathBuf>,
    options: LoaderOptions,
    listener: Option<Arc<dyn LoaderListener>>,
    material_listener: Option<Arc<dyn MaterialListener>>,
    triangulator: Arc<dyn Triangulate>,
    session: Arc<AtomicBool>,
}

impl ObjLoader {
    pub fn new() -> Self {
        Self {
            path: None,
            options: LoaderOptions::default(),
            listener: None,
            material_listener: None,
            triangulator: Arc::new(EarClipper),
            session: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let mut loader = Self::new();
        loader.set_file(path);
        loader
    }

    pub fn set_file(&mut self, path: impl Into<PathBuf>) {
        self.path = Some(path.into());
    }

    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn set_listener(&mut self, listener: Arc<dyn LoaderListener>) {
        self.listener = Some(listener);
    }

    pub fn set_material_listener(&mut self, listener: Arc<dyn MaterialListener>) {
        self.material_listener = Some(listener);
    }

    pub fn set_triangulator(&mut self, triangulator: Arc<dyn Triangulate>) {
        self.triangulator = triangulator;
    }

    /// An OBJ file is considered valid when it declares at least one
    /// vertex position.
    pub fn is_valid_file(&self) -> Result<bool, LoadError> {
        let path = self.path.as_ref().ok_or(LoadError::NotReady)?;
        let mut reader = ByteReader::new(File::open(path)?);
        Ok(prescan(&mut reader)?.vertex_count > 0)
    }

    pub fn load(&mut self) -> Result<ObjChunks<File>, LoadError> {
        let path = self.path.as_ref().ok_or(LoadError::NotReady)?;
        let lock = SessionLock::acquire(&self.session)?;
        let file = File::open(path)?;
        ObjChunks::with_session(
            file,
            self.options,
            self.triangulator.clone(),
            self.listener.clone(),
            self.material_listener.clone(),
            Some(lock),
        )
    }
}

impl Default for ObjLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct ObjStats {
    vertex_count: u64,
    face_count: u64,
    has_normals: bool,
}

struct ObjCorner {
    position: usize,
    normal: Option<usize>,
}

struct ObjFace {
    corners: Vec<ObjCorner>,
}

pub struct ObjChunks<R: Read + Seek> {
    reader: Option<ByteReader<R>>,
    builder: ChunkBuilder,
    pending: PendingVertex,
    triangulator: Arc<dyn Triangulate>,
    notifier: ProgressNotifier,
    lock: Option<SessionLock>,
    material_listener: Option<Arc<dyn MaterialListener>>,

    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    stashed_face: Option<ObjFace>,
    finished: bool,
    face_count: u64,
    faces_done: u64,
}

impl<R: Read + Seek> ObjChunks<R> {
    pub fn new(source: R, options: LoaderOptions) -> Result<Self, LoadError> {
        Self::with_session(source, options, Arc::new(EarClipper), None, None, None)
    }

    pub(crate) fn with_session(
        source: R,
        options: LoaderOptions,
        triangulator: Arc<dyn Triangulate>,
        listener: Option<Arc<dyn LoaderListener>>,
        material_listener: Option<Arc<dyn MaterialListener>>,
        lock: Option<SessionLock>,
    ) -> Result<Self, LoadError> {
        let mut reader = ByteReader::new(source);
        let stats = prescan(&mut reader)?;

        let builder = ChunkBuilder::new(
            options.max_vertices_per_chunk.max(1),
            0,
            stats.has_normals,
            !options.allow_duplicate_vertices,
        );
        let notifier = ProgressNotifier::new(listener, options.progress_delta);
        notifier.start();

        let mut chunks = Self {
            reader: Some(reader),
            builder,
            pending: PendingVertex::default(),
            triangulator,
            notifier,
            lock,
            material_listener,
            positions: Vec::with_capacity(stats.vertex_count as usize),
            normals: Vec::new(),
            stashed_face: None,
            finished: stats.face_count == 0,
            face_count: stats.face_count,
            faces_done: 0,
        };
        if !chunks.has_next() {
            chunks.finish_session();
        }
        Ok(chunks)
    }

    pub fn has_next(&self) -> bool {
        self.stashed_face.is_some() || !self.finished
    }

    pub fn next_chunk(&mut self) -> Result<DataChunk, LoadError> {
        if !self.has_next() || self.reader.is_none() {
            return Err(LoadError::NotAvailable);
        }
        match self.fill_chunk() {
            Ok(chunk) => {
                if !self.has_next() {
                    self.notifier.progress(1.0);
                    self.finish_session();
                }
                Ok(chunk)
            }
            Err(err) => {
                self.abort_session();
                Err(err)
            }
        }
    }

    fn fill_chunk(&mut self) -> Result<DataChunk, LoadError> {
        self.builder.begin();

        loop {
            if let Some(face) = self.stashed_face.take() {
                if !self.pack_face(&face)? {
                    self.stashed_face = Some(face);
                    break;
                }
                self.face_packed();
                continue;
            }
            if self.finished {
                break;
            }
            match self.next_face()? {
                Some(face) => {
                    if !self.pack_face(&face)? {
                        self.stashed_face = Some(face);
                        break;
                    }
                    self.face_packed();
                }
                None => {
                    self.finished = true;
                    break;
                }
            }
        }

        Ok(self.builder.finish())
    }

    fn face_packed(&mut self) {
        self.faces_done += 1;
        if self.face_count > 0 {
            self.notifier
                .progress(self.faces_done as f32 / self.face_count as f32);
        }
    }

    /// Consume records until the next face, accumulating geometry on the
    /// way. `None` once the file is exhausted.
    fn next_face(&mut self) -> Result<Option<ObjFace>, LoadError> {
        let reader = self.reader.as_mut().expect("session is live");
        loop {
            if reader.is_eof()? {
                return Ok(None);
            }
            let line = reader.read_line()?;
            let mut words = line.split_whitespace();
            let Some(keyword) = words.next() else {
                continue;
            };
            match keyword {
                "v" => {
                    self.positions.push(parse_vec3(&mut words, "v")?);
                }
                "vn" => {
                    self.normals.push(parse_vec3(&mut words, "vn")?);
                }
                "f" => {
                    let corners = words
                        .map(|w| parse_corner(w, self.positions.len(), self.normals.len()))
                        .collect::<Result<Vec<_>, _>>()?;
                    if corners.len() < 3 {
                        return Err(LoadError::corrupt(format!(
                            "face with {} corners",
                            corners.len()
                        )));
                    }
                    return Ok(Some(ObjFace { corners }));
                }
                "mtllib" => {
                    if let Some(listener) = &self.material_listener {
                        for library in words {
                            listener.on_material_library(library);
                        }
                    }
                }
                "usemtl" => {
                    if let (Some(listener), Some(name)) =
                        (&self.material_listener, words.next())
                    {
                        listener.on_use_material(name);
                    }
                }
                // Texture coordinates, groups, smoothing and comments do
                // not contribute chunk data.
                "vt" | "o" | "g" | "s" | "#" => {}
                other => {
                    log::debug!("ignoring obj record '{other}'");
                }
            }
        }
    }

    /// Pack a face into the current chunk. `Ok(false)` means it does not
    /// fit and the chunk is complete.
    fn pack_face(&mut self, face: &ObjFace) -> Result<bool, LoadError> {
        let capacity = self.builder.capacity();
        let len = face.corners.len();
        if len > capacity {
            return Err(LoadError::corrupt(format!(
                "face with {len} corners can never fit a chunk of {capacity}"
            )));
        }
        if self.builder.vertex_count() + len > capacity {
            return Ok(false);
        }

        let mut order: Vec<usize> = (0..len).collect();
        if len > 3 {
            let outline: Vec<[f32; 3]> = face
                .corners
                .iter()
                .map(|c| self.positions[c.position])
                .collect();
            match self.triangulator.triangulate(&outline) {
                Ok(triples) => {
                    order = triples.into_iter().flatten().collect();
                }
                Err(_) => {
                    log::warn!("skipping degenerate face {}", self.faces_done);
                    return Ok(true);
                }
            }
        }

        for &corner_index in &order {
            let corner = &face.corners[corner_index];
            let original = corner.position as i64;
            if let Some(slot) = self.builder.try_dedup(original) {
                self.builder.add_existing_vertex(slot, original);
                continue;
            }
            let [x, y, z] = self.positions[corner.position];
            self.pending.x = x;
            self.pending.y = y;
            self.pending.z = z;
            if let Some(normal) = corner.normal {
                let [nx, ny, nz] = self.normals[normal];
                self.pending.nx = nx;
                self.pending.ny = ny;
                self.pending.nz = nz;
            }
            self.pending.index = original;
            self.builder.add_new_vertex(&self.pending);
        }
        Ok(true)
    }

    fn finish_session(&mut self) {
        if self.reader.take().is_some() {
            self.notifier.end();
        }
        self.lock = None;
    }

    fn abort_session(&mut self) {
        self.finished = true;
        self.stashed_face = None;
        self.reader = None;
        self.lock = None;
    }
}

impl<R: Read + Seek> Iterator for ObjChunks<R> {
    type Item = Result<DataChunk, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.has_next() {
            return None;
        }
        Some(self.next_chunk())
    }
}

/// One cheap pass over the file to learn what the chunks will carry.
fn prescan<R: Read + Seek>(reader: &mut ByteReader<R>) -> Result<ObjStats, LoadError> {
    let mut stats = ObjStats::default();
    while !reader.is_eof()? {
        let line = reader.read_line()?;
        match line.split_whitespace().next() {
            Some("v") => stats.vertex_count += 1,
            Some("vn") => stats.has_normals = true,
            Some("f") => stats.face_count += 1,
            _ => {}
        }
    }
    reader.seek(0)?;
    Ok(stats)
}

fn parse_vec3<'a>(
    words: &mut impl Iterator<Item = &'a str>,
    record: &str,
) -> Result<[f32; 3], LoadError> {
    let mut out = [0.0f32; 3];
    for component in &mut out {
        let word = words
            .next()
            .ok_or_else(|| LoadError::corrupt(format!("{record} record with missing components")))?;
        *component = word
            .parse::<f32>()
            .map_err(|_| LoadError::corrupt(format!("cannot parse '{word}' as float")))?;
    }
    Ok(out)
}

/// Parse a face corner (`v`, `v/vt`, `v//vn` or `v/vt/vn`), resolving
/// 1-based and negative indices against the records seen so far.
fn parse_corner(
    word: &str,
    position_count: usize,
    normal_count: usize,
) -> Result<ObjCorner, LoadError> {
    let mut parts = word.split('/');
    let position = resolve_index(
        parts.next().unwrap_or(""),
        position_count,
        "vertex",
    )?;
    let _texcoord = parts.next();
    let normal = match parts.next() {
        Some("") | None => None,
        Some(idx) => Some(resolve_index(idx, normal_count, "normal")?),
    };
    Ok(ObjCorner { position, normal })
}

fn resolve_index(word: &str, count: usize, what: &str) -> Result<usize, LoadError> {
    let raw = word
        .parse::<i64>()
        .map_err(|_| LoadError::corrupt(format!("cannot parse '{word}' as {what} index")))?;
    let resolved = if raw > 0 {
        (raw - 1) as usize
    } else if raw < 0 {
        let back = (-raw) as usize;
        if back > count {
            return Err(LoadError::corrupt(format!(
                "{what} index {raw} reaches before the first record"
            )));
        }
        count - back
    } else {
        return Err(LoadError::corrupt(format!("{what} index 0 is not valid")));
    };
    if resolved >= count {
        return Err(LoadError::corrupt(format!(
            "{what} index {raw} references a record not yet declared"
        )));
    }
    Ok(resolved)
}
