//! PLY (Polygon File Format) loading.
//!
//! [`PlyLoader`] owns a file path and session state; [`PlyLoader::load`]
//! opens a [`PlyChunks`] iterator that streams the mesh as GPU-sized
//! chunks. For in-memory sources, construct [`PlyChunks`] directly over
//! any `Read + Seek`.

mod chunks;
mod decode;
mod fetch;
pub mod header;

pub use chunks::PlyChunks;
pub use header::{ElementDef, PlyHeader, PropertyDef, PropertyKind, ScalarType, StorageMode};

use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::loader::{LoaderListener, LoaderOptions, SessionLock};
use crate::reader::ByteReader;
use crate::triangulate::{EarClipper, Triangulate};
use crate::LoadError;

pub struct PlyLoader {
    path: Option<PathBuf>,
    options: LoaderOptions,
    listener: Option<Arc<dyn LoaderListener>>,
    triangulator: Arc<dyn Triangulate>,
    session: Arc<AtomicBool>,
}

impl PlyLoader {
    pub fn new() -> Self {
        Self {
            path: None,
            options: LoaderOptions::default(),
            listener: None,
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

    /// Swap the triangulator used for polygons with more than 3 corners.
    pub fn set_triangulator(&mut self, triangulator: Arc<dyn Triangulate>) {
        self.triangulator = triangulator;
    }

    /// Cheap magic check: does the attached file start with a `ply` line?
    pub fn is_valid_file(&self) -> Result<bool, LoadError> {
        let path = self.path.as_ref().ok_or(LoadError::NotReady)?;
        let mut reader = ByteReader::new(File::open(path)?);
        Ok(reader.read_line().map(|line| line == "ply").unwrap_or(false))
    }

    /// Begin a loading session. Fails with [`LoadError::Locked`] while a
    /// previous session's iterator is still alive.
    pub fn load(&mut self) -> Result<PlyChunks<File>, LoadError> {
        let path = self.path.as_ref().ok_or(LoadError::NotReady)?;
        let lock = SessionLock::acquire(&self.session)?;
        let file = File::open(path)?;
        PlyChunks::with_session(
            file,
            self.options,
            self.triangulator.clone(),
            self.listener.clone(),
            Some(lock),
        )
    }
}

impl Default for PlyLoader {
    fn default() -> Self {
        Self::new()
    }
}
