//! STL loading (ASCII and binary variants).
//!
//! The variant is sniffed from the first five bytes: a case-insensitive
//! `solid` means ASCII, anything else binary. Both variants stream
//! triangles through the shared chunk packer, so the iterator contract and
//! options match the PLY loader; every triangle carries its facet normal
//! on all three vertices and there is no color data.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use byteorder::LittleEndian;

use crate::chunk::{ChunkBuilder, DataChunk, PendingVertex};
use crate::loader::{LoaderListener, LoaderOptions, ProgressNotifier, SessionLock};
use crate::reader::ByteReader;
use crate::LoadError;

const BINARY_HEADER_LEN: u64 = 80;
const BINARY_TRIANGLE_LEN: u64 = 50;

pub struct StlLoader {
    path: Option<PathBuf>,
    options: LoaderOptions,
    listener: Option<Arc<dyn LoaderListener>>,
    session: Arc<AtomicBool>,
}

impl StlLoader {
    pub fn new() -> Self {
        Self {
            path: None,
            options: LoaderOptions::default(),
            listener: None,
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

    /// Sniff the attached file: an ASCII `solid` opener is valid, a binary
    /// file is valid when its length matches the declared triangle count.
    pub fn is_valid_file(&self) -> Result<bool, LoadError> {
        let path = self.path.as_ref().ok_or(LoadError::NotReady)?;
        let mut reader = ByteReader::new(File::open(path)?);
        if sniff_ascii(&mut reader)? {
            return Ok(true);
        }
        let len = reader.stream_len()?;
        if len < BINARY_HEADER_LEN + 4 {
            return Ok(false);
        }
        reader.seek(BINARY_HEADER_LEN)?;
        let count = reader.read_u32::<LittleEndian>()? as u64;
        Ok(len == BINARY_HEADER_LEN + 4 + count * BINARY_TRIANGLE_LEN)
    }

    pub fn load(&mut self) -> Result<StlChunks<File>, LoadError> {
        let path = self.path.as_ref().ok_or(LoadError::NotReady)?;
        let lock = SessionLock::acquire(&self.session)?;
        let file = File::open(path)?;
        StlChunks::with_session(file, self.options, self.listener.clone(), Some(lock))
    }
}

impl Default for StlLoader {
    fn default() -> Self {
        Self::new()
    }
}

enum StlVariant {
    Binary {
        triangle_count: u64,
        current_triangle: u64,
    },
    Ascii {
        finished: bool,
        pending_word: Option<String>,
        stream_len: u64,
    },
}

pub struct StlChunks<R: Read + Seek> {
    reader: Option<ByteReader<R>>,
    variant: StlVariant,
    builder: ChunkBuilder,
    pending: PendingVertex,
    notifier: ProgressNotifier,
    lock: Option<SessionLock>,
    next_original: i64,
}

impl<R: Read + Seek> StlChunks<R> {
    pub fn new(source: R, options: LoaderOptions) -> Result<Self, LoadError> {
        Self::with_session(source, options, None, None)
    }

    pub(crate) fn with_session(
        source: R,
        options: LoaderOptions,
        listener: Option<Arc<dyn LoaderListener>>,
        lock: Option<SessionLock>,
    ) -> Result<Self, LoadError> {
        let mut reader = ByteReader::new(source);

        let variant = if sniff_ascii(&mut reader)? {
            let stream_len = reader.stream_len()?;
            // Consume the `solid <name>` opener.
            expect_keyword(&reader.next_word()?, "solid")?;
            reader.read_line()?;
            StlVariant::Ascii {
                finished: false,
                pending_word: None,
                stream_len,
            }
        } else {
            reader.seek(BINARY_HEADER_LEN)?;
            let triangle_count = reader.read_u32::<LittleEndian>()? as u64;
            log::debug!("binary stl with {triangle_count} triangles");
            StlVariant::Binary {
                triangle_count,
                current_triangle: 0,
            }
        };

        // A triangle must always fit, so the chunk cap never drops below 3.
        let builder = ChunkBuilder::new(
            options.max_vertices_per_chunk.max(3),
            0,
            true,
            !options.allow_duplicate_vertices,
        );
        let notifier = ProgressNotifier::new(listener, options.progress_delta);
        notifier.start();

        let mut chunks = Self {
            reader: Some(reader),
            variant,
            builder,
            pending: PendingVertex::default(),
            notifier,
            lock,
            next_original: 0,
        };
        chunks.ascii_peek_end().map_err(map_truncation)?;
        if !chunks.has_next() {
            chunks.finish_session();
        }
        Ok(chunks)
    }

    pub fn has_next(&self) -> bool {
        match &self.variant {
            StlVariant::Binary {
                triangle_count,
                current_triangle,
            } => current_triangle < triangle_count,
            StlVariant::Ascii { finished, .. } => !finished,
        }
    }

    pub fn next_chunk(&mut self) -> Result<DataChunk, LoadError> {
        if !self.has_next() || self.reader.is_none() {
            return Err(LoadError::NotAvailable);
        }
        let result = match self.variant {
            StlVariant::Binary { .. } => self.fill_binary_chunk(),
            StlVariant::Ascii { .. } => self.fill_ascii_chunk(),
        };
        match result {
            Ok(chunk) => {
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

    fn fill_binary_chunk(&mut self) -> Result<DataChunk, LoadError> {
        self.builder.begin();
        let capacity = self.builder.capacity();
        let reader = self.reader.as_mut().expect("session is live");
        let StlVariant::Binary {
            triangle_count,
            current_triangle,
        } = &mut self.variant
        else {
            unreachable!()
        };

        while *current_triangle < *triangle_count
            && self.builder.vertex_count() + 3 <= capacity
        {
            let nx = reader.read_f32::<LittleEndian>()?;
            let ny = reader.read_f32::<LittleEndian>()?;
            let nz = reader.read_f32::<LittleEndian>()?;
            self.pending.nx = nx;
            self.pending.ny = ny;
            self.pending.nz = nz;
            for _ in 0..3 {
                self.pending.x = reader.read_f32::<LittleEndian>()?;
                self.pending.y = reader.read_f32::<LittleEndian>()?;
                self.pending.z = reader.read_f32::<LittleEndian>()?;
                self.pending.index = self.next_original;
                self.next_original += 1;
                self.builder.add_new_vertex(&self.pending);
            }
            // Attribute byte count; carries no geometry.
            reader.read_u16::<LittleEndian>()?;
            *current_triangle += 1;
            self.notifier
                .progress(*current_triangle as f32 / *triangle_count as f32);
        }

        Ok(self.builder.finish())
    }

    fn fill_ascii_chunk(&mut self) -> Result<DataChunk, LoadError> {
        self.builder.begin();
        let capacity = self.builder.capacity();

        loop {
            {
                let StlVariant::Ascii { finished, .. } = &self.variant else {
                    unreachable!()
                };
                if *finished || self.builder.vertex_count() + 3 > capacity {
                    break;
                }
            }
            self.read_ascii_facet()?;
            self.ascii_peek_end()?;

            let reader = self.reader.as_mut().expect("session is live");
            let StlVariant::Ascii { stream_len, .. } = &self.variant else {
                unreachable!()
            };
            if *stream_len > 0 {
                self.notifier
                    .progress(reader.position() as f32 / *stream_len as f32);
            }
        }

        Ok(self.builder.finish())
    }

    /// Parse one `facet ... endfacet` block and pack its three vertices.
    fn read_ascii_facet(&mut self) -> Result<(), LoadError> {
        let reader = self.reader.as_mut().expect("session is live");
        let StlVariant::Ascii { pending_word, .. } = &mut self.variant else {
            unreachable!()
        };

        let facet = match pending_word.take() {
            Some(word) => word,
            None => reader.next_word()?,
        };
        expect_keyword(&facet, "facet")?;
        expect_keyword(&reader.next_word()?, "normal")?;
        self.pending.nx = parse_f32(&reader.next_word()?)?;
        self.pending.ny = parse_f32(&reader.next_word()?)?;
        self.pending.nz = parse_f32(&reader.next_word()?)?;
        expect_keyword(&reader.next_word()?, "outer")?;
        expect_keyword(&reader.next_word()?, "loop")?;
        for _ in 0..3 {
            expect_keyword(&reader.next_word()?, "vertex")?;
            self.pending.x = parse_f32(&reader.next_word()?)?;
            self.pending.y = parse_f32(&reader.next_word()?)?;
            self.pending.z = parse_f32(&reader.next_word()?)?;
            self.pending.index = self.next_original;
            self.next_original += 1;
            self.builder.add_new_vertex(&self.pending);
        }
        expect_keyword(&reader.next_word()?, "endloop")?;
        expect_keyword(&reader.next_word()?, "endfacet")?;
        Ok(())
    }

    /// Look one token ahead so `has_next` is exact: `endsolid` (or a clean
    /// EOF right after it) marks the solid as finished.
    fn ascii_peek_end(&mut self) -> Result<(), LoadError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(());
        };
        let StlVariant::Ascii {
            finished,
            pending_word,
            ..
        } = &mut self.variant
        else {
            return Ok(());
        };
        if *finished || pending_word.is_some() {
            return Ok(());
        }
        let word = reader.next_word()?;
        if word.eq_ignore_ascii_case("endsolid") {
            *finished = true;
        } else {
            *pending_word = Some(word);
        }
        Ok(())
    }

    fn finish_session(&mut self) {
        if self.reader.take().is_some() {
            self.notifier.end();
        }
        self.lock = None;
    }

    fn abort_session(&mut self) {
        match &mut self.variant {
            StlVariant::Binary {
                triangle_count,
                current_triangle,
            } => *current_triangle = *triangle_count,
            StlVariant::Ascii { finished, .. } => *finished = true,
        }
        self.reader = None;
        self.lock = None;
    }
}

impl<R: Read + Seek> Iterator for StlChunks<R> {
    type Item = Result<DataChunk, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.has_next() {
            return None;
        }
        Some(self.next_chunk())
    }
}

/// Case-insensitive `solid` sniff over the first five bytes. Does not
/// consume them.
fn sniff_ascii<R: Read + Seek>(reader: &mut ByteReader<R>) -> Result<bool, LoadError> {
    let head = reader.peek(5)?;
    Ok(head.len() == 5 && head.eq_ignore_ascii_case(b"solid"))
}

fn expect_keyword(word: &str, expected: &str) -> Result<(), LoadError> {
    if word.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(LoadError::corrupt(format!(
            "expected '{expected}', found '{word}'"
        )))
    }
}

fn parse_f32(word: &str) -> Result<f32, LoadError> {
    word.parse::<f32>()
        .map_err(|_| LoadError::corrupt(format!("cannot parse '{word}' as float")))
}

fn map_truncation(err: LoadError) -> LoadError {
    match err {
        LoadError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            LoadError::corrupt("stream ended before the declared triangle count")
        }
        other => other,
    }
}
