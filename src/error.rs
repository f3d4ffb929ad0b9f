use thiserror::Error;

/// Errors reported by the mesh loaders and their chunk iterators.
#[derive(Error, Debug)]
pub enum LoadError {
    /// `load()` was called before a file was attached to the loader.
    #[error("no file attached to the loader")]
    NotReady,

    /// `load()` was called while a previous session is still active.
    #[error("a loading session is already active")]
    Locked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file violates its format: bad header grammar, unknown data
    /// types, impossible list lengths, indices past the declared vertex
    /// count, or truncated binary data.
    #[error("corrupt data: {0}")]
    CorruptData(String),

    /// `next_chunk()` was called on a drained or terminated iterator.
    #[error("no more chunks available")]
    NotAvailable,
}

impl LoadError {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        LoadError::CorruptData(msg.into())
    }
}
