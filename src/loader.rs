//! Configuration and session plumbing shared by the format loaders.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::LoadError;

/// Tuning knobs for a loading session.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LoaderOptions {
    /// Hard cap on vertices per emitted chunk. The default keeps indices
    /// inside the 16-bit range graphics APIs favor.
    pub max_vertices_per_chunk: usize,
    /// When `true` (the default), repeated vertex references within one
    /// chunk produce duplicate rows instead of paying for a dedup lookup
    /// on every index.
    pub allow_duplicate_vertices: bool,
    /// Cap on the ASCII fetcher's index-to-position checkpoint map.
    pub max_stream_positions: usize,
    /// Minimum progress fraction between listener notifications, in (0, 1].
    pub progress_delta: f32,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            max_vertices_per_chunk: 65_535,
            allow_duplicate_vertices: true,
            max_stream_positions: 1_000_000,
            progress_delta: 0.01,
        }
    }
}

/// Advisory callbacks fired over the lifetime of a loading session.
///
/// All methods default to no-ops; implement only what you observe.
pub trait LoaderListener {
    fn on_load_start(&self) {}
    fn on_load_progress(&self, _progress: f32) {}
    fn on_load_end(&self) {}
}

/// RAII guard for the loader's session lock. Constructed by `load()`,
/// released when the chunk iterator is drained or dropped.
pub(crate) struct SessionLock {
    flag: Arc<AtomicBool>,
}

impl SessionLock {
    pub fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, LoadError> {
        if flag.swap(true, Ordering::Acquire) {
            return Err(LoadError::Locked);
        }
        Ok(Self { flag: flag.clone() })
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Coalesces progress callbacks so the listener fires at most once per
/// `progress_delta` step.
pub(crate) struct ProgressNotifier {
    listener: Option<Arc<dyn LoaderListener>>,
    delta: f32,
    last: f32,
}

impl ProgressNotifier {
    pub fn new(listener: Option<Arc<dyn LoaderListener>>, delta: f32) -> Self {
        Self {
            listener,
            delta,
            last: 0.0,
        }
    }

    pub fn start(&self) {
        if let Some(listener) = &self.listener {
            listener.on_load_start();
        }
    }

    pub fn progress(&mut self, fraction: f32) {
        let Some(listener) = &self.listener else {
            return;
        };
        // The 100% notification always goes out, whatever the step left.
        let completed = fraction >= 1.0 && self.last < 1.0;
        if completed || fraction - self.last >= self.delta {
            self.last = fraction.min(1.0);
            listener.on_load_progress(fraction.clamp(0.0, 1.0));
        }
    }

    pub fn end(&self) {
        if let Some(listener) = &self.listener {
            listener.on_load_end();
        }
    }
}
