//! Configuration for the replay core
//!
//! Configuration is plain data passed in at construction; there is no global
//! or process-wide state. Defaults are suitable for interactive use where the
//! caller interleaves indexing with UI work.

use serde::{Deserialize, Serialize};

/// Default number of records indexed per [`index`] call.
///
/// Indexing is chunked so a UI event loop can interleave redraws; one chunk
/// of header parsing takes well under a frame on ordinary hardware.
///
/// [`index`]: crate::replay::stream::LogStream::index
pub const DEFAULT_INDEX_CHUNK_SIZE: usize = 2048;

/// Default cap on records returned by a single prefetch window.
pub const DEFAULT_MAX_PREFETCH: usize = 10_000;

/// Configuration for [`ReplayEngine`](crate::replay::engine::ReplayEngine)
/// and the streams it owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Records indexed per `index()` call before yielding back to the caller.
    pub index_chunk_size: usize,

    /// Tolerance in milliseconds before a log whose last record is newer than
    /// the wall clock is rejected with `FutureEndTime`. Guards against clock
    /// skew on the recording host.
    pub clock_skew_tolerance_ms: i64,

    /// Upper bound on records collected by one `prefetch_window` call.
    pub max_prefetch: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            index_chunk_size: DEFAULT_INDEX_CHUNK_SIZE,
            clock_skew_tolerance_ms: 0,
            max_prefetch: DEFAULT_MAX_PREFETCH,
        }
    }
}
