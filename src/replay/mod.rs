//! Replay layer: per-file streams and the cross-stream merge engine
//!
//! [`stream::LogStream`] owns one file's index and cursor; [`engine::ReplayEngine`]
//! owns a set of streams and merges them into a single chronological event
//! stream that can be seeked, scrubbed in either direction, filtered, and
//! exported.

pub mod engine;
pub mod heap;
pub mod stream;

pub use engine::{Direction, EngineStats, ReplayEngine};
pub use stream::{IndexEntry, LogStream, INDEX_COMPLETE};
