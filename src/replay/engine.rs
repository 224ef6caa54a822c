//! Chronological multi-stream replay engine
//!
//! Merges N independently recorded log files into one globally time-ordered
//! event stream, steerable forward or backward, seekable, and exportable.
//!
//! Features:
//! - Cross-stream chronological merge via a binary heap keyed by cursor time
//! - Direct seek to an arbitrary time across all streams
//! - Bidirectional playback with pivot resynchronization on direction flips
//! - (domain, kind) exclusion filtering without losing global order
//! - Cut-window export of any sub-interval into a standalone merged log
//! - Windowed prefetch that leaves the playback position untouched
//!
//! The engine is single-threaded and cooperative: no internal threads, no
//! blocking beyond ordinary file reads, and indexing is chunked so a UI
//! event loop can interleave redraws.

use crate::config::ReplayConfig;
use crate::error::{FlashbackError, Result};
use crate::log::codec::RecordSink;
use crate::log::record::{EventKey, Record, Timestamp, TIMESTAMP_MAX, TIMESTAMP_MIN};
use crate::replay::heap::{HeapEntry, HeapOrder, ReplayHeap};
use crate::replay::stream::{LogStream, SavedCursor, INDEX_COMPLETE};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

/// Playback direction.
///
/// Determines the heap comparator and the single-step semantics. Transitions
/// happen only through [`ReplayEngine::play_forward`] and
/// [`ReplayEngine::play_backward`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
}

/// Counters for engine activity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStats {
    /// Records emitted by play operations
    pub records_emitted: u64,
    /// Global seeks performed
    pub seeks: u64,
    /// Direction reversals
    pub direction_flips: u64,
    /// Cut windows exported
    pub cuts_saved: u64,
    /// Files dropped after indexing failures
    pub files_dropped: u64,
}

/// Chronological replay engine over a set of [`LogStream`]s.
pub struct ReplayEngine {
    streams: Vec<LogStream>,
    heap: ReplayHeap,
    direction: Direction,
    start_time: Timestamp,
    end_time: Timestamp,
    cut_start: Timestamp,
    cut_end: Timestamp,
    /// Exclusions applied to every stream, including ones added later
    excluded: HashSet<EventKey>,
    config: ReplayConfig,
    stats: EngineStats,
}

impl ReplayEngine {
    /// Create a new engine with the given configuration.
    pub fn new(config: ReplayConfig) -> Self {
        info!(
            index_chunk = config.index_chunk_size,
            "initialising replay engine"
        );
        Self {
            streams: Vec::new(),
            heap: ReplayHeap::new(HeapOrder::Min),
            direction: Direction::Forward,
            start_time: 0,
            end_time: 0,
            cut_start: 0,
            cut_end: 0,
            excluded: HashSet::new(),
            config,
            stats: EngineStats::default(),
        }
    }

    /// Number of streams (indexed or not)
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Check whether the engine holds no streams
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Current playback direction
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Earliest record timestamp across all indexed streams
    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    /// Latest record timestamp across all indexed streams
    pub fn end_time(&self) -> Timestamp {
        self.end_time
    }

    /// Start of the cut window
    pub fn cut_start_time(&self) -> Timestamp {
        self.cut_start
    }

    /// End of the cut window
    pub fn cut_end_time(&self) -> Timestamp {
        self.cut_end
    }

    /// Snapshot of the engine counters
    pub fn stats(&self) -> EngineStats {
        self.stats.clone()
    }

    /// Add a log file. The new stream starts unindexed and must be driven to
    /// completion via [`index_step`](Self::index_step) before it joins
    /// playback. Exclusions already set on the engine apply to it.
    pub fn add_stream(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if self.streams.iter().any(|s| s.path() == path) {
            return Err(FlashbackError::Log(format!(
                "stream already added: {}",
                path.display()
            )));
        }
        let mut stream = LogStream::open(path, &self.config)?;
        for key in &self.excluded {
            stream.set_exclude(key.clone());
        }
        self.streams.push(stream);
        info!(path = %path.display(), "stream added");
        Ok(())
    }

    /// Remove a log file, recomputing the global bounds and resetting the cut
    /// window to the full remaining range.
    pub fn remove_stream(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let idx = self
            .streams
            .iter()
            .position(|s| s.path() == path)
            .ok_or_else(|| FlashbackError::NotFound(path.to_path_buf()))?;
        self.streams.remove(idx);
        self.recompute_bounds();
        self.rebuild_heap();
        info!(path = %path.display(), "stream removed");
        Ok(())
    }

    /// Drive one chunk of one stream's indexing.
    ///
    /// Returns progress as a percentage; call repeatedly until it reports
    /// completion, at which point the stream joins playback and the global
    /// bounds are recomputed. An indexing failure drops the file from the
    /// engine and surfaces the error; the engine keeps operating on the
    /// remaining streams.
    pub fn index_step(&mut self, path: impl AsRef<Path>) -> Result<u8> {
        let path = path.as_ref();
        let idx = self
            .streams
            .iter()
            .position(|s| s.path() == path)
            .ok_or_else(|| FlashbackError::NotFound(path.to_path_buf()))?;
        let was_indexed = self.streams[idx].is_indexed();
        match self.streams[idx].index() {
            Ok(progress) => {
                if progress == INDEX_COMPLETE && !was_indexed {
                    self.recompute_bounds();
                    self.rebuild_heap();
                }
                Ok(progress)
            }
            Err(e) => {
                let dropped = self.streams.remove(idx);
                self.recompute_bounds();
                self.rebuild_heap();
                self.stats.files_dropped += 1;
                warn!(
                    path = %dropped.path().display(),
                    error = %e,
                    "log failed to index, dropped from engine"
                );
                Err(e)
            }
        }
    }

    /// Place every stream's cursor on the first record with
    /// `timestamp >= t`, then restore the merge order for the current
    /// direction.
    pub fn seek(&mut self, t: Timestamp) -> Result<()> {
        if self.streams.is_empty() {
            debug!("seek with no streams");
            return Ok(());
        }
        self.seek_streams(t)?;
        self.rebuild_heap();
        self.stats.seeks += 1;
        Ok(())
    }

    /// Switch playback to forward.
    ///
    /// Every stream except the current heap root is resynchronized strictly
    /// after the pivot (the root's cursor time before the transition), then
    /// the heap is rebuilt with the forward comparator. A stream parked
    /// mid-file under backward play may sit exactly on, or adjacent to,
    /// records that forward play must not re-emit.
    pub fn play_forward(&mut self) -> Result<()> {
        if self.direction == Direction::Forward {
            return Ok(());
        }
        if let Some(root) = self.heap.peek() {
            let pivot = root.time;
            for (i, stream) in self.streams.iter_mut().enumerate() {
                if i == root.stream || !stream.is_indexed() {
                    continue;
                }
                stream.assert_after(pivot)?;
            }
        }
        self.direction = Direction::Forward;
        self.rebuild_heap();
        self.stats.direction_flips += 1;
        debug!("play direction set to forward");
        Ok(())
    }

    /// Switch playback to backward. Counterpart of
    /// [`play_forward`](Self::play_forward), resynchronizing non-root
    /// streams strictly before the pivot.
    pub fn play_backward(&mut self) -> Result<()> {
        if self.direction == Direction::Backward {
            return Ok(());
        }
        if let Some(root) = self.heap.peek() {
            let pivot = root.time;
            for (i, stream) in self.streams.iter_mut().enumerate() {
                if i == root.stream || !stream.is_indexed() {
                    continue;
                }
                stream.assert_before(pivot)?;
            }
        }
        self.direction = Direction::Backward;
        self.rebuild_heap();
        self.stats.direction_flips += 1;
        debug!("play direction set to backward");
        Ok(())
    }

    /// Emit records in global time order until the next record would be
    /// later than `target` or the cut end.
    ///
    /// Forward only; a no-op (empty) while playing backward, with zero
    /// streams, or when the cursor is already past the cut end.
    pub fn play_to(&mut self, target: Timestamp) -> Result<Vec<Record>> {
        let mut emitted = Vec::new();
        if self.direction != Direction::Forward {
            warn!("play_to ignored while playing backward");
            return Ok(emitted);
        }
        if self.streams.is_empty() {
            debug!("play_to with no streams");
            return Ok(emitted);
        }
        let limit = target.min(self.cut_end);
        while let Some(record) = self.pump_forward(limit)? {
            emitted.push(record);
        }
        self.stats.records_emitted += emitted.len() as u64;
        Ok(emitted)
    }

    /// Emit the single next record in reverse time order.
    ///
    /// Backward only; `None` while playing forward, with zero streams, or
    /// once the cursor reaches the cut start. Backward replay is always
    /// single-stepped by the caller; there is deliberately no backward
    /// counterpart of [`play_to`](Self::play_to).
    pub fn play_back_one(&mut self) -> Result<Option<Record>> {
        if self.direction != Direction::Backward {
            warn!("play_back_one ignored while playing forward");
            return Ok(None);
        }
        let record = self.pump_backward(self.cut_start)?;
        if record.is_some() {
            self.stats.records_emitted += 1;
        }
        Ok(record)
    }

    /// Collect up to `n` records in forward merge order starting at `t`,
    /// without disturbing the playback position.
    ///
    /// Used to materialize surrounding context for a UI. The global cursor
    /// state is saved before the walk and restored exactly afterwards.
    pub fn prefetch_window(&mut self, t: Timestamp, n: usize) -> Result<Vec<Record>> {
        if self.streams.is_empty() || n == 0 {
            return Ok(Vec::new());
        }
        let n = n.min(self.config.max_prefetch);
        let saved = self.save_cursors();
        let result = self.collect_window(t, n);
        self.restore_cursors(&saved)?;
        result
    }

    /// Set the cut-window start to the current global cursor time.
    ///
    /// Not validated against the cut end; calling the cut markers out of
    /// time order silently produces an empty window.
    pub fn cut_start_here(&mut self) {
        self.cut_start = self.global_cursor_time();
        debug!(cut_start = self.cut_start, "cut start set");
    }

    /// Set the cut-window end to the current global cursor time.
    pub fn cut_end_here(&mut self) {
        self.cut_end = self.global_cursor_time();
        debug!(cut_end = self.cut_end, "cut end set");
    }

    /// Reset the cut window to the full global range.
    pub fn cut_undo(&mut self) {
        self.cut_start = self.start_time;
        self.cut_end = self.end_time;
    }

    /// Export the cut window as a standalone merged log.
    ///
    /// Seeks to the cut start, streams every record with
    /// `cut_start <= timestamp <= cut_end` into the sink in forward merge
    /// order, then restores the pre-call cursor state. Returns the number of
    /// records written.
    pub fn save_cut<S: RecordSink>(&mut self, sink: &mut S) -> Result<u64> {
        if self.streams.is_empty() {
            debug!("save_cut with no streams");
            return Ok(0);
        }
        let saved = self.save_cursors();
        let result = self.export_window(sink);
        self.restore_cursors(&saved)?;
        let written = result?;
        self.stats.cuts_saved += 1;
        info!(
            written,
            from = self.cut_start,
            to = self.cut_end,
            "cut exported"
        );
        Ok(written)
    }

    /// Exclude a (domain, kind) pair from playback on every stream,
    /// including streams added later.
    pub fn set_exclude(&mut self, domain: &str, kind: &str) {
        let key = EventKey::new(domain, kind);
        for stream in &mut self.streams {
            stream.set_exclude(key.clone());
        }
        self.excluded.insert(key);
    }

    /// Remove a (domain, kind) pair from the exclusion filter.
    pub fn clear_exclude(&mut self, domain: &str, kind: &str) {
        let key = EventKey::new(domain, kind);
        for stream in &mut self.streams {
            stream.clear_exclude(&key);
        }
        self.excluded.remove(&key);
    }

    /// Timestamp of the next record in the current direction, or the global
    /// end time once every stream is exhausted (a sentinel fallback so UI
    /// progress bars do not overflow).
    pub fn global_cursor_time(&self) -> Timestamp {
        match self.heap.peek() {
            Some(e) if e.time != TIMESTAMP_MAX && e.time != TIMESTAMP_MIN => e.time,
            _ => self.end_time,
        }
    }

    /// Every (domain, kind) pair present in the indexed files, merged across
    /// streams. Reflects file contents, not the exclusion filter.
    pub fn event_catalog(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut merged: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for stream in &self.streams {
            for (domain, kinds) in stream.event_catalog() {
                merged
                    .entry(domain.clone())
                    .or_default()
                    .extend(kinds.iter().cloned());
            }
        }
        merged
    }

    // -----------------------------------------------------------------------
    // Merge internals
    // -----------------------------------------------------------------------

    /// Advance the forward merge by one emission.
    ///
    /// Streams parked on an opposite-end sentinel or on an excluded record
    /// are stepped over without emitting. Returns `None` when every stream
    /// is exhausted or the next record would be later than `limit`.
    fn pump_forward(&mut self, limit: Timestamp) -> Result<Option<Record>> {
        loop {
            let Some(root) = self.heap.peek() else {
                return Ok(None);
            };
            let t = root.time;
            if t == TIMESTAMP_MAX || t > limit {
                return Ok(None);
            }
            let stream = &mut self.streams[root.stream];
            if t == TIMESTAMP_MIN || stream.current_is_excluded() {
                stream.step_forward()?;
                let time = stream.cursor_time();
                self.heap.update_root(time);
                continue;
            }
            let record = stream.current_record()?;
            stream.step_forward()?;
            let time = stream.cursor_time();
            self.heap.update_root(time);
            return Ok(Some(record));
        }
    }

    /// Advance the backward merge by one emission. `limit` is exclusive:
    /// emission stops once the root reaches or passes it.
    fn pump_backward(&mut self, limit: Timestamp) -> Result<Option<Record>> {
        loop {
            let Some(root) = self.heap.peek() else {
                return Ok(None);
            };
            let t = root.time;
            if t == TIMESTAMP_MIN || t <= limit {
                return Ok(None);
            }
            let stream = &mut self.streams[root.stream];
            if t == TIMESTAMP_MAX || stream.current_is_excluded() {
                stream.step_backward()?;
                let time = stream.cursor_time();
                self.heap.update_root(time);
                continue;
            }
            let record = stream.current_record()?;
            stream.step_backward()?;
            let time = stream.cursor_time();
            self.heap.update_root(time);
            return Ok(Some(record));
        }
    }

    fn collect_window(&mut self, t: Timestamp, n: usize) -> Result<Vec<Record>> {
        self.seek_streams(t)?;
        self.rebuild_heap_for(HeapOrder::Min);
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            match self.pump_forward(TIMESTAMP_MAX)? {
                Some(record) => out.push(record),
                None => break,
            }
        }
        Ok(out)
    }

    fn export_window<S: RecordSink>(&mut self, sink: &mut S) -> Result<u64> {
        self.seek_streams(self.cut_start)?;
        self.rebuild_heap_for(HeapOrder::Min);
        let mut written = 0;
        while let Some(record) = self.pump_forward(self.cut_end)? {
            sink.append(&record)?;
            written += 1;
        }
        Ok(written)
    }

    fn seek_streams(&mut self, t: Timestamp) -> Result<()> {
        for stream in &mut self.streams {
            stream.seek(t)?;
        }
        Ok(())
    }

    fn save_cursors(&self) -> Vec<SavedCursor> {
        self.streams.iter().map(|s| s.save_cursor()).collect()
    }

    fn restore_cursors(&mut self, saved: &[SavedCursor]) -> Result<()> {
        for (stream, cursor) in self.streams.iter_mut().zip(saved) {
            stream.restore_cursor(*cursor)?;
        }
        self.rebuild_heap();
        Ok(())
    }

    fn rebuild_heap(&mut self) {
        let order = match self.direction {
            Direction::Forward => HeapOrder::Min,
            Direction::Backward => HeapOrder::Max,
        };
        self.rebuild_heap_for(order);
    }

    fn rebuild_heap_for(&mut self, order: HeapOrder) {
        let entries: Vec<HeapEntry> = self
            .streams
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_indexed())
            .map(|(i, s)| HeapEntry {
                time: s.cursor_time(),
                stream: i,
            })
            .collect();
        self.heap.rebuild(order, entries);
    }

    fn recompute_bounds(&mut self) {
        self.start_time = self
            .streams
            .iter()
            .filter_map(|s| s.first_time())
            .min()
            .unwrap_or(0);
        self.end_time = self
            .streams
            .iter()
            .filter_map(|s| s.last_time())
            .max()
            .unwrap_or(0);
        self.cut_start = self.start_time;
        self.cut_end = self.end_time;
        for stream in &mut self.streams {
            stream.set_time_offset(self.start_time);
        }
    }
}

impl Default for ReplayEngine {
    fn default() -> Self {
        Self::new(ReplayConfig::default())
    }
}

impl std::fmt::Debug for ReplayEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayEngine")
            .field("streams", &self.streams.len())
            .field("direction", &self.direction)
            .field("start_time", &self.start_time)
            .field("end_time", &self.end_time)
            .field("cut", &(self.cut_start, self.cut_end))
            .finish()
    }
}
