//! One log file's indexed, cursor-bearing view
//!
//! A [`LogStream`] owns the per-file index and a single movable cursor. The
//! index is built lazily in chunks so the caller can interleave other work;
//! once complete it is never mutated. Record bodies are never touched during
//! indexing or stepping — only the record that a step actually stops on is
//! decoded, and only when the caller asks for it.

use crate::config::ReplayConfig;
use crate::error::{FlashbackError, Result};
use crate::log::codec::LogReader;
use crate::log::record::{
    EventKey, Record, RecordHeader, Timestamp, TIMESTAMP_MAX, TIMESTAMP_MIN,
};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Indexing progress is complete
pub const INDEX_COMPLETE: u8 = 100;

/// One entry in a stream's index: a record's timestamp and its byte offset
/// in the file.
///
/// Entries are appended in file order. Timestamps are non-decreasing but may
/// tie; traversal is stable on ties without imposing a further tiebreak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Record timestamp
    pub timestamp: Timestamp,
    /// Byte offset of the record start
    pub offset: u64,
}

/// Cursor position within a stream's index.
///
/// The two out-of-range states are distinct so that an exhausted cursor can
/// report the sentinel matching the direction it ran off in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    BeforeStart,
    At(usize),
    PastEnd,
}

/// Opaque saved cursor position, for exact save/restore around prefetch and
/// cut export.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SavedCursor(Cursor);

/// One log file's indexed, cursor-bearing view.
pub struct LogStream {
    path: PathBuf,
    reader: LogReader,
    index: Vec<IndexEntry>,
    catalog: BTreeMap<String, BTreeSet<String>>,
    excluded: HashSet<EventKey>,
    cursor: Cursor,
    /// Header at the cursor, cached so exclusion checks never re-read the file
    current: Option<RecordHeader>,
    /// Engine start time, subtracted for display-relative times
    time_offset: Timestamp,
    indexed: bool,
    chunk_size: usize,
    clock_skew_tolerance_ms: i64,
}

impl LogStream {
    /// Open a log file for indexing. The stream is not usable for playback
    /// until [`index`](Self::index) reports completion.
    pub fn open(path: impl AsRef<Path>, config: &ReplayConfig) -> Result<Self> {
        let path = path.as_ref();
        let reader = LogReader::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            index: Vec::new(),
            catalog: BTreeMap::new(),
            excluded: HashSet::new(),
            cursor: Cursor::BeforeStart,
            current: None,
            time_offset: 0,
            indexed: false,
            chunk_size: config.index_chunk_size.max(1),
            clock_skew_tolerance_ms: config.clock_skew_tolerance_ms,
        })
    }

    /// Path of the underlying log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether indexing has completed
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// Number of records in the index so far
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check whether the index holds no records yet
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Parse one chunk of records into the index.
    ///
    /// Records are visited header-only; bodies are skipped. Returns progress
    /// as a percentage; the caller re-invokes until it reports
    /// [`INDEX_COMPLETE`]. Safe to call again after completion.
    ///
    /// Fails with `EmptyLog` if the file holds zero records, or
    /// `FutureEndTime` if the file's last record is newer than the wall
    /// clock (clock skew on the recording host). Either failure is fatal to
    /// this one file.
    pub fn index(&mut self) -> Result<u8> {
        if self.indexed {
            return Ok(INDEX_COMPLETE);
        }

        for _ in 0..self.chunk_size {
            let offset = self.reader.position();
            match self.reader.read_header()? {
                Some(header) => {
                    self.index.push(IndexEntry {
                        timestamp: header.timestamp,
                        offset,
                    });
                    self.catalog
                        .entry(header.domain)
                        .or_default()
                        .insert(header.kind);
                    self.reader.skip_body()?;
                }
                None => return self.finish_indexing(),
            }
        }

        Ok(self.estimate_progress())
    }

    fn finish_indexing(&mut self) -> Result<u8> {
        let last = match self.index.last() {
            Some(entry) => entry.timestamp,
            None => return Err(FlashbackError::EmptyLog(self.path.clone())),
        };
        let now = chrono::Utc::now().timestamp_millis();
        if last > now + self.clock_skew_tolerance_ms {
            return Err(FlashbackError::FutureEndTime {
                path: self.path.clone(),
                last,
                now,
            });
        }

        self.indexed = true;
        self.cursor = Cursor::At(0);
        self.current = Some(self.header_at(0)?);
        debug!(
            path = %self.path.display(),
            records = self.index.len(),
            first = self.index[0].timestamp,
            last,
            "log indexed"
        );
        Ok(INDEX_COMPLETE)
    }

    fn estimate_progress(&self) -> u8 {
        let pct = match self.reader.record_count() {
            Some(count) if count > 0 => self.index.len() as u64 * 100 / count,
            // Unfinalized log: estimate from byte position
            _ => self.reader.position() * 100 / self.reader.file_size().max(1),
        };
        pct.min(99) as u8
    }

    /// Timestamp at the cursor, or the matching sentinel when the cursor has
    /// run off either end.
    pub fn cursor_time(&self) -> Timestamp {
        match self.cursor {
            Cursor::BeforeStart => TIMESTAMP_MIN,
            Cursor::PastEnd => TIMESTAMP_MAX,
            Cursor::At(i) => self.index[i].timestamp,
        }
    }

    /// Cursor time relative to the engine start time
    pub fn display_time(&self) -> Timestamp {
        self.cursor_time().saturating_sub(self.time_offset)
    }

    /// Set the display-time offset (the engine's start time)
    pub fn set_time_offset(&mut self, offset: Timestamp) {
        self.time_offset = offset;
    }

    /// Timestamp of the first record, once indexed
    pub fn first_time(&self) -> Option<Timestamp> {
        self.indexed.then(|| self.index[0].timestamp)
    }

    /// Timestamp of the last record, once indexed
    pub fn last_time(&self) -> Option<Timestamp> {
        if !self.indexed {
            return None;
        }
        self.index.last().map(|e| e.timestamp)
    }

    /// Every (domain, kind) pair seen in the file. Reflects file contents,
    /// not the exclusion filter.
    pub fn event_catalog(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.catalog
    }

    /// Place the cursor on the first record with `timestamp >= t`, or past
    /// the end if no such record exists. O(log n) over the index.
    pub fn seek(&mut self, t: Timestamp) -> Result<()> {
        if !self.indexed {
            return Ok(());
        }
        let i = self.index.partition_point(|e| e.timestamp < t);
        if i == self.index.len() {
            self.cursor = Cursor::PastEnd;
            self.current = None;
        } else {
            self.cursor = Cursor::At(i);
            self.current = Some(self.header_at(i)?);
        }
        trace!(path = %self.path.display(), t, "seek");
        Ok(())
    }

    /// Advance the cursor by one non-excluded record.
    ///
    /// Excluded records cost one header read each and are stepped over
    /// silently. Returns `false` once the cursor runs past the end.
    pub fn step_forward(&mut self) -> Result<bool> {
        if !self.indexed {
            return Ok(false);
        }
        loop {
            let next = match self.cursor {
                Cursor::BeforeStart => 0,
                Cursor::At(i) => i + 1,
                Cursor::PastEnd => return Ok(false),
            };
            if next >= self.index.len() {
                self.cursor = Cursor::PastEnd;
                self.current = None;
                return Ok(false);
            }
            self.cursor = Cursor::At(next);
            let header = self.header_at(next)?;
            let excluded = self.is_excluded(&header);
            self.current = Some(header);
            if !excluded {
                return Ok(true);
            }
        }
    }

    /// Move the cursor back by one non-excluded record.
    ///
    /// Returns `false` once the cursor runs before the start.
    pub fn step_backward(&mut self) -> Result<bool> {
        if !self.indexed {
            return Ok(false);
        }
        loop {
            let next = match self.cursor {
                Cursor::PastEnd if self.index.is_empty() => return Ok(false),
                Cursor::PastEnd => self.index.len() - 1,
                Cursor::At(0) | Cursor::BeforeStart => {
                    self.cursor = Cursor::BeforeStart;
                    self.current = None;
                    return Ok(false);
                }
                Cursor::At(i) => i - 1,
            };
            self.cursor = Cursor::At(next);
            let header = self.header_at(next)?;
            let excluded = self.is_excluded(&header);
            self.current = Some(header);
            if !excluded {
                return Ok(true);
            }
        }
    }

    /// Step backward until the cursor time is strictly before `t`, or the
    /// stream is exhausted. Used only when reversing play direction, to
    /// resynchronize a stream that may sit exactly on the pivot timestamp.
    pub fn assert_before(&mut self, t: Timestamp) -> Result<()> {
        while self.cursor_time() >= t {
            if !self.step_backward()? {
                break;
            }
        }
        Ok(())
    }

    /// Step forward until the cursor time is strictly after `t`, or the
    /// stream is exhausted. Counterpart of [`assert_before`](Self::assert_before).
    pub fn assert_after(&mut self, t: Timestamp) -> Result<()> {
        while self.cursor_time() <= t {
            if !self.step_forward()? {
                break;
            }
        }
        Ok(())
    }

    /// Header of the record at the cursor, if the cursor is on a record.
    pub fn current_header(&self) -> Option<&RecordHeader> {
        self.current.as_ref()
    }

    /// Whether the record at the cursor is excluded under the current filter.
    ///
    /// Exclusion is revalidated lazily: changing the filter does not move the
    /// cursor, so a cursor can sit on a newly-excluded record until the next
    /// step. Emission paths check this before decoding.
    pub fn current_is_excluded(&self) -> bool {
        match &self.current {
            Some(header) => self.is_excluded(header),
            None => false,
        }
    }

    /// Fully decode the record at the cursor (header and body).
    ///
    /// The cursor must be on a record; body decode is deferred to this call
    /// so that skipping ahead through long excluded runs stays cheap.
    pub fn current_record(&mut self) -> Result<Record> {
        let (i, header) = match (self.cursor, &self.current) {
            (Cursor::At(i), Some(header)) => (i, header.clone()),
            _ => {
                return Err(FlashbackError::Log(format!(
                    "{}: cursor is not on a record",
                    self.path.display()
                )))
            }
        };
        self.reader.seek_to(self.index[i].offset)?;
        match self.reader.read_header()? {
            Some(_) => self.reader.decode_body(header),
            None => Err(FlashbackError::Truncated {
                path: self.path.clone(),
                offset: self.index[i].offset,
            }),
        }
    }

    /// Add a (domain, kind) pair to the exclusion filter. Does not move the
    /// cursor; the effect is observed on the next step.
    pub fn set_exclude(&mut self, key: EventKey) {
        self.excluded.insert(key);
    }

    /// Remove a (domain, kind) pair from the exclusion filter.
    pub fn clear_exclude(&mut self, key: &EventKey) {
        self.excluded.remove(key);
    }

    fn is_excluded(&self, header: &RecordHeader) -> bool {
        self.excluded.iter().any(|key| header.matches(key))
    }

    fn header_at(&mut self, i: usize) -> Result<RecordHeader> {
        self.reader.seek_to(self.index[i].offset)?;
        match self.reader.read_header()? {
            Some(header) => Ok(header),
            None => Err(FlashbackError::Truncated {
                path: self.path.clone(),
                offset: self.index[i].offset,
            }),
        }
    }

    pub(crate) fn save_cursor(&self) -> SavedCursor {
        SavedCursor(self.cursor)
    }

    pub(crate) fn restore_cursor(&mut self, saved: SavedCursor) -> Result<()> {
        self.cursor = saved.0;
        self.current = match self.cursor {
            Cursor::At(i) => Some(self.header_at(i)?),
            _ => None,
        };
        Ok(())
    }
}

impl std::fmt::Debug for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStream")
            .field("path", &self.path)
            .field("records", &self.index.len())
            .field("indexed", &self.indexed)
            .field("cursor", &self.cursor)
            .finish()
    }
}
