//! On-disk log format: pull-style reader and append-only writer
//!
//! # File Format
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Header (32 bytes)                       │
//! │   Magic: "FLBK" (4 bytes)               │
//! │   Version: u16                          │
//! │   Flags: u16                            │
//! │   Record Count: u64 (MAX = unknown)     │
//! │   Reserved: padding to 32 bytes         │
//! ├─────────────────────────────────────────┤
//! │ Record 1                                │
//! │   Timestamp: i64                        │
//! │   Domain: u16 length + UTF-8 bytes      │
//! │   Kind: u16 length + UTF-8 bytes        │
//! │   Name: u16 length + UTF-8 bytes        │
//! │   Body: u32 length + opaque bytes       │
//! │   CRC32: u32                            │
//! ├─────────────────────────────────────────┤
//! │ Record 2...N                            │
//! └─────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. The declared record count is backfilled by
//! the writer on finalize; a recorder that crashed mid-capture leaves the
//! unknown sentinel, in which case indexing progress falls back to byte
//! position.
//!
//! The reader is a pull API: `read_header` decodes the fixed header of the
//! next record and leaves the reader positioned at the body, which the caller
//! then either skips or decodes. This split is what makes exclusion filtering
//! cheap — excluded records cost one header parse and a relative seek.

use crate::error::{FlashbackError, Result};
use crate::log::record::{Record, RecordHeader, Timestamp};
use bytes::{BufMut, Bytes, BytesMut};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Magic bytes for log file header
const LOG_MAGIC: &[u8; 4] = b"FLBK";

/// Current log format version
const LOG_VERSION: u16 = 1;

/// Size of the log file header in bytes
pub const LOG_HEADER_SIZE: u64 = 32;

/// Byte offset of the declared record count within the header
const COUNT_OFFSET: u64 = 8;

/// Declared-count sentinel for a log that was never finalized
const COUNT_UNKNOWN: u64 = u64::MAX;

/// Append-only destination for replayed records.
///
/// This is the narrow seam the engine needs from the outside world: "append
/// one record at a given timestamp". [`LogWriter`] implements it for cut
/// export; a live-bus republisher would implement it on the transport side.
pub trait RecordSink {
    /// Append one record to the sink
    fn append(&mut self, record: &Record) -> Result<()>;
}

impl RecordSink for Vec<Record> {
    fn append(&mut self, record: &Record) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// Pull-style reader over one log file.
pub struct LogReader {
    path: PathBuf,
    reader: BufReader<File>,
    file_size: u64,
    declared_count: Option<u64>,
    /// Current byte position, tracked to avoid stream_position syscalls
    position: u64,
    /// Byte offset of the record whose header was read last
    record_start: u64,
    /// Body length of the pending record, set by read_header
    pending_body: Option<u32>,
}

impl LogReader {
    /// Open a log file and validate its header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FlashbackError::NotFound(path.to_path_buf())
            } else {
                FlashbackError::Io(e)
            }
        })?;
        let file_size = file.metadata()?.len();
        if file_size < LOG_HEADER_SIZE {
            return Err(FlashbackError::BadFormat(format!(
                "{}: {} bytes is smaller than the log header",
                path.display(),
                file_size
            )));
        }

        let mut reader = BufReader::new(file);
        let mut header = [0u8; LOG_HEADER_SIZE as usize];
        reader.read_exact(&mut header)?;

        if &header[0..4] != LOG_MAGIC {
            return Err(FlashbackError::BadFormat(format!(
                "{}: invalid log magic",
                path.display()
            )));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != LOG_VERSION {
            return Err(FlashbackError::BadFormat(format!(
                "{}: unsupported log version {}",
                path.display(),
                version
            )));
        }
        let count = u64::from_le_bytes(
            header[8..16]
                .try_into()
                .map_err(|_| FlashbackError::BadFormat("log header malformed".to_string()))?,
        );

        debug!(path = %path.display(), file_size, count, "opened log");

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            file_size,
            declared_count: (count != COUNT_UNKNOWN).then_some(count),
            position: LOG_HEADER_SIZE,
            record_start: LOG_HEADER_SIZE,
            pending_body: None,
        })
    }

    /// Declared record count, if the log was finalized.
    pub fn record_count(&self) -> Option<u64> {
        self.declared_count
    }

    /// Current byte position in the file.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the fixed header of the next record.
    ///
    /// Returns `None` at a clean end of file. On success the reader is
    /// positioned at the record body; the caller must follow up with either
    /// [`skip_body`](Self::skip_body) or [`decode_body`](Self::decode_body)
    /// before the next `read_header`.
    pub fn read_header(&mut self) -> Result<Option<RecordHeader>> {
        if self.position >= self.file_size {
            return Ok(None);
        }
        self.record_start = self.position;
        self.pending_body = None;

        let timestamp = Timestamp::from_le_bytes(self.read_array::<8>()?);
        let domain = self.read_string()?;
        let kind = self.read_string()?;
        let name = self.read_string()?;
        let body_len = u32::from_le_bytes(self.read_array::<4>()?);

        self.pending_body = Some(body_len);
        Ok(Some(RecordHeader {
            domain,
            kind,
            name,
            timestamp,
        }))
    }

    /// Skip the body (and trailing CRC) of the pending record without
    /// decoding it.
    pub fn skip_body(&mut self) -> Result<()> {
        let body_len = self.take_pending("skip_body")?;
        let skip = body_len as u64 + 4;
        self.reader.seek_relative(skip as i64)?;
        self.position += skip;
        if self.position > self.file_size {
            return Err(FlashbackError::Truncated {
                path: self.path.clone(),
                offset: self.record_start,
            });
        }
        Ok(())
    }

    /// Decode the body of the pending record and verify its CRC.
    pub fn decode_body(&mut self, header: RecordHeader) -> Result<Record> {
        let body_len = self.take_pending("decode_body")?;
        let mut body = vec![0u8; body_len as usize];
        self.read_bytes(&mut body)?;
        let stored_crc = u32::from_le_bytes(self.read_array::<4>()?);

        let record = Record::new(header, Bytes::from(body));
        if record.calculate_crc() != stored_crc {
            return Err(FlashbackError::CorruptedRecord {
                path: self.path.clone(),
                offset: self.record_start,
            });
        }
        Ok(record)
    }

    /// Reposition to a record start previously captured via
    /// [`position`](Self::position).
    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(offset))?;
        self.position = offset;
        self.record_start = offset;
        self.pending_body = None;
        Ok(())
    }

    fn take_pending(&mut self, op: &str) -> Result<u32> {
        self.pending_body
            .take()
            .ok_or_else(|| FlashbackError::Log(format!("{op} called with no pending record")))
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_bytes(&mut buf)?;
        Ok(buf)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                FlashbackError::Truncated {
                    path: self.path.clone(),
                    offset: self.record_start,
                }
            } else {
                FlashbackError::Io(e)
            }
        })?;
        self.position += buf.len() as u64;
        Ok(())
    }

    fn read_string(&mut self) -> Result<String> {
        let len = u16::from_le_bytes(self.read_array::<2>()?);
        let mut buf = vec![0u8; len as usize];
        self.read_bytes(&mut buf)?;
        String::from_utf8(buf).map_err(|_| {
            FlashbackError::BadFormat(format!(
                "{}: invalid UTF-8 in record header at byte {}",
                self.path.display(),
                self.record_start
            ))
        })
    }
}

impl std::fmt::Debug for LogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogReader")
            .field("path", &self.path)
            .field("file_size", &self.file_size)
            .field("declared_count", &self.declared_count)
            .field("position", &self.position)
            .finish()
    }
}

/// Append-only writer producing the same format [`LogReader`] consumes.
pub struct LogWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    records_written: u64,
}

impl LogWriter {
    /// Create a new log file, truncating any existing file at `path`.
    ///
    /// The header is written with an unknown record count; call
    /// [`finalize`](Self::finalize) to backfill it.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);

        let mut header = [0u8; LOG_HEADER_SIZE as usize];
        header[0..4].copy_from_slice(LOG_MAGIC);
        header[4..6].copy_from_slice(&LOG_VERSION.to_le_bytes());
        // header[6..8] flags, reserved
        header[8..16].copy_from_slice(&COUNT_UNKNOWN.to_le_bytes());
        writer.write_all(&header)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            records_written: 0,
        })
    }

    /// Number of records appended so far.
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Append one record.
    pub fn append(&mut self, record: &Record) -> Result<()> {
        let header = &record.header;
        for (field, value) in [
            ("domain", &header.domain),
            ("kind", &header.kind),
            ("name", &header.name),
        ] {
            if value.len() > u16::MAX as usize {
                return Err(FlashbackError::Log(format!(
                    "record {field} exceeds {} bytes",
                    u16::MAX
                )));
            }
        }
        if record.body.len() > u32::MAX as usize {
            return Err(FlashbackError::Log(format!(
                "record body exceeds {} bytes",
                u32::MAX
            )));
        }

        let mut buf = BytesMut::with_capacity(record.encoded_size());
        buf.put_i64_le(header.timestamp);
        buf.put_u16_le(header.domain.len() as u16);
        buf.put_slice(header.domain.as_bytes());
        buf.put_u16_le(header.kind.len() as u16);
        buf.put_slice(header.kind.as_bytes());
        buf.put_u16_le(header.name.len() as u16);
        buf.put_slice(header.name.as_bytes());
        buf.put_u32_le(record.body.len() as u32);
        buf.put_slice(&record.body);
        buf.put_u32_le(record.calculate_crc());

        self.writer.write_all(&buf)?;
        self.records_written += 1;
        Ok(())
    }

    /// Flush, backfill the declared record count, and sync to disk.
    ///
    /// Returns the number of records written.
    pub fn finalize(mut self) -> Result<u64> {
        self.writer.flush()?;
        let file = self.writer.get_mut();
        file.seek(SeekFrom::Start(COUNT_OFFSET))?;
        file.write_all(&self.records_written.to_le_bytes())?;
        file.sync_all()?;
        debug!(path = %self.path.display(), records = self.records_written, "finalized log");
        Ok(self.records_written)
    }
}

impl RecordSink for LogWriter {
    fn append(&mut self, record: &Record) -> Result<()> {
        LogWriter::append(self, record)
    }
}

impl std::fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogWriter")
            .field("path", &self.path)
            .field("records_written", &self.records_written)
            .finish()
    }
}
