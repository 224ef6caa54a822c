//! Record types for recorded bus traffic

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Event timestamp in milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Sentinel reported by a cursor that has run past the end of its stream.
pub const TIMESTAMP_MAX: Timestamp = i64::MAX;

/// Sentinel reported by a cursor that has run before the start of its stream.
pub const TIMESTAMP_MIN: Timestamp = i64::MIN;

/// The (domain, kind) identity of an event type.
///
/// Used as the key for exclusion filtering and the event catalog. The bus
/// routes records by `domain`; `kind` is the typed-record name within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    /// Routing domain on the bus
    pub domain: String,

    /// Record type within the domain
    pub kind: String,
}

impl EventKey {
    /// Create a new event key
    pub fn new(domain: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            kind: kind.into(),
        }
    }
}

/// The fixed header present on every record.
///
/// Headers are cheap to decode and are read eagerly during traversal; record
/// bodies are decoded only when a stream actually stops on a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHeader {
    /// Routing domain on the bus
    pub domain: String,

    /// Record type within the domain
    pub kind: String,

    /// Instance name of the emitting endpoint
    pub name: String,

    /// Capture timestamp (milliseconds since epoch)
    pub timestamp: Timestamp,
}

impl RecordHeader {
    /// Create a new record header
    pub fn new(
        domain: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            domain: domain.into(),
            kind: kind.into(),
            name: name.into(),
            timestamp,
        }
    }

    /// Check whether this header carries the given (domain, kind) identity.
    ///
    /// Allocation-free, for use in exclusion checks on the step path.
    pub fn matches(&self, key: &EventKey) -> bool {
        self.domain == key.domain && self.kind == key.kind
    }

    /// The (domain, kind) identity of this record
    pub fn key(&self) -> EventKey {
        EventKey::new(self.domain.clone(), self.kind.clone())
    }
}

/// One timestamped, typed event captured in a log file.
///
/// The body is an opaque payload; the replay core never interprets it.
/// Records are immutable once read and are not retained by the engine beyond
/// the current cursor position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Fixed header (always decoded)
    pub header: RecordHeader,

    /// Opaque typed payload (decoded lazily)
    pub body: Bytes,
}

impl Record {
    /// Create a new record
    pub fn new(header: RecordHeader, body: Bytes) -> Self {
        Self { header, body }
    }

    /// Capture timestamp of this record
    pub fn timestamp(&self) -> Timestamp {
        self.header.timestamp
    }

    /// Calculate the CRC32 checksum for this record's data
    ///
    /// The checksum covers the timestamp, all header strings, and the body.
    /// It is stored after the body on disk and verified on decode.
    pub fn calculate_crc(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.header.timestamp.to_le_bytes());
        hasher.update(self.header.domain.as_bytes());
        hasher.update(self.header.kind.as_bytes());
        hasher.update(self.header.name.as_bytes());
        hasher.update(&self.body);
        hasher.finalize()
    }

    /// Get the encoded size of this record in bytes
    pub fn encoded_size(&self) -> usize {
        // timestamp + 3 length-prefixed strings + length-prefixed body + crc
        8 + (2 + self.header.domain.len())
            + (2 + self.header.kind.len())
            + (2 + self.header.name.len())
            + (4 + self.body.len())
            + 4
    }
}
