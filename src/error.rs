//! Error types for Flashback
//!
//! Indexing errors are local to a single log file: the engine drops the
//! offending file and keeps operating on the remaining streams. Seek, step,
//! and play operations degrade to no-ops at file and window boundaries, so
//! the variants below surface only at file-add/index time or on genuine
//! codec-level corruption.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Flashback operations
pub type Result<T> = std::result::Result<T, FlashbackError>;

/// Errors produced by the log codec and the replay engine
#[derive(Debug, Error)]
pub enum FlashbackError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("log error: {0}")]
    Log(String),

    #[error("log contains no records: {}", .0.display())]
    EmptyLog(PathBuf),

    #[error("log {} ends in the future: last record at {} ms, wall clock {} ms", .path.display(), .last, .now)]
    FutureEndTime { path: PathBuf, last: i64, now: i64 },

    #[error("bad log format: {0}")]
    BadFormat(String),

    #[error("log {} truncated at byte {}", .path.display(), .offset)]
    Truncated { path: PathBuf, offset: u64 },

    #[error("corrupted record in {} at byte {}: CRC mismatch", .path.display(), .offset)]
    CorruptedRecord { path: PathBuf, offset: u64 },

    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FlashbackError::EmptyLog(PathBuf::from("/tmp/a.flbk"));
        assert_eq!(err.to_string(), "log contains no records: /tmp/a.flbk");

        let err = FlashbackError::Truncated {
            path: PathBuf::from("b.flbk"),
            offset: 128,
        };
        assert_eq!(err.to_string(), "log b.flbk truncated at byte 128");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::other("disk gone");
        let err: FlashbackError = io.into();
        assert!(matches!(err, FlashbackError::Io(_)));
    }
}
