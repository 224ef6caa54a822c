//! Log layer: record model and on-disk codec
//!
//! A log file is an append-only sequence of timestamped, typed records
//! captured from the bus. The [`codec`] module owns the binary format; the
//! replay layer consumes it exclusively through [`codec::LogReader`]'s pull
//! API and writes cut exports through [`codec::RecordSink`].

pub mod codec;
pub mod record;

pub use codec::{LogReader, LogWriter, RecordSink};
pub use record::{EventKey, Record, RecordHeader, Timestamp, TIMESTAMP_MAX, TIMESTAMP_MIN};
