#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # Flashback
//!
//! Flashback is a recorder/replay core for timestamped, typed event records
//! captured from a distributed pub/sub bus. Given a set of independently
//! recorded binary log files, it presents a single time-ordered, seekable,
//! bidirectionally-scrubbable event stream, and can re-export an arbitrary
//! time window as a standalone merged log.
//!
//! ## Features
//!
//! - **Chronological merge**: N log files replay as one globally time-ordered
//!   stream, forward or backward
//! - **Lazy indexing**: per-file indexes build incrementally in chunks, so a
//!   UI event loop stays responsive while large logs load
//! - **Lazy body decode**: only record headers are touched during indexing
//!   and stepping; bodies decode when a record is actually emitted
//! - **Exclusion filtering**: (domain, kind) pairs can be filtered out
//!   per-record without losing global order
//! - **Cut export**: any sub-interval materializes as a new log file in the
//!   same format
//!
//! ## Quick Start
//!
//! ```no_run
//! use flashback::{ReplayConfig, ReplayEngine, Result};
//!
//! fn main() -> Result<()> {
//!     let mut engine = ReplayEngine::new(ReplayConfig::default());
//!
//!     engine.add_stream("nav.flbk")?;
//!     engine.add_stream("control.flbk")?;
//!
//!     // Indexing is chunked; re-invoke until each stream reports 100
//!     while engine.index_step("nav.flbk")? < 100 {}
//!     while engine.index_step("control.flbk")? < 100 {}
//!
//!     // Skip noisy telemetry, then replay the first ten seconds
//!     engine.set_exclude("nav", "Heartbeat");
//!     let start = engine.start_time();
//!     for record in engine.play_to(start + 10_000)? {
//!         println!("{} {}/{}", record.timestamp(), record.header.domain, record.header.kind);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! The engine is single-threaded and cooperative: all operations run to
//! completion on the calling thread, and suspension happens only at the
//! granularity the caller chooses.

pub mod config;
pub mod error;
pub mod log;
pub mod replay;

pub use config::ReplayConfig;
pub use error::{FlashbackError, Result};
pub use log::codec::{LogReader, LogWriter, RecordSink};
pub use log::record::{EventKey, Record, RecordHeader, Timestamp};
pub use replay::engine::{Direction, EngineStats, ReplayEngine};
pub use replay::stream::{LogStream, INDEX_COMPLETE};
