//! Shared fixtures for replay integration tests

// Each integration test binary compiles its own copy; not all use every helper.
#![allow(dead_code)]

use bytes::Bytes;
use flashback::{LogWriter, Record, RecordHeader, ReplayEngine, Timestamp, INDEX_COMPLETE};
use std::path::{Path, PathBuf};

/// Build a record with a payload derived from its identity, so merge output
/// can be traced back to its source.
pub fn event(timestamp: Timestamp, domain: &str, kind: &str) -> Record {
    Record::new(
        RecordHeader::new(domain, kind, "recorder0", timestamp),
        Bytes::from(format!("{domain}/{kind}@{timestamp}")),
    )
}

/// Write a finalized log file containing the given records, in order.
pub fn write_log(path: &Path, records: &[Record]) {
    let mut writer = LogWriter::create(path).unwrap();
    for record in records {
        writer.append(record).unwrap();
    }
    writer.finalize().unwrap();
}

/// Write a log and add it to the engine, driving its index to completion.
pub fn add_indexed(engine: &mut ReplayEngine, path: &Path, records: &[Record]) {
    write_log(path, records);
    engine.add_stream(path).unwrap();
    while engine.index_step(path).unwrap() < INDEX_COMPLETE {}
}

/// Build an engine over freshly written log files, one per record set.
pub fn engine_over(dir: &Path, logs: &[(&str, Vec<Record>)]) -> (ReplayEngine, Vec<PathBuf>) {
    let mut engine = ReplayEngine::default();
    let mut paths = Vec::new();
    for (name, records) in logs {
        let path = dir.join(name);
        add_indexed(&mut engine, &path, records);
        paths.push(path);
    }
    (engine, paths)
}

/// Timestamps of a record sequence, for order assertions.
pub fn timestamps(records: &[Record]) -> Vec<Timestamp> {
    records.iter().map(|r| r.timestamp()).collect()
}
