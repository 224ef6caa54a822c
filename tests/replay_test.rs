//! End-to-end tests for the replay engine
//!
//! These drive the public API the way the windowed UI does: add files, index
//! them cooperatively, scrub in both directions, filter, and export cuts.

mod common;

use common::{add_indexed, engine_over, event, timestamps, write_log};
use flashback::{
    Direction, FlashbackError, LogWriter, Record, ReplayConfig, ReplayEngine, INDEX_COMPLETE,
};
use tempfile::tempdir;

/// The canonical two-stream scenario: A = x@0, y@10, x@20; B = z@5, z@15.
fn canonical(dir: &std::path::Path) -> (ReplayEngine, Vec<std::path::PathBuf>) {
    engine_over(
        dir,
        &[
            (
                "a.flbk",
                vec![event(0, "bus", "x"), event(10, "bus", "y"), event(20, "bus", "x")],
            ),
            ("b.flbk", vec![event(5, "bus", "z"), event(15, "bus", "z")]),
        ],
    )
}

#[test]
fn merged_replay_is_chronological_across_files() {
    let dir = tempdir().unwrap();
    let (mut engine, _) = canonical(dir.path());

    let first = engine.play_to(12).unwrap();
    assert_eq!(timestamps(&first), vec![0, 5, 10]);

    let second = engine.play_to(25).unwrap();
    assert_eq!(timestamps(&second), vec![15, 20]);
}

#[test]
fn merge_order_is_nondecreasing_for_increasing_targets() {
    let dir = tempdir().unwrap();
    let (mut engine, _) = engine_over(
        dir.path(),
        &[
            (
                "sensors.flbk",
                vec![
                    event(1, "nav", "Pose"),
                    event(4, "nav", "Pose"),
                    event(9, "nav", "Pose"),
                    event(16, "nav", "Pose"),
                ],
            ),
            (
                "control.flbk",
                vec![event(2, "ctl", "Cmd"), event(8, "ctl", "Cmd"), event(18, "ctl", "Cmd")],
            ),
            ("health.flbk", vec![event(3, "sys", "Health"), event(17, "sys", "Health")]),
        ],
    );

    let mut all = Vec::new();
    for target in [3, 7, 11, 20] {
        all.extend(timestamps(&engine.play_to(target).unwrap()));
    }
    assert_eq!(all.len(), 9);
    assert!(all.windows(2).all(|w| w[0] <= w[1]), "out of order: {all:?}");
}

#[test]
fn seek_then_replay_from_midpoint() {
    let dir = tempdir().unwrap();
    let (mut engine, _) = canonical(dir.path());

    engine.seek(8).unwrap();
    assert_eq!(engine.global_cursor_time(), 10);

    let emitted = engine.play_to(25).unwrap();
    assert_eq!(timestamps(&emitted), vec![10, 15, 20]);
}

#[test]
fn scrub_backward_then_forward_again() {
    let dir = tempdir().unwrap();
    let (mut engine, _) = canonical(dir.path());

    let forward = engine.play_to(12).unwrap();
    assert_eq!(timestamps(&forward), vec![0, 5, 10]);

    engine.play_backward().unwrap();
    assert_eq!(engine.direction(), Direction::Backward);

    // Single-step scrubbing; the pivot record replays first
    let mut back = Vec::new();
    for _ in 0..forward.len() {
        back.push(engine.play_back_one().unwrap().unwrap().timestamp());
    }
    assert_eq!(back, vec![15, 10, 5]);
    assert_eq!(engine.global_cursor_time(), 0);

    engine.play_forward().unwrap();
    let resumed = engine.play_to(25).unwrap();
    assert!(timestamps(&resumed).windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(resumed.last().unwrap().timestamp(), 20);
}

#[test]
fn exclusion_removes_records_from_playback_only() {
    let dir = tempdir().unwrap();
    let (mut engine, _) = engine_over(
        dir.path(),
        &[
            (
                "mixed.flbk",
                vec![
                    event(1, "nav", "Pose"),
                    event(2, "nav", "Heartbeat"),
                    event(3, "nav", "Pose"),
                    event(4, "nav", "Heartbeat"),
                ],
            ),
            ("other.flbk", vec![event(2, "ctl", "Cmd")]),
        ],
    );

    engine.set_exclude("nav", "Heartbeat");
    let emitted = engine.play_to(10).unwrap();
    assert_eq!(timestamps(&emitted), vec![1, 2, 3]);
    assert!(emitted
        .iter()
        .all(|r| !(r.header.domain == "nav" && r.header.kind == "Heartbeat")));

    // The catalog reflects file contents, not the filter
    let catalog = engine.event_catalog();
    assert!(catalog.get("nav").unwrap().contains("Heartbeat"));
    assert!(catalog.get("nav").unwrap().contains("Pose"));
    assert!(catalog.get("ctl").unwrap().contains("Cmd"));
}

#[test]
fn cut_export_writes_playable_merged_log() {
    let dir = tempdir().unwrap();
    let (mut engine, _) = canonical(dir.path());

    engine.seek(5).unwrap();
    engine.cut_start_here();
    engine.seek(15).unwrap();
    engine.cut_end_here();

    let out = dir.path().join("window.flbk");
    let mut writer = LogWriter::create(&out).unwrap();
    let written = engine.save_cut(&mut writer).unwrap();
    writer.finalize().unwrap();
    assert_eq!(written, 3);

    // Every exported record lies inside the window
    let mut merged = ReplayEngine::default();
    merged.add_stream(&out).unwrap();
    while merged.index_step(&out).unwrap() < INDEX_COMPLETE {}
    let replayed = merged.play_to(i64::MAX).unwrap();
    assert_eq!(timestamps(&replayed), vec![5, 10, 15]);
    assert!(replayed.iter().all(|r| (5..=15).contains(&r.timestamp())));
}

#[test]
fn cut_markers_out_of_order_export_nothing() {
    // Deliberately lenient: the markers are never validated against each
    // other, so a caller invoking them out of time order gets an empty cut.
    let dir = tempdir().unwrap();
    let (mut engine, _) = canonical(dir.path());

    engine.seek(15).unwrap();
    engine.cut_start_here();
    engine.seek(5).unwrap();
    engine.cut_end_here();
    assert!(engine.cut_start_time() > engine.cut_end_time());

    let mut sink: Vec<Record> = Vec::new();
    assert_eq!(engine.save_cut(&mut sink).unwrap(), 0);
    assert!(sink.is_empty());
}

#[test]
fn prefetch_leaves_playback_position_untouched() {
    let dir = tempdir().unwrap();
    let (mut engine, _) = canonical(dir.path());

    engine.play_to(7).unwrap();
    let position = engine.global_cursor_time();

    let context = engine.prefetch_window(0, 4).unwrap();
    assert_eq!(timestamps(&context), vec![0, 5, 10, 15]);
    assert_eq!(engine.global_cursor_time(), position);

    let emitted = engine.play_to(25).unwrap();
    assert_eq!(timestamps(&emitted), vec![10, 15, 20]);
}

#[test]
fn empty_log_is_rejected_and_leaves_no_trace() {
    let dir = tempdir().unwrap();
    let (mut engine, _) = canonical(dir.path());

    let empty = dir.path().join("empty.flbk");
    write_log(&empty, &[]);
    engine.add_stream(&empty).unwrap();

    let err = engine.index_step(&empty).unwrap_err();
    assert!(matches!(err, FlashbackError::EmptyLog(_)));
    assert_eq!(engine.len(), 2);

    // Catalog is unaffected by the dropped file
    let catalog = engine.event_catalog();
    assert_eq!(catalog.keys().collect::<Vec<_>>(), vec!["bus"]);

    // And the engine still plays
    let emitted = engine.play_to(25).unwrap();
    assert_eq!(emitted.len(), 5);
}

#[test]
fn future_timestamped_log_is_rejected() {
    let dir = tempdir().unwrap();
    let mut engine = ReplayEngine::default();

    let path = dir.path().join("skewed.flbk");
    let next_year = chrono::Utc::now().timestamp_millis() + 365 * 86_400_000;
    write_log(&path, &[event(0, "bus", "x"), event(next_year, "bus", "x")]);
    engine.add_stream(&path).unwrap();

    let mut result = Ok(0);
    for _ in 0..1000 {
        result = engine.index_step(&path);
        match &result {
            Ok(p) if *p < INDEX_COMPLETE => continue,
            _ => break,
        }
    }
    assert!(matches!(result, Err(FlashbackError::FutureEndTime { .. })));
    assert!(engine.is_empty());
}

#[test]
fn chunked_indexing_reports_monotonic_progress() {
    let dir = tempdir().unwrap();
    let mut engine = ReplayEngine::new(ReplayConfig {
        index_chunk_size: 16,
        ..Default::default()
    });

    let path = dir.path().join("big.flbk");
    let records: Vec<Record> = (0..200).map(|i| event(i * 10, "nav", "Pose")).collect();
    write_log(&path, &records);
    engine.add_stream(&path).unwrap();

    let mut last = 0;
    loop {
        let progress = engine.index_step(&path).unwrap();
        assert!(progress >= last, "progress went backwards: {last} -> {progress}");
        last = progress;
        if progress == INDEX_COMPLETE {
            break;
        }
    }

    assert_eq!(engine.start_time(), 0);
    assert_eq!(engine.end_time(), 1990);
    assert_eq!(engine.play_to(i64::MAX).unwrap().len(), 200);
}

#[test]
fn removing_a_file_renumbers_the_merge() {
    let dir = tempdir().unwrap();
    let (mut engine, paths) = canonical(dir.path());

    engine.remove_stream(&paths[1]).unwrap();
    assert_eq!(engine.len(), 1);

    engine.seek(0).unwrap();
    let emitted = engine.play_to(25).unwrap();
    assert_eq!(timestamps(&emitted), vec![0, 10, 20]);
}

#[test]
fn adding_a_file_mid_session_extends_the_range() {
    let dir = tempdir().unwrap();
    let (mut engine, _) = canonical(dir.path());
    assert_eq!(engine.end_time(), 20);

    let extra = dir.path().join("tail.flbk");
    add_indexed(&mut engine, &extra, &[event(30, "bus", "w")]);
    assert_eq!(engine.end_time(), 30);

    engine.seek(0).unwrap();
    let emitted = engine.play_to(40).unwrap();
    assert_eq!(timestamps(&emitted), vec![0, 5, 10, 15, 20, 30]);
}

#[test]
fn global_cursor_clamps_to_end_after_exhaustion() {
    let dir = tempdir().unwrap();
    let (mut engine, _) = canonical(dir.path());

    engine.play_to(i64::MAX).unwrap();
    assert_eq!(engine.global_cursor_time(), engine.end_time());
}
