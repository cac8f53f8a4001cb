//! Integration tests for triggered capture and trace export
//!
//! Tests the workflow: build layout -> add trigger -> arm -> sample -> export

mod common;

use common::builders::layout;
use socscope::capture::{
    CaptureEngine, CaptureError, CaptureState, EdgeDetector, ExportError, Exporter,
    RangeDetector, TraceFormat, TriggerTerm,
};
use tempfile::tempdir;

/// `sel` (1 bit) and an 8-bit counter.
fn counter_engine(capacity: usize, divider: u32) -> CaptureEngine {
    let layout = layout(&[("sel", 1), ("count", 8)]);
    let term = TriggerTerm::new(layout.place("sel", 1).unwrap(), layout.field_mask("sel").unwrap());
    let mut engine = CaptureEngine::new(layout, capacity)
        .with_subsample(divider)
        .unwrap();
    engine.trigger_mut().add_port(term);
    engine
}

/// Feed instants `0..n`: sel goes high at instant 3, count is the instant.
fn feed(engine: &mut CaptureEngine, n: u128) {
    for i in 0..n {
        let sel = u128::from(i >= 3);
        engine.sample_tick(&[sel, i]).unwrap();
    }
}

#[test]
fn test_subsampled_capture_to_csv() {
    let mut engine = counter_engine(4, 2);
    engine.arm();
    feed(&mut engine, 20);

    let status = engine.status();
    assert_eq!(status.state, CaptureState::Done);
    assert_eq!(status.trigger_instant, Some(3));

    // Triggering instant is not stored; one commit per two instants after it.
    let counts: Vec<u128> = engine
        .samples()
        .unwrap()
        .iter()
        .map(|s| engine.layout().value(*s, 1))
        .collect();
    assert_eq!(counts, vec![4, 6, 8, 10]);

    let dir = tempdir().unwrap();
    let path = dir.path().join("capture.csv");
    let summary = Exporter::new(TraceFormat::Csv)
        .export_capture(&engine, &path)
        .unwrap();
    assert_eq!(summary.samples, 4);
    assert_eq!(summary.signals, 2);

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines, ["sel,count", "1,8", "1,4", "1,6", "1,8", "1,10"]);
    assert_eq!(summary.bytes, text.len() as u64);
}

#[test]
fn test_export_before_done_is_rejected() {
    let mut engine = counter_engine(4, 1);
    engine.arm();
    feed(&mut engine, 2);

    let dir = tempdir().unwrap();
    let err = Exporter::new(TraceFormat::Vcd)
        .export_capture(&engine, dir.path().join("early.vcd"))
        .unwrap_err();
    assert!(matches!(
        err,
        ExportError::Capture(CaptureError::NotDone(CaptureState::Armed))
    ));
    assert!(!dir.path().join("early.vcd").exists());
}

#[test]
fn test_failed_export_keeps_capture_for_retry() {
    let mut engine = counter_engine(2, 1);
    engine.arm();
    feed(&mut engine, 10);
    assert!(engine.is_done());

    let dir = tempdir().unwrap();
    let missing = dir.path().join("no").join("such").join("dir.json");
    let exporter = Exporter::new(TraceFormat::Json);
    let err = exporter.export_capture(&engine, &missing).unwrap_err();
    assert!(matches!(err, ExportError::Destination { ref path, .. } if *path == missing));

    assert_eq!(engine.state(), CaptureState::Done);
    let retry = dir.path().join("retry.json");
    let summary = exporter.export_capture(&engine, &retry).unwrap();
    assert_eq!(summary.samples, 2);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&retry).unwrap()).unwrap();
    assert_eq!(json["sample_period"], 1);
    assert_eq!(json["signals"][1]["name"], "count");
    assert_eq!(json["samples"][0][1], 4);
    assert_eq!(json["samples"][1][1], 5);
}

#[test]
fn test_rearm_discards_previous_capture() {
    let mut engine = counter_engine(2, 1);
    engine.arm();
    feed(&mut engine, 10);
    assert_eq!(engine.len(), 2);

    engine.arm();
    assert_eq!(engine.state(), CaptureState::Armed);
    assert!(engine.is_empty());
    assert!(engine.samples().is_err());
}

#[test]
fn test_edge_trigger_vcd_only_writes_changes() {
    let layout = layout(&[("strobe", 1), ("data", 4)]);
    let strobe = layout.field_mask("strobe").unwrap();
    let mut engine = CaptureEngine::new(layout, 4);
    engine.trigger_mut().add_port(EdgeDetector::rising(strobe));
    engine.arm();

    // Strobe is high from the start: no rising edge until it drops and rises.
    for (s, d) in [(1, 0), (1, 0), (0, 0), (1, 1), (1, 1), (1, 2), (1, 2), (0, 2)] {
        engine.sample_tick(&[s, d]).unwrap();
    }
    assert!(engine.is_done());
    assert_eq!(engine.status().trigger_instant, Some(3));

    let mut out = Vec::new();
    Exporter::new(TraceFormat::Vcd)
        .with_scope("bench")
        .export(engine.layout(), engine.samples().unwrap(), &mut out)
        .unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.starts_with("$version socscope "));
    assert!(text.contains("$scope module bench $end"));
    assert!(text.contains("$var wire 4 \" data $end"));
    // Samples: (1,1) (1,2) (1,2) (0,2); unchanged instant 2 writes nothing.
    let body: Vec<&str> = text
        .split("$enddefinitions $end\n")
        .nth(1)
        .unwrap()
        .lines()
        .collect();
    assert_eq!(
        body,
        ["#0", "$dumpvars", "1!", "b1 \"", "$end", "#1", "b10 \"", "#3", "0!", "#4"]
    );
}

#[test]
fn test_range_trigger_with_ored_ports() {
    let layout = layout(&[("level", 8)]);
    let mask = layout.field_mask("level").unwrap();
    let mut engine = CaptureEngine::new(layout, 1);
    engine.trigger_mut().add_port(RangeDetector::new(200, 210, mask));
    engine.trigger_mut().add_port(TriggerTerm::new(7, mask));
    engine.arm();

    for level in [1, 2, 7, 9] {
        engine.sample_tick(&[level]).unwrap();
    }
    assert!(engine.is_done());
    assert_eq!(engine.status().trigger_instant, Some(2));
    assert_eq!(engine.drain().unwrap().len(), 1);
}
