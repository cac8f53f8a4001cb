//! Integration tests for the shared-UART debug SoC
//!
//! Host bytes go through the UART PHY and the channel multiplexer to either
//! the console or the bus bridge; the capture engine watches the PHY side.

mod common;

use common::builders::EdidConfigBuilder;
use common::mock_helpers::{BusAccess, RecordingBus};
use common::{read_frame, words, write_frame};
use socscope::capture::{CaptureError, CaptureState, TraceFormat};
use socscope::runtime::{StatusMessage, Target, TargetCommand};
use socscope::targets::bus_bridge::{BridgeState, SYSID_ADDR, SYSID_VALUE};
use socscope::targets::edid_debug::{SIG_RX_DATA, SIG_RX_VALID, SIG_UART_SEL};
use socscope::targets::EdidDebugSoc;
use socscope::SocError;
use tempfile::tempdir;

fn transmitted(soc: &mut EdidDebugSoc) -> String {
    String::from_utf8(soc.uart_mut().take_transmitted()).unwrap()
}

#[test]
fn test_bridge_writes_then_reads_back_over_uart() {
    let bus = RecordingBus::default();
    let config = EdidConfigBuilder::new().build();
    let mut soc = EdidDebugSoc::with_bus(config, Box::new(bus.clone())).unwrap();
    soc.set_switch(true).unwrap();

    soc.uart_mut().inject(&write_frame(0x10, &[1, 2]));
    soc.uart_mut().inject(&read_frame(0x10, 2));
    soc.run(600).unwrap();

    assert_eq!(
        bus.accesses(),
        vec![
            BusAccess::Write(0x10, 1),
            BusAccess::Write(0x11, 2),
            BusAccess::Read(0x10),
            BusAccess::Read(0x11),
        ]
    );
    let reply = soc.uart_mut().take_transmitted();
    assert_eq!(words(&reply), vec![0x10 ^ 0xa5a5_a5a5, 0x11 ^ 0xa5a5_a5a5]);
    assert_eq!(soc.bridge().state(), BridgeState::Idle);
}

#[test]
fn test_switch_moves_uart_between_console_and_bridge() {
    let mut soc = EdidDebugSoc::new(EdidConfigBuilder::new().build()).unwrap();

    soc.run(400).unwrap();
    assert!(transmitted(&mut soc).contains("socscope edid debug"));

    soc.handle(TargetCommand::SetSwitch(true)).unwrap();
    soc.uart_mut().inject(&read_frame(SYSID_ADDR, 1));
    soc.run(300).unwrap();
    assert_eq!(words(&soc.uart_mut().take_transmitted()), vec![SYSID_VALUE]);
    assert!(soc.console().history().is_empty());

    soc.handle(TargetCommand::SetSwitch(false)).unwrap();
    soc.uart_mut().inject(b"echo hi\r");
    soc.run(1_000).unwrap();
    let out = transmitted(&mut soc);
    assert!(out.contains("echo hi\r\nhi\r\n"), "got {out:?}");
    assert_eq!(soc.console().history(), ["echo hi"]);
    assert_eq!(soc.bridge().stats().reads, 1);
}

#[test]
fn test_half_frame_times_out() {
    let config = EdidConfigBuilder::new().bridge_timeout(50).build();
    let mut soc = EdidDebugSoc::new(config).unwrap();
    soc.set_switch(true).unwrap();

    // Command and length only; the address never arrives.
    soc.uart_mut().inject(&read_frame(SYSID_ADDR, 1)[..2]);
    soc.run(200).unwrap();
    assert_eq!(soc.bridge().stats().timeouts, 1);
    assert_eq!(soc.bridge().state(), BridgeState::Idle);
    assert!(soc.uart_mut().take_transmitted().is_empty());

    soc.uart_mut().inject(&read_frame(SYSID_ADDR, 1));
    soc.run(300).unwrap();
    assert_eq!(words(&soc.uart_mut().take_transmitted()), vec![SYSID_VALUE]);
}

#[test]
fn test_capture_rx_byte_and_export() {
    let config = EdidConfigBuilder::new().depth(16).build();
    let mut soc = EdidDebugSoc::new(config).unwrap();
    let term = soc.signal_term(SIG_RX_VALID, 1).unwrap();
    soc.handle(TargetCommand::AddTriggerPort(term.into())).unwrap();

    let armed = soc.handle(TargetCommand::Arm).unwrap();
    assert!(matches!(
        armed,
        Some(StatusMessage::Capture(ref s)) if s.state == CaptureState::Armed
    ));

    // Reconfiguring the divider is refused while armed.
    let err = soc.handle(TargetCommand::SetSubsample(4)).unwrap_err();
    assert!(matches!(
        err,
        SocError::Capture(CaptureError::Busy(CaptureState::Armed))
    ));

    soc.uart_mut().inject(b"A");
    soc.run(100).unwrap();
    assert_eq!(soc.capture().state(), CaptureState::Done);

    let layout = soc.capture().layout().clone();
    let data = layout.index_of(SIG_RX_DATA).unwrap();
    let sel = layout.index_of(SIG_UART_SEL).unwrap();
    let samples = soc.capture().drain().unwrap();
    assert_eq!(samples.len(), 16);
    assert!(samples.iter().all(|s| layout.value(*s, data) == u128::from(b'A')));
    assert!(samples.iter().all(|s| layout.value(*s, sel) == 0));

    let dir = tempdir().unwrap();
    let path = dir.path().join("rx.vcd");
    let reply = soc
        .handle(TargetCommand::Export {
            path: path.clone(),
            format: TraceFormat::Vcd,
        })
        .unwrap();
    match reply {
        Some(StatusMessage::Exported { path: p, summary }) => {
            assert_eq!(p, path);
            assert_eq!(summary.samples, 16);
            assert_eq!(summary.signals, layout.len());
        }
        other => panic!("unexpected reply {other:?}"),
    }
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("$scope module edid_debug $end"));
    assert!(text.contains("$timescale 1000000ns $end"));
}

#[test]
fn test_reset_returns_to_console() {
    let mut soc = EdidDebugSoc::new(EdidConfigBuilder::new().build()).unwrap();
    soc.set_switch(true).unwrap();
    soc.run(50).unwrap();
    soc.reset();

    assert!(!soc.switch());
    assert_eq!(soc.cycle(), 0);
    assert_eq!(soc.capture().state(), CaptureState::Idle);
    soc.run(400).unwrap();
    assert!(transmitted(&mut soc).contains("socscope edid debug"));
}
