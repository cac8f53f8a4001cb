//! Thread boundary between the runner and whoever drives it (CLI, tests).

use crate::capture::{CaptureStatus, ExportSummary, TraceFormat, TriggerPort};
use crate::pipeline::{ConfigValue, Indicator, NodeId};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::Serialize;
use std::path::PathBuf;

/// Commands understood by a target. Targets reject the ones they have no
/// hardware for with `SocError::Unsupported`.
#[derive(Debug, Clone)]
pub enum TargetCommand {
    /// Drive the channel-select switch.
    SetSwitch(bool),
    /// Queue bytes on the host side of the serial line.
    InjectRx(Vec<u8>),
    /// Collect everything the device transmitted so far.
    TakeTx,
    /// Add a trigger port.
    AddTriggerPort(TriggerPort),
    /// Set pattern and mask of an existing pattern term.
    ConfigureTrigger {
        port: usize,
        pattern: u128,
        mask: u128,
    },
    /// Remove every trigger port.
    ClearTrigger,
    SetSubsample(u32),
    Arm,
    /// Write the finished capture to `path`.
    Export { path: PathBuf, format: TraceFormat },
    /// Forward a config change to a pipeline stage.
    ConfigureStage {
        stage: NodeId,
        key: String,
        value: ConfigValue,
    },
    RequestCapture,
}

/// Commands sent to the runner thread.
#[derive(Debug, Clone)]
pub enum RunnerCommand {
    /// Free-run the target.
    Start,
    /// Pause free-running.
    Stop,
    /// Advance exactly this many cycles, running or not.
    Step(u64),
    /// Outer loop rate while free-running. Zero means as fast as possible.
    SetTickRate(u32),
    /// Target cycles per outer loop iteration.
    SetCyclesPerTick(u64),
    Target(TargetCommand),
    RequestStatus,
    Shutdown,
}

/// Runner status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunnerStatus {
    pub target: String,
    pub running: bool,
    pub cycle: u64,
    pub tick_rate_hz: u32,
    pub cycles_per_tick: u64,
}

/// Messages sent from the runner thread.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StatusMessage {
    /// A `Step` command finished.
    Stepped { cycle: u64 },
    Indicators(Vec<Indicator>),
    Capture(CaptureStatus),
    Exported {
        path: PathBuf,
        summary: ExportSummary,
    },
    TxBytes(Vec<u8>),
    Status(RunnerStatus),
    Error(String),
    /// The runner thread is exiting.
    Shutdown,
}

/// Channel capacity for commands (controller → runner).
pub const CMD_CHANNEL_CAPACITY: usize = 256;
/// Channel capacity for messages (runner → controller).
pub const MSG_CHANNEL_CAPACITY: usize = 4_096;

/// Controller-side handle for the runner thread.
pub struct RunnerBridge {
    pub cmd_tx: Sender<RunnerCommand>,
    pub msg_rx: Receiver<StatusMessage>,
}

impl RunnerBridge {
    /// Create a new bridge pair: `(bridge, cmd_rx, msg_tx)`.
    ///
    /// The runner thread owns `cmd_rx` and `msg_tx`.
    pub fn new() -> (Self, Receiver<RunnerCommand>, Sender<StatusMessage>) {
        let (cmd_tx, cmd_rx) = bounded(CMD_CHANNEL_CAPACITY);
        let (msg_tx, msg_rx) = bounded(MSG_CHANNEL_CAPACITY);
        (Self { cmd_tx, msg_rx }, cmd_rx, msg_tx)
    }

    /// Drain all pending messages.
    pub fn drain(&self) -> Vec<StatusMessage> {
        self.msg_rx.try_iter().collect()
    }

    pub fn try_recv(&self) -> Option<StatusMessage> {
        self.msg_rx.try_recv().ok()
    }

    pub fn send_command(&self, cmd: RunnerCommand) -> bool {
        self.cmd_tx.send(cmd).is_ok()
    }

    pub fn start(&self) {
        let _ = self.cmd_tx.send(RunnerCommand::Start);
    }

    pub fn stop(&self) {
        let _ = self.cmd_tx.send(RunnerCommand::Stop);
    }

    pub fn step(&self, cycles: u64) {
        let _ = self.cmd_tx.send(RunnerCommand::Step(cycles));
    }

    pub fn target(&self, cmd: TargetCommand) {
        let _ = self.cmd_tx.send(RunnerCommand::Target(cmd));
    }

    pub fn request_status(&self) {
        let _ = self.cmd_tx.send(RunnerCommand::RequestStatus);
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(RunnerCommand::Shutdown);
    }
}
