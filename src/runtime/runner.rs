//! Runner - drives a target on a dedicated thread.
//!
//! Each loop iteration:
//! 1. Drain commands.
//! 2. If running, step the target `cycles_per_tick` times.
//! 3. Publish indicator and capture changes. Indicator updates are dropped
//!    when the message channel is full; everything else waits for room.
//! 4. Rate-limit to the configured Hz.

use crate::capture::CaptureState;
use crate::error::Result;
use crate::pipeline::Indicator;
use crate::runtime::bridge::{RunnerBridge, RunnerCommand, RunnerStatus, StatusMessage};
use crate::runtime::target::Target;
use crossbeam_channel::{Receiver, SendTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub const DEFAULT_TICK_RATE_HZ: u32 = 1_000;
pub const DEFAULT_CYCLES_PER_TICK: u64 = 1_000;

/// Longest a status message waits for room in a full message channel.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Runner {
    target: Box<dyn Target>,
    cmd_rx: Receiver<RunnerCommand>,
    msg_tx: Sender<StatusMessage>,
    active: bool,
    alive: bool,
    tick_rate_hz: u32,
    cycles_per_tick: u64,
    last_tick_time: Option<Instant>,
    last_indicators: Vec<Indicator>,
    last_capture_state: Option<CaptureState>,
}

impl Runner {
    pub fn new(
        target: Box<dyn Target>,
        cmd_rx: Receiver<RunnerCommand>,
        msg_tx: Sender<StatusMessage>,
    ) -> Self {
        let last_capture_state = target.capture_status().map(|s| s.state);
        Self {
            target,
            cmd_rx,
            msg_tx,
            active: false,
            alive: true,
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            cycles_per_tick: DEFAULT_CYCLES_PER_TICK,
            last_tick_time: None,
            last_indicators: Vec::new(),
            last_capture_state,
        }
    }

    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz;
        self
    }

    pub fn with_cycles_per_tick(mut self, cycles: u64) -> Self {
        self.cycles_per_tick = cycles.max(1);
        self
    }

    /// Run until Shutdown is received or the controller goes away.
    pub fn run(&mut self) {
        tracing::info!("Runner thread started for '{}'", self.target.name());

        while self.alive {
            self.process_commands();
            if !self.alive {
                break;
            }

            if self.active {
                self.last_tick_time = Some(Instant::now());
                if let Err(e) = self.advance(self.cycles_per_tick) {
                    tracing::error!("{}: {}", self.target.name(), e);
                    self.send(StatusMessage::Error(e.to_string()));
                    self.active = false;
                }
                self.publish_changes();
            }

            self.rate_limit();
        }

        self.send(StatusMessage::Shutdown);
        tracing::info!("Runner thread exiting");
    }

    fn process_commands(&mut self) {
        loop {
            let cmd = match self.cmd_rx.try_recv() {
                Ok(cmd) => cmd,
                Err(crossbeam_channel::TryRecvError::Empty) => return,
                Err(crossbeam_channel::TryRecvError::Disconnected) => {
                    self.alive = false;
                    return;
                }
            };

            match cmd {
                RunnerCommand::Start => {
                    if !self.active {
                        tracing::info!("Free-running '{}'", self.target.name());
                        self.active = true;
                    }
                }
                RunnerCommand::Stop => {
                    if self.active {
                        tracing::info!(
                            "Paused '{}' at cycle {}",
                            self.target.name(),
                            self.target.cycle()
                        );
                        self.active = false;
                        self.last_tick_time = None;
                    }
                }
                RunnerCommand::Step(cycles) => match self.advance(cycles) {
                    Ok(()) => {
                        self.send(StatusMessage::Stepped {
                            cycle: self.target.cycle(),
                        });
                        self.publish_changes();
                    }
                    Err(e) => self.send(StatusMessage::Error(e.to_string())),
                },
                RunnerCommand::SetTickRate(hz) => {
                    self.tick_rate_hz = hz;
                }
                RunnerCommand::SetCyclesPerTick(cycles) => {
                    self.cycles_per_tick = cycles.max(1);
                }
                RunnerCommand::Target(cmd) => match self.target.handle(cmd) {
                    Ok(Some(msg)) => self.send(msg),
                    Ok(None) => self.publish_changes(),
                    Err(e) => {
                        tracing::warn!("{}: {}", self.target.name(), e);
                        self.send(StatusMessage::Error(e.to_string()));
                    }
                },
                RunnerCommand::RequestStatus => {
                    let status = self.status();
                    self.send(StatusMessage::Status(status));
                }
                RunnerCommand::Shutdown => {
                    self.alive = false;
                    return;
                }
            }
        }
    }

    fn advance(&mut self, cycles: u64) -> Result<()> {
        for _ in 0..cycles {
            self.target.step()?;
        }
        Ok(())
    }

    /// Send indicators and capture state when they changed.
    fn publish_changes(&mut self) {
        // Level updates are lossy: a dropped one is re-sent on the next publish.
        let indicators = self.target.indicators();
        if indicators != self.last_indicators
            && self
                .msg_tx
                .try_send(StatusMessage::Indicators(indicators.clone()))
                .is_ok()
        {
            self.last_indicators = indicators;
        }

        if let Some(status) = self.target.capture_status() {
            if Some(status.state) != self.last_capture_state {
                self.last_capture_state = Some(status.state);
                self.send(StatusMessage::Capture(status));
            }
        }
    }

    pub fn status(&self) -> RunnerStatus {
        RunnerStatus {
            target: self.target.name().to_string(),
            running: self.active,
            cycle: self.target.cycle(),
            tick_rate_hz: self.tick_rate_hz,
            cycles_per_tick: self.cycles_per_tick,
        }
    }

    /// Deliver `msg`, waiting up to [`DELIVERY_TIMEOUT`] for the controller
    /// to make room.
    fn send(&self, msg: StatusMessage) {
        match self.msg_tx.send_timeout(msg, DELIVERY_TIMEOUT) {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                tracing::warn!(
                    "{}: controller not draining messages, one dropped after {:?}",
                    self.target.name(),
                    DELIVERY_TIMEOUT
                );
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                tracing::debug!("Runner message dropped (controller gone)");
            }
        }
    }

    /// Rate limiting
    fn rate_limit(&self) {
        if !self.active {
            // Not active - idle wait
            std::thread::sleep(Duration::from_millis(1));
            return;
        }
        if self.tick_rate_hz == 0 {
            return;
        }

        let target_interval = Duration::from_nanos(1_000_000_000 / self.tick_rate_hz as u64);

        if let Some(last) = self.last_tick_time {
            let elapsed = last.elapsed();
            if elapsed < target_interval {
                let remaining = target_interval - elapsed;
                // Spin for sub-millisecond accuracy, sleep for larger waits
                if remaining > Duration::from_millis(2) {
                    std::thread::sleep(remaining - Duration::from_millis(1));
                }
                while last.elapsed() < target_interval {
                    std::hint::spin_loop();
                }
            }
        }
    }
}

/// Move `target` onto its own thread. Returns the controller handle and the
/// thread handle.
pub fn spawn(target: Box<dyn Target>) -> std::io::Result<(RunnerBridge, JoinHandle<()>)> {
    spawn_with(target, DEFAULT_TICK_RATE_HZ, DEFAULT_CYCLES_PER_TICK)
}

pub fn spawn_with(
    target: Box<dyn Target>,
    tick_rate_hz: u32,
    cycles_per_tick: u64,
) -> std::io::Result<(RunnerBridge, JoinHandle<()>)> {
    let (bridge, cmd_rx, msg_tx) = RunnerBridge::new();
    let name = format!("socscope-{}", target.name());
    let handle = std::thread::Builder::new().name(name).spawn(move || {
        Runner::new(target, cmd_rx, msg_tx)
            .with_tick_rate(tick_rate_hz)
            .with_cycles_per_tick(cycles_per_tick)
            .run();
    })?;
    Ok((bridge, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ExportError;
    use crate::capture::TraceFormat;
    use crate::error::SocError;
    use crate::runtime::bridge::TargetCommand;
    use std::path::PathBuf;

    /// Target whose only LED toggles every cycle and whose exports always fail.
    #[derive(Default)]
    struct Blinker {
        cycle: u64,
    }

    impl Target for Blinker {
        fn name(&self) -> &str {
            "blinker"
        }

        fn step(&mut self) -> Result<()> {
            self.cycle += 1;
            Ok(())
        }

        fn cycle(&self) -> u64 {
            self.cycle
        }

        fn indicators(&self) -> Vec<Indicator> {
            vec![Indicator::new("led0", self.cycle % 2 == 1)]
        }

        fn handle(&mut self, cmd: TargetCommand) -> Result<Option<StatusMessage>> {
            match cmd {
                TargetCommand::Export { path, .. } => Err(SocError::Export(ExportError::Destination {
                    path,
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such directory"),
                })),
                _ => Ok(None),
            }
        }

        fn reset(&mut self) {
            self.cycle = 0;
        }
    }

    fn drain_until<F>(bridge: &RunnerBridge, mut pred: F) -> Option<StatusMessage>
    where
        F: FnMut(&StatusMessage) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            match bridge.msg_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(msg) if pred(&msg) => return Some(msg),
                _ => {}
            }
        }
        None
    }

    #[test]
    fn test_step_reports_stepped_then_levels() {
        let (bridge, handle) = spawn_with(Box::new(Blinker::default()), 0, 1).unwrap();
        bridge.step(3);
        let first = drain_until(&bridge, |_| true);
        assert!(matches!(first, Some(StatusMessage::Stepped { cycle: 3 })));
        let leds = drain_until(&bridge, |m| matches!(m, StatusMessage::Indicators(_)));
        assert!(matches!(leds, Some(StatusMessage::Indicators(l)) if l[0].lit));

        bridge.shutdown();
        handle.join().unwrap();
    }

    #[test]
    fn test_error_delivered_through_full_channel() {
        let (bridge, handle) = spawn_with(Box::new(Blinker::default()), 0, 1).unwrap();
        bridge.start();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !bridge.msg_rx.is_full() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(bridge.msg_rx.is_full(), "indicator updates never filled the channel");

        bridge.target(TargetCommand::Export {
            path: PathBuf::from("/missing/trace.vcd"),
            format: TraceFormat::Vcd,
        });
        std::thread::sleep(Duration::from_millis(50));

        let error = drain_until(&bridge, |m| matches!(m, StatusMessage::Error(_)));
        match error {
            Some(StatusMessage::Error(text)) => assert!(text.contains("trace.vcd"), "{text}"),
            other => panic!("export error lost: {other:?}"),
        }

        bridge.shutdown();
        assert!(drain_until(&bridge, |m| matches!(m, StatusMessage::Shutdown)).is_some());
        handle.join().unwrap();
    }
}
