//! EDID debug SoC: one UART shared by a console and a register bridge.
//!
//! ```text
//!            ┌──────── cpu ────► Console
//! UartPhy ◄──┤ mux (user switch)
//!            └──────── bridge ─► BusBridge ─► RegisterFile
//! ```
//!
//! The capture engine samples the multiplexer select line, the physical
//! handshakes, the received byte and the bridge FSM state every cycle.

use super::bus_bridge::{BusBridge, RegisterBus, RegisterFile};
use super::console::Console;
use super::uart::UartPhy;
use super::ByteAgent;
use crate::capture::{
    BoundaryPolicy, CaptureEngine, CaptureStatus, Exporter, SignalField, SignalLayout, TraceFormat,
    TriggerTerm,
};
use crate::error::{Result, SocError};
use crate::pipeline::Indicator;
use crate::runtime::{StatusMessage, Target, TargetCommand};
use crate::stream::ChannelMultiplexer;
use serde::{Deserialize, Serialize};

pub const CPU_CHANNEL: usize = 0;
pub const BRIDGE_CHANNEL: usize = 1;

pub const SIG_UART_SEL: &str = "uart_sel";
pub const SIG_RX_VALID: &str = "phy_rx_valid";
pub const SIG_RX_READY: &str = "phy_rx_ready";
pub const SIG_TX_VALID: &str = "phy_tx_valid";
pub const SIG_TX_READY: &str = "phy_tx_ready";
pub const SIG_RX_DATA: &str = "rx_data";
pub const SIG_BRIDGE_STATE: &str = "bridge_state";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdidDebugConfig {
    pub clk_hz: u64,
    pub baud: u32,
    pub capture_depth: usize,
    pub subsample: u32,
    pub boundary_policy: BoundaryPolicy,
    pub ident: String,
    /// Cycles a half-received bridge frame may stall. Zero disables it.
    pub bridge_timeout_cycles: u64,
}

impl Default for EdidDebugConfig {
    fn default() -> Self {
        Self {
            clk_hz: 100_000_000,
            baud: 115_200,
            capture_depth: 32 * 1024,
            subsample: 1,
            boundary_policy: BoundaryPolicy::default(),
            ident: "socscope edid debug".to_string(),
            bridge_timeout_cycles: 10_000_000,
        }
    }
}

pub fn capture_layout() -> Result<SignalLayout> {
    Ok(SignalLayout::new(vec![
        SignalField::new(SIG_UART_SEL, 1),
        SignalField::new(SIG_RX_VALID, 1),
        SignalField::new(SIG_RX_READY, 1),
        SignalField::new(SIG_TX_VALID, 1),
        SignalField::new(SIG_TX_READY, 1),
        SignalField::new(SIG_RX_DATA, 8),
        SignalField::new(SIG_BRIDGE_STATE, 4),
    ])?)
}

pub struct EdidDebugSoc {
    config: EdidDebugConfig,
    uart: UartPhy,
    mux: ChannelMultiplexer<u8>,
    console: Console,
    bridge: BusBridge,
    capture: CaptureEngine,
    switch: bool,
    cycle: u64,
}

impl EdidDebugSoc {
    pub fn new(config: EdidDebugConfig) -> Result<Self> {
        let bus = RegisterFile::new(config.clk_hz);
        Self::with_bus(config, Box::new(bus))
    }

    /// Build with a custom register bus behind the bridge.
    pub fn with_bus(config: EdidDebugConfig, bus: Box<dyn RegisterBus>) -> Result<Self> {
        let capture = CaptureEngine::new(capture_layout()?, config.capture_depth)
            .with_subsample(config.subsample)?
            .with_boundary_policy(config.boundary_policy);
        let mux = ChannelMultiplexer::new("uart", &["cpu", "bridge"])?;

        tracing::info!(
            clk_hz = config.clk_hz,
            baud = config.baud,
            depth = config.capture_depth,
            "edid debug SoC built"
        );
        Ok(Self {
            uart: UartPhy::new(config.clk_hz, config.baud),
            console: Console::new(config.ident.clone()),
            bridge: BusBridge::new(bus, config.bridge_timeout_cycles),
            mux,
            capture,
            switch: false,
            cycle: 0,
            config,
        })
    }

    pub fn config(&self) -> &EdidDebugConfig {
        &self.config
    }

    /// Drive the user switch: off selects the console, on the bridge.
    pub fn set_switch(&mut self, on: bool) -> Result<()> {
        self.mux
            .select(if on { BRIDGE_CHANNEL } else { CPU_CHANNEL })?;
        self.switch = on;
        Ok(())
    }

    pub fn switch(&self) -> bool {
        self.switch
    }

    pub fn uart(&self) -> &UartPhy {
        &self.uart
    }

    pub fn uart_mut(&mut self) -> &mut UartPhy {
        &mut self.uart
    }

    pub fn mux(&self) -> &ChannelMultiplexer<u8> {
        &self.mux
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn bridge(&self) -> &BusBridge {
        &self.bridge
    }

    pub fn capture(&self) -> &CaptureEngine {
        &self.capture
    }

    pub fn capture_mut(&mut self) -> &mut CaptureEngine {
        &mut self.capture
    }

    /// Pattern/mask term matching `value` on signal `name`.
    pub fn signal_term(&self, name: &str, value: u128) -> Result<TriggerTerm> {
        let layout = self.capture.layout();
        Ok(TriggerTerm::new(
            layout.place(name, value)?,
            layout.field_mask(name)?,
        ))
    }

    pub fn run(&mut self, cycles: u64) -> Result<()> {
        for _ in 0..cycles {
            self.step()?;
        }
        Ok(())
    }

    fn sample(&mut self) -> Result<()> {
        let phy = self.mux.physical();
        let rx = phy.rx.handshake();
        let tx = phy.tx.handshake();
        let values = [
            self.mux.active() as u128,
            u128::from(rx.valid),
            u128::from(rx.ready),
            u128::from(tx.valid),
            u128::from(tx.ready),
            u128::from(self.uart.rx_data()),
            u128::from(self.bridge.state_code()),
        ];
        self.capture.sample_tick(&values)?;
        Ok(())
    }

    /// Exporter with one time step per system clock period.
    pub fn trace_exporter(&self, format: TraceFormat) -> Exporter {
        let period_ns = (1_000_000_000 / self.config.clk_hz.max(1)).max(1);
        Exporter::new(format)
            .with_timescale_ns(period_ns)
            .with_scope("edid_debug")
    }
}

impl Target for EdidDebugSoc {
    fn name(&self) -> &str {
        "edid_debug"
    }

    fn step(&mut self) -> Result<()> {
        // Decide: consumers publish ready, then the mux latches the selector.
        let (phy, channels) = self.mux.ports_mut();
        self.console.publish_ready(&mut channels[CPU_CHANNEL].rx);
        self.bridge.publish_ready(&mut channels[BRIDGE_CHANNEL].rx);
        self.uart.publish_ready(&mut phy.tx);
        self.mux.decide();

        let (phy, channels) = self.mux.ports_mut();
        self.uart.produce(&mut phy.rx);
        self.console.produce(&mut channels[CPU_CHANNEL].tx);
        self.bridge.produce(&mut channels[BRIDGE_CHANNEL].tx);
        self.mux.route();

        let (phy, channels) = self.mux.ports_mut();
        self.console.consume(&mut channels[CPU_CHANNEL].rx);
        self.bridge.consume(&mut channels[BRIDGE_CHANNEL].rx);
        self.uart.consume(&mut phy.tx);

        self.sample()?;
        self.mux.tick();
        self.cycle += 1;
        Ok(())
    }

    fn cycle(&self) -> u64 {
        self.cycle
    }

    fn indicators(&self) -> Vec<Indicator> {
        vec![Indicator::new("led0", self.switch)]
    }

    fn handle(&mut self, cmd: TargetCommand) -> Result<Option<StatusMessage>> {
        match cmd {
            TargetCommand::SetSwitch(on) => self.set_switch(on)?,
            TargetCommand::InjectRx(bytes) => self.uart.inject(&bytes),
            TargetCommand::TakeTx => {
                return Ok(Some(StatusMessage::TxBytes(self.uart.take_transmitted())));
            }
            TargetCommand::AddTriggerPort(port) => {
                self.capture.trigger_mut().add_port(port);
            }
            TargetCommand::ConfigureTrigger {
                port,
                pattern,
                mask,
            } => self.capture.trigger_mut().configure(port, pattern, mask)?,
            TargetCommand::ClearTrigger => self.capture.trigger_mut().clear(),
            TargetCommand::SetSubsample(divider) => self.capture.set_subsample(divider)?,
            TargetCommand::Arm => {
                self.capture.arm();
                return Ok(Some(StatusMessage::Capture(self.capture.status())));
            }
            TargetCommand::Export { path, format } => {
                let summary = self
                    .trace_exporter(format)
                    .export_capture(&self.capture, &path)?;
                return Ok(Some(StatusMessage::Exported { path, summary }));
            }
            TargetCommand::RequestCapture => {
                return Ok(Some(StatusMessage::Capture(self.capture.status())));
            }
            TargetCommand::ConfigureStage { .. } => {
                return Err(SocError::Unsupported {
                    target: self.name().to_string(),
                    command: "configure_stage".to_string(),
                });
            }
        }
        Ok(None)
    }

    fn capture_status(&self) -> Option<CaptureStatus> {
        Some(self.capture.status())
    }

    fn reset(&mut self) {
        self.uart.reset();
        self.mux.reset();
        self.console.reset();
        self.bridge.reset();
        self.capture.reset();
        self.switch = false;
        self.cycle = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureState;
    use crate::targets::bus_bridge::{CMD_READ, SYSID_VALUE};

    fn fast_config() -> EdidDebugConfig {
        EdidDebugConfig {
            clk_hz: 1_000,
            baud: 1_000,
            capture_depth: 8,
            ..EdidDebugConfig::default()
        }
    }

    #[test]
    fn test_console_selected_at_power_on() {
        let mut soc = EdidDebugSoc::new(fast_config()).unwrap();
        soc.uart_mut().inject(b"ident\r");
        soc.run(2_000).unwrap();
        let out = String::from_utf8(soc.uart_mut().take_transmitted()).unwrap();
        assert!(out.contains("ident\r\nsocscope edid debug\r\n"));
        assert_eq!(soc.bridge().stats().reads, 0);
    }

    #[test]
    fn test_switch_routes_to_bridge() {
        let mut soc = EdidDebugSoc::new(fast_config()).unwrap();
        soc.run(400).unwrap();
        soc.uart_mut().take_transmitted();
        soc.handle(TargetCommand::SetSwitch(true)).unwrap();
        soc.uart_mut().inject(&[CMD_READ, 1, 0, 0, 0, 0]);
        soc.run(400).unwrap();
        assert_eq!(soc.uart_mut().take_transmitted(), SYSID_VALUE.to_be_bytes());
        assert_eq!(soc.indicators(), vec![Indicator::new("led0", true)]);
        assert!(soc.console().history().is_empty());
    }

    #[test]
    fn test_capture_triggers_on_select() {
        let mut soc = EdidDebugSoc::new(fast_config()).unwrap();
        let term = soc.signal_term(SIG_UART_SEL, 1).unwrap();
        soc.handle(TargetCommand::AddTriggerPort(term.into())).unwrap();
        soc.handle(TargetCommand::Arm).unwrap();
        soc.run(20).unwrap();
        assert_eq!(soc.capture().state(), CaptureState::Armed);

        soc.set_switch(true).unwrap();
        soc.run(20).unwrap();
        assert_eq!(soc.capture().state(), CaptureState::Done);
        let layout = soc.capture().layout().clone();
        let sel = layout.index_of(SIG_UART_SEL).unwrap();
        let samples = soc.capture().drain().unwrap();
        assert_eq!(samples.len(), 8);
        assert!(samples.iter().all(|s| layout.value(*s, sel) == 1));
    }

    #[test]
    fn test_configure_stage_unsupported() {
        let mut soc = EdidDebugSoc::new(fast_config()).unwrap();
        let err = soc
            .handle(TargetCommand::ConfigureStage {
                stage: crate::pipeline::NodeId(0),
                key: "depth".into(),
                value: crate::pipeline::ConfigValue::Int(4),
            })
            .unwrap_err();
        assert!(matches!(err, SocError::Unsupported { .. }));
    }
}
