//! HDMI-to-Ethernet streamer.
//!
//! ```text
//!  sys                        │ encoder
//!  DmaReader ─► CdcWriter ══ queue ══► CdcReader ─► Buffer ─► Encoder ─► UdpStreamer
//! ```
//!
//! Two board LEDs mirror the valid and ready levels of the DMA reader's output:
//! led0 is lit while the DMA offers data, led1 while the crossing accepts it.

use crate::error::{Result, ResultExt, SocError};
use crate::pipeline::nodes::{
    BufferStage, DatagramSink, DmaReaderStage, EncoderStage, StreamerStats, UdpSocketSink,
    UdpStreamerStage, DEFAULT_BUFFER_DEPTH, DEFAULT_MAX_PAYLOAD,
};
use crate::pipeline::{BuiltinStage, DomainId, Indicator, IndicatorSource, LinkId, NodeId, Pipeline};
use crate::runtime::{StatusMessage, Target, TargetCommand};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hdmi2EthConfig {
    pub sys_clk_hz: u64,
    pub encoder_clk_hz: u64,
    pub width: u32,
    pub crossing_capacity: usize,
    pub buffer_depth: usize,
    pub encoder_latency: u64,
    /// Words of the test frame the DMA reader replays.
    pub frame_words: usize,
    pub repeat: bool,
    pub max_payload: usize,
    pub bind: String,
    pub peer: String,
}

impl Default for Hdmi2EthConfig {
    fn default() -> Self {
        Self {
            sys_clk_hz: 100_000_000,
            encoder_clk_hz: 74_250_000,
            width: 128,
            crossing_capacity: 4,
            buffer_depth: DEFAULT_BUFFER_DEPTH,
            encoder_latency: 4,
            frame_words: 1024,
            repeat: true,
            max_payload: DEFAULT_MAX_PAYLOAD,
            bind: "0.0.0.0:0".to_string(),
            peer: "192.168.1.15:11112".to_string(),
        }
    }
}

/// Deterministic frame contents: word `i` repeats the 16-bit index across the word.
pub fn test_pattern(words: usize, width: u32) -> Vec<u128> {
    let mask = crate::capture::layout::width_mask(width);
    (0..words)
        .map(|i| ((i as u128 & 0xffff) * 0x0001_0001_0001_0001_0001_0001_0001_0001) & mask)
        .collect()
}

fn period_ps(hz: u64) -> u64 {
    (1_000_000_000_000 / hz.max(1)).max(1)
}

/// Stage handles of the built pipeline.
#[derive(Debug, Clone, Copy)]
pub struct Hdmi2EthStages {
    pub sys: DomainId,
    pub encoder_domain: DomainId,
    pub dma: NodeId,
    pub writer: NodeId,
    pub reader: NodeId,
    pub buffer: NodeId,
    pub encoder: NodeId,
    pub streamer: NodeId,
    pub dma_link: LinkId,
}

/// Wire the streaming pipeline around `sink`.
pub fn build_pipeline(
    config: &Hdmi2EthConfig,
    memory: Vec<u128>,
    sink: Box<dyn DatagramSink>,
) -> Result<(Pipeline, Hdmi2EthStages)> {
    let width = config.width;
    let mut p = Pipeline::new("hdmi2eth");
    let sys = p.add_domain("sys", period_ps(config.sys_clk_hz))?;
    let encoder_domain = p.add_domain("encoder", period_ps(config.encoder_clk_hz))?;

    let dma = p.add_stage(
        DmaReaderStage::new(memory, width).with_repeat(config.repeat),
        sys,
    )?;
    let (writer, reader) =
        p.add_clock_crossing(config.crossing_capacity, width, sys, encoder_domain)?;
    let buffer = p.add_stage(
        BufferStage::new(width, config.buffer_depth.max(1)),
        encoder_domain,
    )?;
    let encoder = p.add_stage(
        EncoderStage::new(width, config.encoder_latency),
        encoder_domain,
    )?;
    let streamer = p.add_stage(
        UdpStreamerStage::new(width, sink).with_max_payload(config.max_payload),
        encoder_domain,
    )?;

    let dma_link = p.connect(dma, "out", writer, "in")?;
    p.connect(reader, "out", buffer, "in")?;
    p.connect(buffer, "out", encoder, "in")?;
    p.connect(encoder, "out", streamer, "in")?;
    p.add_indicator("led0", dma_link, IndicatorSource::Valid)?;
    p.add_indicator("led1", dma_link, IndicatorSource::Ready)?;
    p.compile()?;

    Ok((
        p,
        Hdmi2EthStages {
            sys,
            encoder_domain,
            dma,
            writer,
            reader,
            buffer,
            encoder,
            streamer,
            dma_link,
        },
    ))
}

pub struct Hdmi2EthSoc {
    pipeline: Pipeline,
    stages: Hdmi2EthStages,
}

impl Hdmi2EthSoc {
    /// Stream the test pattern to the configured UDP peer.
    pub fn new(config: Hdmi2EthConfig) -> Result<Self> {
        let sink = UdpSocketSink::new(config.bind.as_str(), config.peer.as_str())
            .with_context(|| format!("opening UDP socket {} -> {}", config.bind, config.peer))?;
        tracing::info!(peer = %sink.peer(), "streaming to UDP peer");
        Self::with_sink(config, Box::new(sink))
    }

    pub fn with_sink(config: Hdmi2EthConfig, sink: Box<dyn DatagramSink>) -> Result<Self> {
        let memory = test_pattern(config.frame_words, config.width);
        let (pipeline, stages) = build_pipeline(&config, memory, sink)?;
        Ok(Self { pipeline, stages })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn stages(&self) -> &Hdmi2EthStages {
        &self.stages
    }

    pub fn run(&mut self, cycles: u64) -> Result<()> {
        self.pipeline.run_cycles(self.stages.sys, cycles)?;
        Ok(())
    }

    pub fn streamer_stats(&self) -> Option<StreamerStats> {
        match self.pipeline.stage(self.stages.streamer)?.as_builtin()? {
            BuiltinStage::UdpStreamer(s) => Some(s.tx_stats()),
            _ => None,
        }
    }

    fn unsupported(&self, command: &str) -> SocError {
        SocError::Unsupported {
            target: self.name().to_string(),
            command: command.to_string(),
        }
    }
}

impl Target for Hdmi2EthSoc {
    fn name(&self) -> &str {
        "hdmi2eth"
    }

    fn step(&mut self) -> Result<()> {
        self.run(1)
    }

    fn cycle(&self) -> u64 {
        self.pipeline.domain_cycles(self.stages.sys)
    }

    fn indicators(&self) -> Vec<Indicator> {
        self.pipeline.indicators()
    }

    fn handle(&mut self, cmd: TargetCommand) -> Result<Option<StatusMessage>> {
        match cmd {
            TargetCommand::ConfigureStage { stage, key, value } => {
                self.pipeline.configure_stage(stage, &key, &value)?;
                Ok(None)
            }
            TargetCommand::SetSwitch(_) => Err(self.unsupported("set_switch")),
            TargetCommand::InjectRx(_) | TargetCommand::TakeTx => Err(self.unsupported("uart")),
            TargetCommand::AddTriggerPort(_)
            | TargetCommand::ConfigureTrigger { .. }
            | TargetCommand::ClearTrigger
            | TargetCommand::SetSubsample(_)
            | TargetCommand::Arm
            | TargetCommand::Export { .. }
            | TargetCommand::RequestCapture => Err(self.unsupported("capture")),
        }
    }

    fn reset(&mut self) {
        self.pipeline.reset();
    }
}
