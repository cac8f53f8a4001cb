//! Stage abstraction for the pipeline.
//!
//! Two-layer design:
//! - **`StagePlugin` trait** - for user-defined stages.
//! - **`BuiltinStage` enum** - for the built-in stages. Match arms are
//!   inlined, so the per-cycle hot path has no dynamic dispatch.
//!
//! `AnyStage` wraps either variant so the pipeline can handle both uniformly.
//!
//! Each stage runs twice per cycle of its clock domain: `decide` (publish
//! ready on inputs, downstream stages first) then `transfer` (move payloads,
//! upstream stages first).

use crate::pipeline::executor::Link;
use crate::pipeline::id::{DomainId, LinkId};
use crate::pipeline::packet::{Beat, ConfigValue};
use crate::pipeline::port::PortDescriptor;
use crate::stream::StreamEndpoint;
use serde::Serialize;

/// Context passed to stage hooks each cycle.
pub struct StageContext<'a> {
    links: &'a mut [Link],
    inputs: &'a [Option<LinkId>],
    outputs: &'a [Option<LinkId>],
    /// Domain the stage is clocked by.
    pub domain: DomainId,
    /// Cycle number within that domain (1-based: the first edge is cycle 1).
    pub cycle: u64,
}

impl<'a> StageContext<'a> {
    pub(crate) fn new(
        links: &'a mut [Link],
        inputs: &'a [Option<LinkId>],
        outputs: &'a [Option<LinkId>],
        domain: DomainId,
        cycle: u64,
    ) -> Self {
        Self {
            links,
            inputs,
            outputs,
            domain,
            cycle,
        }
    }

    /// Endpoint connected to input port `port`, if linked.
    pub fn input(&mut self, port: usize) -> Option<&mut StreamEndpoint<Beat>> {
        let id = (*self.inputs.get(port)?)?;
        Some(&mut self.links[id.index()].endpoint)
    }

    /// Endpoint connected to output port `port`, if linked.
    pub fn output(&mut self, port: usize) -> Option<&mut StreamEndpoint<Beat>> {
        let id = (*self.outputs.get(port)?)?;
        Some(&mut self.links[id.index()].endpoint)
    }
}

/// Beat counters reported by every stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageStats {
    pub beats_in: u64,
    pub beats_out: u64,
    /// Packets completed (beats with `last` set) on the output side.
    pub packets: u64,
}

/// Trait for pluggable/user-defined stages.
pub trait StagePlugin: Send {
    /// Human-readable name of this stage.
    fn name(&self) -> &str;

    /// Port descriptors for this stage.
    fn ports(&self) -> &[PortDescriptor];

    /// Publish ready on input ports.
    fn decide(&mut self, _ctx: &mut StageContext) {}

    /// Move payloads.
    fn transfer(&mut self, ctx: &mut StageContext);

    /// Called when a config value changes.
    fn on_config_change(&mut self, _key: &str, _value: &ConfigValue) {}

    /// Drop internal state back to power-on.
    fn on_reset(&mut self) {}

    fn stats(&self) -> StageStats {
        StageStats::default()
    }
}

use crate::pipeline::nodes::{
    BufferStage, CdcReaderStage, CdcWriterStage, DmaReaderStage, EncoderStage, UdpStreamerStage,
};

/// Enum dispatch for built-in stages.
pub enum BuiltinStage {
    DmaReader(DmaReaderStage),
    CdcWriter(CdcWriterStage),
    CdcReader(CdcReaderStage),
    Buffer(BufferStage),
    Encoder(EncoderStage),
    UdpStreamer(UdpStreamerStage),
}

impl BuiltinStage {
    pub fn name(&self) -> &str {
        match self {
            BuiltinStage::DmaReader(n) => n.name(),
            BuiltinStage::CdcWriter(n) => n.name(),
            BuiltinStage::CdcReader(n) => n.name(),
            BuiltinStage::Buffer(n) => n.name(),
            BuiltinStage::Encoder(n) => n.name(),
            BuiltinStage::UdpStreamer(n) => n.name(),
        }
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        match self {
            BuiltinStage::DmaReader(n) => n.ports(),
            BuiltinStage::CdcWriter(n) => n.ports(),
            BuiltinStage::CdcReader(n) => n.ports(),
            BuiltinStage::Buffer(n) => n.ports(),
            BuiltinStage::Encoder(n) => n.ports(),
            BuiltinStage::UdpStreamer(n) => n.ports(),
        }
    }

    pub fn decide(&mut self, ctx: &mut StageContext) {
        match self {
            BuiltinStage::DmaReader(n) => n.decide(ctx),
            BuiltinStage::CdcWriter(n) => n.decide(ctx),
            BuiltinStage::CdcReader(n) => n.decide(ctx),
            BuiltinStage::Buffer(n) => n.decide(ctx),
            BuiltinStage::Encoder(n) => n.decide(ctx),
            BuiltinStage::UdpStreamer(n) => n.decide(ctx),
        }
    }

    pub fn transfer(&mut self, ctx: &mut StageContext) {
        match self {
            BuiltinStage::DmaReader(n) => n.transfer(ctx),
            BuiltinStage::CdcWriter(n) => n.transfer(ctx),
            BuiltinStage::CdcReader(n) => n.transfer(ctx),
            BuiltinStage::Buffer(n) => n.transfer(ctx),
            BuiltinStage::Encoder(n) => n.transfer(ctx),
            BuiltinStage::UdpStreamer(n) => n.transfer(ctx),
        }
    }

    pub fn on_config_change(&mut self, key: &str, value: &ConfigValue) {
        match self {
            BuiltinStage::DmaReader(n) => n.on_config_change(key, value),
            BuiltinStage::CdcWriter(n) => n.on_config_change(key, value),
            BuiltinStage::CdcReader(n) => n.on_config_change(key, value),
            BuiltinStage::Buffer(n) => n.on_config_change(key, value),
            BuiltinStage::Encoder(n) => n.on_config_change(key, value),
            BuiltinStage::UdpStreamer(n) => n.on_config_change(key, value),
        }
    }

    pub fn on_reset(&mut self) {
        match self {
            BuiltinStage::DmaReader(n) => n.on_reset(),
            BuiltinStage::CdcWriter(n) => n.on_reset(),
            BuiltinStage::CdcReader(n) => n.on_reset(),
            BuiltinStage::Buffer(n) => n.on_reset(),
            BuiltinStage::Encoder(n) => n.on_reset(),
            BuiltinStage::UdpStreamer(n) => n.on_reset(),
        }
    }

    pub fn stats(&self) -> StageStats {
        match self {
            BuiltinStage::DmaReader(n) => n.stats(),
            BuiltinStage::CdcWriter(n) => n.stats(),
            BuiltinStage::CdcReader(n) => n.stats(),
            BuiltinStage::Buffer(n) => n.stats(),
            BuiltinStage::Encoder(n) => n.stats(),
            BuiltinStage::UdpStreamer(n) => n.stats(),
        }
    }
}

/// Wrapper that holds either a built-in stage (enum dispatch) or a plugin (trait object).
pub enum AnyStage {
    Builtin(BuiltinStage),
    Plugin(Box<dyn StagePlugin>),
}

impl AnyStage {
    pub fn name(&self) -> &str {
        match self {
            AnyStage::Builtin(n) => n.name(),
            AnyStage::Plugin(n) => n.name(),
        }
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        match self {
            AnyStage::Builtin(n) => n.ports(),
            AnyStage::Plugin(n) => n.ports(),
        }
    }

    pub fn decide(&mut self, ctx: &mut StageContext) {
        match self {
            AnyStage::Builtin(n) => n.decide(ctx),
            AnyStage::Plugin(n) => n.decide(ctx),
        }
    }

    pub fn transfer(&mut self, ctx: &mut StageContext) {
        match self {
            AnyStage::Builtin(n) => n.transfer(ctx),
            AnyStage::Plugin(n) => n.transfer(ctx),
        }
    }

    pub fn on_config_change(&mut self, key: &str, value: &ConfigValue) {
        match self {
            AnyStage::Builtin(n) => n.on_config_change(key, value),
            AnyStage::Plugin(n) => n.on_config_change(key, value),
        }
    }

    pub fn on_reset(&mut self) {
        match self {
            AnyStage::Builtin(n) => n.on_reset(),
            AnyStage::Plugin(n) => n.on_reset(),
        }
    }

    pub fn stats(&self) -> StageStats {
        match self {
            AnyStage::Builtin(n) => n.stats(),
            AnyStage::Plugin(n) => n.stats(),
        }
    }

    pub fn as_builtin(&self) -> Option<&BuiltinStage> {
        match self {
            AnyStage::Builtin(n) => Some(n),
            AnyStage::Plugin(_) => None,
        }
    }
}

impl From<BuiltinStage> for AnyStage {
    fn from(stage: BuiltinStage) -> Self {
        AnyStage::Builtin(stage)
    }
}

impl From<Box<dyn StagePlugin>> for AnyStage {
    fn from(stage: Box<dyn StagePlugin>) -> Self {
        AnyStage::Plugin(stage)
    }
}

macro_rules! builtin_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for AnyStage {
                fn from(stage: $ty) -> Self {
                    AnyStage::Builtin(BuiltinStage::$variant(stage))
                }
            }
        )*
    };
}

builtin_from!(
    DmaReader(DmaReaderStage),
    CdcWriter(CdcWriterStage),
    CdcReader(CdcReaderStage),
    Buffer(BufferStage),
    Encoder(EncoderStage),
    UdpStreamer(UdpStreamerStage),
);
