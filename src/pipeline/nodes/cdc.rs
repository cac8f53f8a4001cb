//! Handshake adapters around a clock-domain queue.
//!
//! A crossing is a writer stage in the source domain and a reader stage in
//! the destination domain sharing one [`ClockDomainQueue`]. The writer only
//! publishes ready while the queue has room, so a failed write means the
//! handshake was bypassed and panics.
//!
//! [`ClockDomainQueue`]: crate::stream::ClockDomainQueue

use crate::pipeline::node::{StageContext, StageStats};
use crate::pipeline::packet::{Beat, ConfigValue};
use crate::pipeline::port::PortDescriptor;
use crate::stream::{QueueReader, QueueWriter, SendSlot};

/// Source-domain half of a clock crossing.
pub struct CdcWriterStage {
    name: String,
    ports: [PortDescriptor; 1],
    writer: QueueWriter<Beat>,
    stats: StageStats,
}

impl CdcWriterStage {
    pub fn new(name: impl Into<String>, width: u32, writer: QueueWriter<Beat>) -> Self {
        Self {
            name: name.into(),
            ports: [PortDescriptor::input("in", width)],
            writer,
            stats: StageStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    pub fn decide(&mut self, ctx: &mut StageContext) {
        let room = !self.writer.is_full();
        if let Some(input) = ctx.input(0) {
            input.set_ready(room);
        }
    }

    pub fn transfer(&mut self, ctx: &mut StageContext) {
        let Some(input) = ctx.input(0) else {
            return;
        };
        if let Some(beat) = input.take() {
            if self.writer.write(beat).is_err() {
                panic!("clock crossing '{}': write into a full queue", self.name);
            }
            self.stats.beats_in += 1;
            if beat.last {
                self.stats.packets += 1;
            }
        }
    }

    pub fn on_config_change(&mut self, key: &str, _value: &ConfigValue) {
        tracing::warn!("{}: unknown config key '{}'", self.name, key);
    }

    pub fn on_reset(&mut self) {
        self.stats = StageStats::default();
    }

    pub fn stats(&self) -> StageStats {
        self.stats
    }

    pub fn queued(&self) -> usize {
        self.writer.len()
    }

    pub fn capacity(&self) -> usize {
        self.writer.capacity()
    }
}

/// Destination-domain half of a clock crossing.
pub struct CdcReaderStage {
    name: String,
    ports: [PortDescriptor; 1],
    reader: QueueReader<Beat>,
    slot: SendSlot<Beat>,
    stats: StageStats,
}

impl CdcReaderStage {
    pub fn new(name: impl Into<String>, width: u32, reader: QueueReader<Beat>) -> Self {
        Self {
            name: name.into(),
            ports: [PortDescriptor::output("out", width)],
            reader,
            slot: SendSlot::new(),
            stats: StageStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    pub fn decide(&mut self, _ctx: &mut StageContext) {}

    pub fn transfer(&mut self, ctx: &mut StageContext) {
        if self.slot.is_empty() {
            if let Some(beat) = self.reader.read() {
                self.stats.beats_in += 1;
                self.slot.load(beat);
            }
        }
        let last = self.slot.peek().is_some_and(|b| b.last);
        if let Some(out) = ctx.output(0) {
            if self.slot.drive(out) {
                self.stats.beats_out += 1;
                if last {
                    self.stats.packets += 1;
                }
            }
        }
    }

    pub fn on_config_change(&mut self, key: &str, _value: &ConfigValue) {
        tracing::warn!("{}: unknown config key '{}'", self.name, key);
    }

    /// Drops the held beat and everything still queued.
    pub fn on_reset(&mut self) {
        self.slot.clear();
        while self.reader.read().is_some() {}
        self.stats = StageStats::default();
    }

    pub fn stats(&self) -> StageStats {
        self.stats
    }

    pub fn queued(&self) -> usize {
        self.reader.len()
    }
}
