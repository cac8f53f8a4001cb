//! BufferStage - synchronous FIFO inside one clock domain.

use crate::pipeline::node::{StageContext, StageStats};
use crate::pipeline::packet::{Beat, ConfigValue};
use crate::pipeline::port::PortDescriptor;
use crate::stream::SendSlot;
use std::collections::VecDeque;

pub const DEFAULT_BUFFER_DEPTH: usize = 16;

/// Elastic buffer. Holds up to `depth` beats, counting the one presented
/// downstream.
pub struct BufferStage {
    ports: [PortDescriptor; 2],
    depth: usize,
    fifo: VecDeque<Beat>,
    slot: SendSlot<Beat>,
    high_water: usize,
    stats: StageStats,
}

impl BufferStage {
    /// # Panics
    /// If `depth` is zero.
    pub fn new(width: u32, depth: usize) -> Self {
        assert!(depth > 0, "buffer depth must be non-zero");
        Self {
            ports: [
                PortDescriptor::input("in", width),
                PortDescriptor::output("out", width),
            ],
            depth,
            fifo: VecDeque::with_capacity(depth),
            slot: SendSlot::new(),
            high_water: 0,
            stats: StageStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        "Buffer"
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    /// Beats held, including the one presented downstream.
    pub fn occupancy(&self) -> usize {
        self.fifo.len() + usize::from(!self.slot.is_empty())
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn high_water(&self) -> usize {
        self.high_water
    }

    pub fn decide(&mut self, ctx: &mut StageContext) {
        let room = self.occupancy() < self.depth;
        if let Some(input) = ctx.input(0) {
            input.set_ready(room);
        }
    }

    pub fn transfer(&mut self, ctx: &mut StageContext) {
        if self.slot.is_empty() {
            if let Some(beat) = self.fifo.pop_front() {
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

        if let Some(beat) = ctx.input(0).and_then(|input| input.take()) {
            self.fifo.push_back(beat);
            self.stats.beats_in += 1;
            self.high_water = self.high_water.max(self.occupancy());
        }
    }

    pub fn on_config_change(&mut self, key: &str, value: &ConfigValue) {
        match key {
            "depth" => match value.as_usize() {
                Some(depth) if depth > 0 => {
                    if depth < self.occupancy() {
                        tracing::warn!(
                            "Buffer: new depth {} below occupancy {}",
                            depth,
                            self.occupancy()
                        );
                    }
                    self.depth = depth;
                }
                _ => tracing::warn!("Buffer: invalid depth {:?}", value),
            },
            // The beat already presented downstream stays until it transfers.
            "flush" => {
                tracing::debug!("Buffer: flushed {} queued beats", self.fifo.len());
                self.fifo.clear();
            }
            _ => tracing::warn!("Buffer: unknown config key '{}'", key),
        }
    }

    pub fn on_reset(&mut self) {
        self.fifo.clear();
        self.slot.clear();
        self.high_water = 0;
        self.stats = StageStats::default();
    }

    pub fn stats(&self) -> StageStats {
        self.stats
    }
}
