//! DmaReader stage - streams a frame out of memory.
//!
//! Reads `length` words starting at `base` and presents one word per beat,
//! marking the final word of the frame with `last`. With `repeat` set the
//! frame restarts immediately, like a scanout engine.

use crate::capture::layout::width_mask;
use crate::pipeline::node::{StageContext, StageStats};
use crate::pipeline::packet::{Beat, ConfigValue};
use crate::pipeline::port::PortDescriptor;
use crate::stream::SendSlot;

pub struct DmaReaderStage {
    ports: [PortDescriptor; 1],
    memory: Vec<u128>,
    base: usize,
    length: usize,
    cursor: usize,
    enabled: bool,
    repeat: bool,
    slot: SendSlot<Beat>,
    frames: u64,
    stats: StageStats,
}

impl DmaReaderStage {
    /// Reader over `memory`, emitting `width`-bit beats. The frame spans the
    /// whole memory until narrowed with [`with_frame`](Self::with_frame).
    pub fn new(memory: Vec<u128>, width: u32) -> Self {
        let mask = width_mask(width);
        let memory: Vec<u128> = memory.into_iter().map(|w| w & mask).collect();
        let length = memory.len();
        Self {
            ports: [PortDescriptor::output("out", width)],
            memory,
            base: 0,
            length,
            cursor: 0,
            enabled: true,
            repeat: false,
            slot: SendSlot::new(),
            frames: 0,
            stats: StageStats::default(),
        }
    }

    pub fn with_frame(mut self, base: usize, length: usize) -> Self {
        self.set_frame(base, length);
        self
    }

    pub fn with_repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    /// Clamp the frame to the backing memory and restart it.
    fn set_frame(&mut self, base: usize, length: usize) {
        self.base = base.min(self.memory.len());
        self.length = length.min(self.memory.len() - self.base);
        self.cursor = 0;
    }

    pub fn name(&self) -> &str {
        "DmaReader"
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    pub fn decide(&mut self, _ctx: &mut StageContext) {}

    pub fn transfer(&mut self, ctx: &mut StageContext) {
        if self.slot.is_empty() && self.enabled && self.cursor < self.length {
            let word = self.memory[self.base + self.cursor];
            self.cursor += 1;
            let beat = if self.cursor == self.length {
                self.frames += 1;
                if self.repeat {
                    self.cursor = 0;
                }
                Beat::last(word)
            } else {
                Beat::new(word)
            };
            self.slot.load(beat);
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

    pub fn on_config_change(&mut self, key: &str, value: &ConfigValue) {
        match key {
            "enabled" => {
                if let Some(b) = value.as_bool() {
                    self.enabled = b;
                }
            }
            "repeat" => {
                if let Some(b) = value.as_bool() {
                    self.repeat = b;
                }
            }
            "base" => {
                if let Some(base) = value.as_usize() {
                    self.set_frame(base, self.length);
                }
            }
            "length" => {
                if let Some(length) = value.as_usize() {
                    self.set_frame(self.base, length);
                }
            }
            "restart" => self.cursor = 0,
            _ => tracing::warn!("DmaReader: unknown config key '{}'", key),
        }
    }

    pub fn on_reset(&mut self) {
        self.cursor = 0;
        self.frames = 0;
        self.slot.clear();
        self.stats = StageStats::default();
    }

    pub fn stats(&self) -> StageStats {
        self.stats
    }

    /// Frames read out of memory so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// True once a non-repeating frame has been fully handed downstream.
    pub fn is_finished(&self) -> bool {
        !self.repeat && self.cursor >= self.length && self.slot.is_empty()
    }

    pub fn frame(&self) -> (usize, usize) {
        (self.base, self.length)
    }
}
