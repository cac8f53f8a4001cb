//! Encoder stage - fixed-latency stand-in for the video codec.
//!
//! Beats pass through unchanged after `latency` cycles. Optional XOR
//! whitening makes the transform visible on the wire without modelling a
//! real codec.

use crate::capture::layout::width_mask;
use crate::pipeline::node::{StageContext, StageStats};
use crate::pipeline::packet::{Beat, ConfigValue};
use crate::pipeline::port::PortDescriptor;
use crate::stream::SendSlot;
use std::collections::VecDeque;

pub struct EncoderStage {
    ports: [PortDescriptor; 2],
    latency: u64,
    whitening: u128,
    /// Accepted beats with the cycle they become presentable.
    pipe: VecDeque<(Beat, u64)>,
    slot: SendSlot<Beat>,
    stats: StageStats,
}

impl EncoderStage {
    /// `latency` is clamped to at least one cycle.
    pub fn new(width: u32, latency: u64) -> Self {
        Self {
            ports: [
                PortDescriptor::input("in", width),
                PortDescriptor::output("out", width),
            ],
            latency: latency.max(1),
            whitening: 0,
            pipe: VecDeque::new(),
            slot: SendSlot::new(),
            stats: StageStats::default(),
        }
    }

    pub fn with_whitening(mut self, key: u128) -> Self {
        self.whitening = key;
        self
    }

    pub fn name(&self) -> &str {
        "Encoder"
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    pub fn latency(&self) -> u64 {
        self.latency
    }

    fn pipe_capacity(&self) -> usize {
        self.latency as usize + 1
    }

    pub fn decide(&mut self, ctx: &mut StageContext) {
        let room = self.pipe.len() < self.pipe_capacity();
        if let Some(input) = ctx.input(0) {
            input.set_ready(room);
        }
    }

    pub fn transfer(&mut self, ctx: &mut StageContext) {
        let cycle = ctx.cycle;
        if self.slot.is_empty() {
            if let Some(&(beat, due)) = self.pipe.front() {
                if due <= cycle {
                    self.pipe.pop_front();
                    self.slot.load(beat);
                }
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
            let mask = width_mask(self.ports[1].width);
            let encoded = Beat {
                data: (beat.data ^ self.whitening) & mask,
                last: beat.last,
            };
            self.pipe.push_back((encoded, cycle + self.latency));
            self.stats.beats_in += 1;
        }
    }

    pub fn on_config_change(&mut self, key: &str, value: &ConfigValue) {
        match key {
            "latency" => {
                if let Some(latency) = value.as_int().and_then(|v| u64::try_from(v).ok()) {
                    self.latency = latency.max(1);
                }
            }
            "whitening" => {
                if let Some(key) = value.as_int().and_then(|v| u128::try_from(v).ok()) {
                    self.whitening = key;
                }
            }
            _ => tracing::warn!("Encoder: unknown config key '{}'", key),
        }
    }

    pub fn on_reset(&mut self) {
        self.pipe.clear();
        self.slot.clear();
        self.stats = StageStats::default();
    }

    pub fn stats(&self) -> StageStats {
        self.stats
    }
}
