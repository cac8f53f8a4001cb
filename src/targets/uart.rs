//! Serial transceiver stand-in.
//!
//! No bit framing: a byte takes `clk_hz * 10 / baud` cycles on the line in
//! either direction (start bit, eight data bits, stop bit), and the host side
//! is a pair of byte queues.

use crate::stream::{SendSlot, StreamEndpoint};
use serde::Serialize;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UartStats {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

pub struct UartPhy {
    cycles_per_byte: u64,
    host_rx: VecDeque<u8>,
    rx_slot: SendSlot<u8>,
    rx_countdown: u64,
    rx_data: u8,
    host_tx: Vec<u8>,
    tx_busy: u64,
    stats: UartStats,
}

impl UartPhy {
    pub fn new(clk_hz: u64, baud: u32) -> Self {
        let cycles_per_byte = (clk_hz * 10 / u64::from(baud.max(1))).max(1);
        Self {
            cycles_per_byte,
            host_rx: VecDeque::new(),
            rx_slot: SendSlot::new(),
            rx_countdown: 0,
            rx_data: 0,
            host_tx: Vec::new(),
            tx_busy: 0,
            stats: UartStats::default(),
        }
    }

    pub fn cycles_per_byte(&self) -> u64 {
        self.cycles_per_byte
    }

    /// Queue bytes sent by the host.
    pub fn inject(&mut self, bytes: &[u8]) {
        self.host_rx.extend(bytes);
    }

    /// Host bytes not yet delivered to the device.
    pub fn pending_rx(&self) -> usize {
        self.host_rx.len() + usize::from(!self.rx_slot.is_empty())
    }

    /// Everything the device transmitted since the last call.
    pub fn take_transmitted(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.host_tx)
    }

    /// Last byte presented on the receive stream.
    pub fn rx_data(&self) -> u8 {
        self.rx_data
    }

    pub fn stats(&self) -> UartStats {
        self.stats
    }

    /// Decide phase: the transmitter accepts a byte once the previous one has
    /// left the line.
    pub fn publish_ready(&mut self, tx: &mut StreamEndpoint<u8>) {
        self.tx_busy = self.tx_busy.saturating_sub(1);
        tx.set_ready(self.tx_busy == 0);
    }

    /// Transfer phase, producer side: present received bytes at line rate.
    pub fn produce(&mut self, rx: &mut StreamEndpoint<u8>) {
        self.rx_countdown = self.rx_countdown.saturating_sub(1);
        if self.rx_slot.is_empty() && self.rx_countdown == 0 {
            if let Some(byte) = self.host_rx.pop_front() {
                self.rx_slot.load(byte);
                self.rx_countdown = self.cycles_per_byte;
            }
        }
        if let Some(&byte) = self.rx_slot.peek() {
            self.rx_data = byte;
        }
        if self.rx_slot.drive(rx) {
            self.stats.rx_bytes += 1;
        }
    }

    /// Transfer phase, consumer side: collect a byte for the host.
    pub fn consume(&mut self, tx: &mut StreamEndpoint<u8>) {
        if let Some(byte) = tx.take() {
            self.host_tx.push(byte);
            self.tx_busy = self.cycles_per_byte;
            self.stats.tx_bytes += 1;
        }
    }

    pub fn reset(&mut self) {
        self.host_rx.clear();
        self.rx_slot.clear();
        self.rx_countdown = 0;
        self.rx_data = 0;
        self.host_tx.clear();
        self.tx_busy = 0;
        self.stats = UartStats::default();
    }
}
