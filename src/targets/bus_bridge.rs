//! UART-to-register-bus bridge.
//!
//! Framing, all multi-byte fields big-endian:
//!
//! ```text
//! write: 0x01 <len> <addr:4> <word:4> * len
//! read:  0x02 <len> <addr:4>          -> <word:4> * len
//! ```
//!
//! Addresses are word addresses and auto-increment after every word. A frame
//! that stalls mid-header for longer than the timeout is abandoned.

use super::ByteAgent;
use crate::stream::{SendSlot, StreamEndpoint};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

pub const CMD_WRITE: u8 = 0x01;
pub const CMD_READ: u8 = 0x02;

pub const SYSID_ADDR: u32 = 0;
pub const REVISION_ADDR: u32 = 1;
pub const FREQUENCY_ADDR: u32 = 2;

/// "scop"
pub const SYSID_VALUE: u32 = 0x7363_6f70;
pub const REVISION_VALUE: u32 = 1;

/// Word-addressed register bus behind the bridge.
#[cfg_attr(test, mockall::automock)]
pub trait RegisterBus: Send {
    fn read(&mut self, addr: u32) -> u32;
    fn write(&mut self, addr: u32, value: u32);
}

/// Scratch register space with read-only identification registers.
/// Unmapped addresses read as zero.
#[derive(Debug, Clone, Default)]
pub struct RegisterFile {
    words: BTreeMap<u32, u32>,
    read_only: BTreeSet<u32>,
}

impl RegisterFile {
    pub fn new(clk_hz: u64) -> Self {
        let mut file = Self::default();
        file.preload(SYSID_ADDR, SYSID_VALUE);
        file.preload(REVISION_ADDR, REVISION_VALUE);
        file.preload(FREQUENCY_ADDR, u32::try_from(clk_hz).unwrap_or(u32::MAX));
        file
    }

    /// Map a read-only register.
    pub fn preload(&mut self, addr: u32, value: u32) {
        self.words.insert(addr, value);
        self.read_only.insert(addr);
    }

    pub fn peek(&self, addr: u32) -> u32 {
        self.words.get(&addr).copied().unwrap_or(0)
    }
}

impl RegisterBus for RegisterFile {
    fn read(&mut self, addr: u32) -> u32 {
        self.peek(addr)
    }

    fn write(&mut self, addr: u32, value: u32) {
        if self.read_only.contains(&addr) {
            tracing::debug!(addr, value, "write to read-only register ignored");
            return;
        }
        self.words.insert(addr, value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BridgeState {
    Idle,
    ReceiveLength,
    ReceiveAddress,
    ReceiveData,
    WriteData,
    ReadData,
    SendData,
}

impl BridgeState {
    /// 4-bit encoding used by the capture layout.
    pub fn code(self) -> u8 {
        match self {
            BridgeState::Idle => 0,
            BridgeState::ReceiveLength => 1,
            BridgeState::ReceiveAddress => 2,
            BridgeState::ReceiveData => 3,
            BridgeState::WriteData => 4,
            BridgeState::ReadData => 5,
            BridgeState::SendData => 6,
        }
    }

    fn is_receiving(self) -> bool {
        matches!(
            self,
            BridgeState::Idle
                | BridgeState::ReceiveLength
                | BridgeState::ReceiveAddress
                | BridgeState::ReceiveData
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    pub reads: u64,
    pub writes: u64,
    pub timeouts: u64,
    pub unknown_commands: u64,
}

pub struct BusBridge {
    bus: Box<dyn RegisterBus>,
    state: BridgeState,
    is_write: bool,
    remaining: u8,
    addr: u32,
    shift: u32,
    bytes: u8,
    idle_cycles: u64,
    timeout: u64,
    response: VecDeque<u8>,
    tx_slot: SendSlot<u8>,
    stats: BridgeStats,
}

impl BusBridge {
    /// `timeout` is in cycles; zero disables it.
    pub fn new(bus: Box<dyn RegisterBus>, timeout: u64) -> Self {
        Self {
            bus,
            state: BridgeState::Idle,
            is_write: false,
            remaining: 0,
            addr: 0,
            shift: 0,
            bytes: 0,
            idle_cycles: 0,
            timeout,
            response: VecDeque::new(),
            tx_slot: SendSlot::new(),
            stats: BridgeStats::default(),
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn state_code(&self) -> u8 {
        self.state.code()
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    pub fn bus_mut(&mut self) -> &mut dyn RegisterBus {
        self.bus.as_mut()
    }

    fn enter(&mut self, state: BridgeState) {
        self.state = state;
        self.shift = 0;
        self.bytes = 0;
        self.idle_cycles = 0;
    }

    /// Accumulate a big-endian word. True once four bytes are in.
    fn shift_in(&mut self, byte: u8) -> bool {
        self.shift = (self.shift << 8) | u32::from(byte);
        self.bytes += 1;
        self.bytes == 4
    }

    fn receive(&mut self, byte: u8) {
        self.idle_cycles = 0;
        match self.state {
            BridgeState::Idle => match byte {
                CMD_WRITE | CMD_READ => {
                    self.is_write = byte == CMD_WRITE;
                    self.enter(BridgeState::ReceiveLength);
                }
                other => {
                    self.stats.unknown_commands += 1;
                    tracing::debug!(cmd = other, "bridge ignored unknown command");
                }
            },
            BridgeState::ReceiveLength => {
                self.remaining = byte;
                self.enter(BridgeState::ReceiveAddress);
            }
            BridgeState::ReceiveAddress => {
                if self.shift_in(byte) {
                    self.addr = self.shift;
                    let next = match (self.remaining, self.is_write) {
                        (0, _) => BridgeState::Idle,
                        (_, true) => BridgeState::ReceiveData,
                        (_, false) => BridgeState::ReadData,
                    };
                    self.enter(next);
                }
            }
            BridgeState::ReceiveData => {
                if self.shift_in(byte) {
                    let word = self.shift;
                    self.enter(BridgeState::WriteData);
                    self.shift = word;
                }
            }
            // Ready is low in the bus states.
            BridgeState::WriteData | BridgeState::ReadData | BridgeState::SendData => {}
        }
    }

    /// One bus-side step for states that do not wait on the line.
    fn advance(&mut self) {
        match self.state {
            BridgeState::WriteData => {
                self.bus.write(self.addr, self.shift);
                self.stats.writes += 1;
                self.addr = self.addr.wrapping_add(1);
                self.remaining -= 1;
                let next = if self.remaining == 0 {
                    BridgeState::Idle
                } else {
                    BridgeState::ReceiveData
                };
                self.enter(next);
            }
            BridgeState::ReadData => {
                let word = self.bus.read(self.addr);
                self.stats.reads += 1;
                self.response.extend(word.to_be_bytes());
                self.addr = self.addr.wrapping_add(1);
                self.enter(BridgeState::SendData);
            }
            BridgeState::SendData if self.response.is_empty() && self.tx_slot.is_empty() => {
                self.remaining -= 1;
                let next = if self.remaining == 0 {
                    BridgeState::Idle
                } else {
                    BridgeState::ReadData
                };
                self.enter(next);
            }
            BridgeState::ReceiveLength | BridgeState::ReceiveAddress | BridgeState::ReceiveData => {
                self.idle_cycles += 1;
                if self.timeout > 0 && self.idle_cycles >= self.timeout {
                    tracing::warn!(state = ?self.state, "bridge frame timed out");
                    self.stats.timeouts += 1;
                    self.enter(BridgeState::Idle);
                }
            }
            BridgeState::Idle | BridgeState::SendData => {}
        }
    }
}

impl ByteAgent for BusBridge {
    fn name(&self) -> &str {
        "bridge"
    }

    fn publish_ready(&mut self, rx: &mut StreamEndpoint<u8>) {
        rx.set_ready(self.state.is_receiving());
    }

    fn produce(&mut self, tx: &mut StreamEndpoint<u8>) {
        if self.tx_slot.is_empty() {
            if let Some(byte) = self.response.pop_front() {
                self.tx_slot.load(byte);
            }
        }
        self.tx_slot.drive(tx);
    }

    fn consume(&mut self, rx: &mut StreamEndpoint<u8>) {
        match rx.take() {
            Some(byte) => self.receive(byte),
            None => self.advance(),
        }
    }

    fn reset(&mut self) {
        self.enter(BridgeState::Idle);
        self.remaining = 0;
        self.addr = 0;
        self.response.clear();
        self.tx_slot.clear();
        self.stats = BridgeStats::default();
    }
}
