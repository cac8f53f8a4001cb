//! Hand-written doubles for the register bus and datagram sink seams

use socscope::pipeline::nodes::DatagramSink;
use socscope::targets::RegisterBus;
use std::io;
use std::sync::{Arc, Mutex};

/// One bus transaction seen by [`RecordingBus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusAccess {
    Read(u32),
    Write(u32, u32),
}

/// Register bus that returns `addr ^ 0xa5a5_a5a5` and records every access
#[derive(Clone, Default)]
pub struct RecordingBus {
    log: Arc<Mutex<Vec<BusAccess>>>,
}

impl RecordingBus {
    pub fn accesses(&self) -> Vec<BusAccess> {
        self.log.lock().unwrap().clone()
    }
}

impl RegisterBus for RecordingBus {
    fn read(&mut self, addr: u32) -> u32 {
        self.log.lock().unwrap().push(BusAccess::Read(addr));
        addr ^ 0xa5a5_a5a5
    }

    fn write(&mut self, addr: u32, value: u32) {
        self.log.lock().unwrap().push(BusAccess::Write(addr, value));
    }
}

/// Datagram sink that fails every `period`-th send and keeps the rest
#[derive(Clone)]
pub struct FlakySink {
    period: usize,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    attempts: usize,
}

impl FlakySink {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            sent: Arc::default(),
            attempts: 0,
        }
    }

    pub fn delivered(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }
}

impl DatagramSink for FlakySink {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.attempts += 1;
        if self.attempts % self.period == 0 {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "injected failure"));
        }
        self.sent.lock().unwrap().push(datagram.to_vec());
        Ok(())
    }
}
