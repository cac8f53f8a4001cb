//! UdpStreamer stage - packs beats into datagrams.
//!
//! Each beat contributes `ceil(width / 8)` bytes, most significant byte
//! first. A datagram is flushed when the next beat would overflow the
//! payload limit or when a beat carries `last`. Header construction is the
//! sink's business.

use crate::pipeline::node::{StageContext, StageStats};
use crate::pipeline::packet::{Beat, ConfigValue};
use crate::pipeline::port::PortDescriptor;
use crossbeam_channel::{Receiver, Sender};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

/// Largest UDP payload that fits an Ethernet frame without fragmentation.
pub const DEFAULT_MAX_PAYLOAD: usize = 1472;

/// Destination for finished datagrams.
#[cfg_attr(test, mockall::automock)]
pub trait DatagramSink: Send {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()>;
}

/// Sends datagrams to a fixed peer over a std `UdpSocket`.
pub struct UdpSocketSink {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UdpSocketSink {
    pub fn new(bind: impl ToSocketAddrs, peer: impl ToSocketAddrs) -> io::Result<Self> {
        let socket = UdpSocket::bind(bind)?;
        let peer = peer
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no peer address"))?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket, peer })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl DatagramSink for UdpSocketSink {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.socket.send_to(datagram, self.peer).map(|_| ())
    }
}

/// In-process sink: every datagram goes down a crossbeam channel.
pub struct ChannelSink {
    tx: Sender<Vec<u8>>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<Vec<u8>>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl DatagramSink for ChannelSink {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.tx
            .send(datagram.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "datagram receiver dropped"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamerStats {
    pub datagrams: u64,
    pub bytes: u64,
    pub send_errors: u64,
}

pub struct UdpStreamerStage {
    ports: [PortDescriptor; 1],
    bytes_per_beat: usize,
    max_payload: usize,
    pending: Vec<u8>,
    sink: Box<dyn DatagramSink>,
    stats: StageStats,
    tx: StreamerStats,
}

impl UdpStreamerStage {
    pub fn new(width: u32, sink: Box<dyn DatagramSink>) -> Self {
        let bytes_per_beat = (width as usize).div_ceil(8);
        Self {
            ports: [PortDescriptor::input("in", width)],
            bytes_per_beat,
            max_payload: DEFAULT_MAX_PAYLOAD.max(bytes_per_beat),
            pending: Vec::with_capacity(DEFAULT_MAX_PAYLOAD),
            sink,
            stats: StageStats::default(),
            tx: StreamerStats::default(),
        }
    }

    /// Payload limit, raised to at least one beat.
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload.max(self.bytes_per_beat);
        self
    }

    pub fn name(&self) -> &str {
        "UdpStreamer"
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    pub fn decide(&mut self, ctx: &mut StageContext) {
        if let Some(input) = ctx.input(0) {
            input.set_ready(true);
        }
    }

    pub fn transfer(&mut self, ctx: &mut StageContext) {
        let Some(beat) = ctx.input(0).and_then(|input| input.take()) else {
            return;
        };
        self.stats.beats_in += 1;
        self.push_beat(beat);
    }

    fn push_beat(&mut self, beat: Beat) {
        if self.pending.len() + self.bytes_per_beat > self.max_payload {
            self.flush();
        }
        let bytes = beat.data.to_be_bytes();
        self.pending
            .extend_from_slice(&bytes[bytes.len() - self.bytes_per_beat..]);
        if beat.last {
            self.stats.packets += 1;
            self.flush();
        }
    }

    /// Send whatever is pending as one datagram.
    pub fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        match self.sink.send(&self.pending) {
            Ok(()) => {
                self.tx.datagrams += 1;
                self.tx.bytes += self.pending.len() as u64;
            }
            Err(e) => {
                self.tx.send_errors += 1;
                tracing::warn!("UdpStreamer: dropped {} byte datagram: {}", self.pending.len(), e);
            }
        }
        self.pending.clear();
    }

    pub fn on_config_change(&mut self, key: &str, value: &ConfigValue) {
        match key {
            "max_payload" => {
                if let Some(max) = value.as_usize() {
                    self.flush();
                    self.max_payload = max.max(self.bytes_per_beat);
                }
            }
            "flush" => self.flush(),
            _ => tracing::warn!("UdpStreamer: unknown config key '{}'", key),
        }
    }

    pub fn on_reset(&mut self) {
        self.pending.clear();
        self.stats = StageStats::default();
        self.tx = StreamerStats::default();
    }

    pub fn stats(&self) -> StageStats {
        self.stats
    }

    pub fn tx_stats(&self) -> StreamerStats {
        self.tx
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_on_last() {
        let mut sink = MockDatagramSink::new();
        sink.expect_send()
            .withf(|d: &[u8]| d == [0x00, 0x01, 0x00, 0x02])
            .times(1)
            .returning(|_| Ok(()));

        let mut streamer = UdpStreamerStage::new(16, Box::new(sink));
        streamer.push_beat(Beat::new(1));
        streamer.push_beat(Beat::last(2));
        assert_eq!(streamer.pending_bytes(), 0);
        assert_eq!(streamer.tx_stats().datagrams, 1);
        assert_eq!(streamer.tx_stats().bytes, 4);
    }

    #[test]
    fn test_flush_at_payload_limit() {
        let mut sink = MockDatagramSink::new();
        sink.expect_send()
            .withf(|d: &[u8]| d.len() == 3)
            .times(2)
            .returning(|_| Ok(()));

        let mut streamer = UdpStreamerStage::new(8, Box::new(sink)).with_max_payload(3);
        for i in 0..7u128 {
            streamer.push_beat(Beat::new(i));
        }
        assert_eq!(streamer.pending_bytes(), 1);
        assert_eq!(streamer.tx_stats().datagrams, 2);
    }

    #[test]
    fn test_send_error_counted() {
        let mut sink = MockDatagramSink::new();
        sink.expect_send()
            .returning(|_| Err(io::Error::new(io::ErrorKind::WouldBlock, "busy")));

        let mut streamer = UdpStreamerStage::new(32, Box::new(sink));
        streamer.push_beat(Beat::last(0xdead_beef));
        assert_eq!(streamer.tx_stats().send_errors, 1);
        assert_eq!(streamer.tx_stats().datagrams, 0);
        assert_eq!(streamer.pending_bytes(), 0);
    }

    #[test]
    fn test_channel_sink() {
        let (mut sink, rx) = ChannelSink::new();
        sink.send(&[1, 2, 3]).unwrap();
        assert_eq!(rx.try_recv().unwrap(), vec![1, 2, 3]);
        drop(rx);
        assert!(sink.send(&[4]).is_err());
    }
}
