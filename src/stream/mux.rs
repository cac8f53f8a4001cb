//! Channel multiplexer: one physical endpoint pair shared by N logical pairs.
//!
//! The selector is sampled once per cycle in `decide()`. The selected channel
//! is relayed combinationally in both directions: its consumer's ready is
//! mirrored onto the physical receive endpoint and the physical transmit
//! ready is mirrored onto its producer. Every other channel has its producer
//! side forced ready and whatever it sends is dropped, so a deselected
//! component can never stall on a link it does not own. Those drops are
//! counted, not reported.

use crate::stream::endpoint::StreamEndpoint;
use serde::Serialize;
use thiserror::Error;

/// Errors raised when building or steering a multiplexer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MuxError {
    #[error("multiplexer needs at least one logical channel")]
    NoChannels,

    #[error("selector {selector} out of range for {channels} channels")]
    InvalidSelector { selector: usize, channels: usize },

    #[error("unknown channel '{0}'")]
    UnknownChannel(String),
}

/// Receive and transmit endpoints of one side of the multiplexer.
///
/// `rx` carries data towards the attached component, `tx` carries data away
/// from it. For the physical side the attached component is the transceiver.
pub struct PortPair<T> {
    pub rx: StreamEndpoint<T>,
    pub tx: StreamEndpoint<T>,
}

impl<T> PortPair<T> {
    pub fn new(name: &str) -> Self {
        Self {
            rx: StreamEndpoint::new(format!("{name}.rx")),
            tx: StreamEndpoint::new(format!("{name}.tx")),
        }
    }

    fn tick(&mut self) {
        self.rx.tick();
        self.tx.tick();
    }

    fn reset(&mut self) {
        self.rx.reset();
        self.tx.reset();
    }
}

/// Routing counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MuxStats {
    /// Payloads relayed from the physical side to the active channel.
    pub relayed_rx: u64,
    /// Payloads relayed from the active channel to the physical side.
    pub relayed_tx: u64,
    /// Payloads dropped per channel while it was not selected.
    pub discarded: Vec<u64>,
    /// Number of selector changes taken.
    pub switches: u64,
}

/// Routes one physical `PortPair` to exactly one of several logical pairs.
pub struct ChannelMultiplexer<T> {
    physical: PortPair<T>,
    channels: Vec<PortPair<T>>,
    names: Vec<String>,
    requested: usize,
    active: usize,
    stats: MuxStats,
}

impl<T> ChannelMultiplexer<T> {
    /// Build a multiplexer; channel 0 is selected at power-on.
    pub fn new(physical: &str, channels: &[&str]) -> Result<Self, MuxError> {
        if channels.is_empty() {
            return Err(MuxError::NoChannels);
        }
        Ok(Self {
            physical: PortPair::new(physical),
            channels: channels.iter().map(|name| PortPair::new(name)).collect(),
            names: channels.iter().map(|name| name.to_string()).collect(),
            requested: 0,
            active: 0,
            stats: MuxStats {
                discarded: vec![0; channels.len()],
                ..MuxStats::default()
            },
        })
    }

    /// Drive the selector input. Takes effect at the next `decide()`.
    pub fn select(&mut self, selector: usize) -> Result<(), MuxError> {
        if selector >= self.channels.len() {
            return Err(MuxError::InvalidSelector {
                selector,
                channels: self.channels.len(),
            });
        }
        self.requested = selector;
        Ok(())
    }

    pub fn select_by_name(&mut self, name: &str) -> Result<(), MuxError> {
        let idx = self
            .channel_index(name)
            .ok_or_else(|| MuxError::UnknownChannel(name.to_string()))?;
        self.select(idx)
    }

    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn channel_names(&self) -> &[String] {
        &self.names
    }

    /// Selector currently driving the routing.
    pub fn active(&self) -> usize {
        self.active
    }

    /// Selector value that will be sampled next cycle.
    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn active_name(&self) -> &str {
        &self.names[self.active]
    }

    pub fn is_connected(&self, channel: usize) -> bool {
        channel == self.active
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn physical(&self) -> &PortPair<T> {
        &self.physical
    }

    pub fn physical_mut(&mut self) -> &mut PortPair<T> {
        &mut self.physical
    }

    /// # Panics
    /// If `channel` is out of range.
    pub fn channel(&self, channel: usize) -> &PortPair<T> {
        &self.channels[channel]
    }

    /// # Panics
    /// If `channel` is out of range.
    pub fn channel_mut(&mut self, channel: usize) -> &mut PortPair<T> {
        &mut self.channels[channel]
    }

    /// Disjoint access to the physical side and every logical channel.
    pub fn ports_mut(&mut self) -> (&mut PortPair<T>, &mut [PortPair<T>]) {
        (&mut self.physical, &mut self.channels)
    }

    pub fn stats(&self) -> &MuxStats {
        &self.stats
    }

    /// Decide phase. Latch the selector and propagate ready. Consumers
    /// attached to the logical rx endpoints and to the physical tx endpoint
    /// must have published ready before this call.
    pub fn decide(&mut self) {
        if self.requested != self.active {
            tracing::debug!(
                from = %self.names[self.active],
                to = %self.names[self.requested],
                "multiplexer switched"
            );
            self.active = self.requested;
            self.stats.switches += 1;
        }

        let downstream_ready = self.channels[self.active].rx.is_ready();
        self.physical.rx.set_ready(downstream_ready);

        let upstream_ready = self.physical.tx.is_ready();
        let active = self.active;
        for (idx, channel) in self.channels.iter_mut().enumerate() {
            channel
                .tx
                .set_ready(if idx == active { upstream_ready } else { true });
        }
    }

    /// Transfer phase. Run after the producers and before the consumers.
    pub fn route(&mut self) {
        let active = self.active;

        if let Some(payload) = self.physical.rx.take() {
            if self.channels[active].rx.try_send(payload).is_err() {
                panic!(
                    "multiplexer relayed into stalled channel '{}'",
                    self.names[active]
                );
            }
            self.stats.relayed_rx += 1;
        }

        for (idx, channel) in self.channels.iter_mut().enumerate() {
            let Some(payload) = channel.tx.take() else {
                continue;
            };
            if idx == active {
                if self.physical.tx.try_send(payload).is_err() {
                    panic!(
                        "multiplexer relayed channel '{}' into a stalled transmitter",
                        self.names[idx]
                    );
                }
                self.stats.relayed_tx += 1;
            } else {
                self.stats.discarded[idx] += 1;
            }
        }
    }

    /// Close the cycle on every owned endpoint.
    pub fn tick(&mut self) {
        self.physical.tick();
        for channel in &mut self.channels {
            channel.tick();
        }
    }

    pub fn reset(&mut self) {
        self.physical.reset();
        for channel in &mut self.channels {
            channel.reset();
        }
        self.requested = 0;
        self.active = 0;
        self.stats = MuxStats {
            discarded: vec![0; self.channels.len()],
            ..MuxStats::default()
        };
    }
}
