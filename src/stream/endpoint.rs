//! Valid/ready stream endpoint.
//!
//! A `StreamEndpoint<T>` is the wire between exactly one producer and one
//! consumer. Every simulated cycle runs in two phases:
//!
//! 1. **decide** - the consumer publishes `ready` from its own state
//!    (`set_ready`). Ready is registered and stays asserted until changed.
//! 2. **transfer** - the producer calls `try_send` (asserting valid). The
//!    transfer happens iff ready is asserted and the consumer-owned slot is
//!    free; otherwise the payload is handed back inside `Stall`.
//!
//! `tick()` closes the cycle. Protocol violations (double valid, ready
//! retraction after sampling, valid retraction while stalled) panic: they are
//! wiring bugs, never runtime conditions.

use serde::Serialize;
use std::fmt;

/// A payload the consumer did not accept this cycle. The producer still owns it.
pub struct Stall<T>(pub T);

impl<T> Stall<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Stall<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Stall(..)")
    }
}

/// Valid/ready levels of one cycle, as seen by the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Handshake {
    pub valid: bool,
    pub ready: bool,
}

impl Handshake {
    #[inline]
    pub fn fired(self) -> bool {
        self.valid && self.ready
    }
}

/// Per-endpoint counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EndpointStats {
    /// Completed transfers.
    pub transfers: u64,
    /// Cycles where valid was asserted but the consumer was not ready.
    pub stall_cycles: u64,
    /// Cycles closed with `tick()`.
    pub cycles: u64,
}

/// Unidirectional valid/ready channel carrying payloads of type `T`.
pub struct StreamEndpoint<T> {
    name: String,
    ready: bool,
    /// Effective ready observed by the producer this cycle.
    sampled: Option<bool>,
    valid: bool,
    transferred: bool,
    /// Producer stalled last cycle and must present valid again.
    must_hold: bool,
    slot: Option<T>,
    last: Handshake,
    stats: EndpointStats,
}

impl<T> StreamEndpoint<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ready: false,
            sampled: None,
            valid: false,
            transferred: false,
            must_hold: false,
            slot: None,
            last: Handshake::default(),
            stats: EndpointStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ── Consumer side ──

    /// Publish the consumer's ready level. Call during the decide phase.
    pub fn set_ready(&mut self, ready: bool) {
        if !ready && self.ready && self.sampled == Some(true) && !self.transferred {
            panic!(
                "stream '{}': ready de-asserted after the producer sampled it",
                self.name
            );
        }
        self.ready = ready;
    }

    /// Assert ready and collect the payload transferred this cycle, if any.
    pub fn try_receive(&mut self) -> Option<T> {
        self.ready = true;
        self.slot.take()
    }

    /// Collect a transferred payload without touching ready.
    pub fn take(&mut self) -> Option<T> {
        self.slot.take()
    }

    pub fn peek(&self) -> Option<&T> {
        self.slot.as_ref()
    }

    /// Void consumer: drop whatever transferred. Returns true if a payload was dropped.
    pub fn discard(&mut self) -> bool {
        self.slot.take().is_some()
    }

    // ── Producer side ──

    /// Effective ready: asserted and the consumer slot is free.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.ready && self.slot.is_none()
    }

    /// True when a send issued now would transfer.
    #[inline]
    pub fn can_accept(&self) -> bool {
        !self.valid && self.is_ready()
    }

    /// Sample ready without committing a payload. Once this returns true the
    /// consumer may not retract ready for the rest of the cycle.
    pub fn poll_ready(&mut self) -> bool {
        let ready = self.is_ready();
        self.sampled = Some(ready);
        ready
    }

    /// Assert valid with `payload`. At most one call per cycle.
    pub fn try_send(&mut self, payload: T) -> Result<(), Stall<T>> {
        if self.valid {
            panic!("stream '{}': valid asserted twice in one cycle", self.name);
        }
        self.valid = true;
        let ready = self.is_ready();
        self.sampled = Some(ready);
        if ready {
            self.slot = Some(payload);
            self.transferred = true;
            self.stats.transfers += 1;
            Ok(())
        } else {
            Err(Stall(payload))
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// True if a transfer already happened this cycle.
    #[inline]
    pub fn fired(&self) -> bool {
        self.transferred
    }

    /// Handshake levels of the cycle in progress.
    pub fn handshake(&self) -> Handshake {
        Handshake {
            valid: self.valid,
            ready: self.sampled.unwrap_or_else(|| self.is_ready()),
        }
    }

    /// Handshake levels of the last completed cycle.
    pub fn last_cycle(&self) -> Handshake {
        self.last
    }

    pub fn stats(&self) -> EndpointStats {
        self.stats
    }

    /// Close the current cycle.
    pub fn tick(&mut self) {
        if self.must_hold && !self.valid {
            panic!(
                "stream '{}': valid retracted before the payload transferred",
                self.name
            );
        }
        self.must_hold = self.valid && !self.transferred;
        if self.must_hold {
            self.stats.stall_cycles += 1;
        }
        self.last = self.handshake();
        self.stats.cycles += 1;
        self.valid = false;
        self.transferred = false;
        self.sampled = None;
    }

    /// Return to the power-on state, dropping any payload.
    pub fn reset(&mut self) {
        self.ready = false;
        self.sampled = None;
        self.valid = false;
        self.transferred = false;
        self.must_hold = false;
        self.slot = None;
        self.last = Handshake::default();
    }
}

impl<T> fmt::Debug for StreamEndpoint<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamEndpoint")
            .field("name", &self.name)
            .field("valid", &self.valid)
            .field("ready", &self.ready)
            .field("occupied", &self.slot.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

/// Producer-side holding register: keeps a stalled payload asserted until it
/// transfers.
pub struct SendSlot<T> {
    held: Option<T>,
}

impl<T> SendSlot<T> {
    pub const fn new() -> Self {
        Self { held: None }
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_none()
    }

    /// Place the next payload. The slot must be empty.
    pub fn load(&mut self, payload: T) {
        assert!(self.held.is_none(), "send slot already holds a payload");
        self.held = Some(payload);
    }

    pub fn peek(&self) -> Option<&T> {
        self.held.as_ref()
    }

    /// Present the held payload on `endpoint`. Returns true if it transferred.
    pub fn drive(&mut self, endpoint: &mut StreamEndpoint<T>) -> bool {
        let Some(payload) = self.held.take() else {
            return false;
        };
        match endpoint.try_send(payload) {
            Ok(()) => true,
            Err(stall) => {
                self.held = Some(stall.into_inner());
                false
            }
        }
    }

    pub fn clear(&mut self) -> Option<T> {
        self.held.take()
    }
}

impl<T> Default for SendSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_transfer_requires_ready() {
        let mut ep = StreamEndpoint::new("t");
        assert!(ep.try_send(1u8).is_err());
        ep.tick();

        ep.set_ready(true);
        // Stalled producer holds its payload into the next cycle
        assert!(ep.try_send(1u8).is_ok());
        assert_eq!(ep.take(), Some(1));
        ep.tick();
        assert_eq!(ep.stats().transfers, 1);
        assert_eq!(ep.stats().stall_cycles, 1);
    }

    #[test]
    fn test_uncollected_payload_blocks_next_transfer() {
        let mut ep = StreamEndpoint::new("t");
        ep.set_ready(true);
        ep.try_send(7u32).unwrap();
        ep.tick();

        let stall = ep.try_send(8u32).unwrap_err();
        assert_eq!(stall.into_inner(), 8);
        assert_eq!(ep.try_receive(), Some(7));
        ep.tick();
    }

    #[test]
    fn test_last_cycle_records_handshake() {
        let mut ep = StreamEndpoint::new("t");
        ep.set_ready(true);
        ep.try_send(()).unwrap();
        ep.take();
        ep.tick();
        assert!(ep.last_cycle().fired());

        ep.tick();
        assert_eq!(
            ep.last_cycle(),
            Handshake {
                valid: false,
                ready: true
            }
        );
    }

    #[test]
    #[should_panic(expected = "valid asserted twice")]
    fn test_double_send_panics() {
        let mut ep = StreamEndpoint::new("t");
        ep.set_ready(true);
        let _ = ep.try_send(1);
        let _ = ep.try_send(2);
    }

    #[test]
    #[should_panic(expected = "ready de-asserted")]
    fn test_ready_retraction_panics() {
        let mut ep: StreamEndpoint<u8> = StreamEndpoint::new("t");
        ep.set_ready(true);
        assert!(ep.poll_ready());
        ep.set_ready(false);
    }

    #[test]
    fn test_ready_may_drop_after_transfer() {
        let mut ep = StreamEndpoint::new("t");
        ep.set_ready(true);
        ep.try_send(1).unwrap();
        ep.set_ready(false);
        assert_eq!(ep.take(), Some(1));
        ep.tick();
    }

    #[test]
    #[should_panic(expected = "valid retracted")]
    fn test_valid_retraction_panics() {
        let mut ep = StreamEndpoint::new("t");
        assert!(ep.try_send(1).is_err());
        ep.tick();
        ep.tick();
    }

    #[test]
    fn test_send_slot_holds_until_transfer() {
        let mut ep = StreamEndpoint::new("t");
        let mut slot = SendSlot::new();
        slot.load(5u16);
        assert!(!slot.drive(&mut ep));
        assert_eq!(slot.peek(), Some(&5));
        ep.tick();

        ep.set_ready(true);
        assert!(slot.drive(&mut ep));
        assert!(slot.is_empty());
        assert_eq!(ep.take(), Some(5));
    }

    proptest! {
        #[test]
        fn test_every_payload_delivered_once_in_order(
            ready_pattern in prop::collection::vec(any::<bool>(), 1..200),
            count in 1usize..64,
        ) {
            let mut ep = StreamEndpoint::new("prop");
            let mut slot = SendSlot::new();
            let mut next = 0usize;
            let mut received = Vec::new();

            let mut cycle = 0usize;
            while received.len() < count {
                let ready = ready_pattern[cycle % ready_pattern.len()] || cycle >= ready_pattern.len();
                ep.set_ready(ready);
                if slot.is_empty() && next < count {
                    slot.load(next);
                    next += 1;
                }
                slot.drive(&mut ep);
                if let Some(v) = ep.take() {
                    received.push(v);
                }
                ep.tick();
                cycle += 1;
            }

            prop_assert_eq!(received, (0..count).collect::<Vec<_>>());
        }

        #[test]
        fn test_always_ready_consumer_loses_nothing(
            payloads in prop::collection::vec(any::<u32>(), 0..128),
        ) {
            let mut ep = StreamEndpoint::new("prop");
            let mut received = Vec::new();
            for &p in &payloads {
                ep.set_ready(true);
                prop_assert!(ep.try_send(p).is_ok());
                if let Some(v) = ep.try_receive() {
                    received.push(v);
                }
                ep.tick();
            }
            prop_assert_eq!(received, payloads);
        }
    }
}
