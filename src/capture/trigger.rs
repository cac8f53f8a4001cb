//! Trigger ports.
//!
//! A [`Trigger`] holds any number of ports and fires when at least one of
//! them matches the current sample (logical OR). The basic port is the
//! pattern/mask [`TriggerTerm`]; range and edge detectors cover the other
//! conditions operators commonly want.

use super::layout::SampleVector;
use super::CaptureError;
use serde::Serialize;

/// Fires when the masked sample equals the masked pattern.
///
/// A zero mask matches every sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TriggerTerm {
    pattern: u128,
    mask: u128,
}

impl TriggerTerm {
    pub fn new(pattern: u128, mask: u128) -> Self {
        Self { pattern, mask }
    }

    pub fn configure(&mut self, pattern: u128, mask: u128) {
        self.pattern = pattern;
        self.mask = mask;
    }

    #[inline]
    pub fn evaluate(&self, sample: SampleVector) -> bool {
        (sample.0 & self.mask) == (self.pattern & self.mask)
    }

    pub fn pattern(&self) -> u128 {
        self.pattern
    }

    pub fn mask(&self) -> u128 {
        self.mask
    }
}

/// Fires when the masked sample lies in `low..=high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RangeDetector {
    pub low: u128,
    pub high: u128,
    pub mask: u128,
}

impl RangeDetector {
    pub fn new(low: u128, high: u128, mask: u128) -> Self {
        Self { low, high, mask }
    }

    #[inline]
    pub fn evaluate(&self, sample: SampleVector) -> bool {
        let v = sample.0 & self.mask;
        self.low <= v && v <= self.high
    }
}

/// Fires on bit transitions relative to the previous sample.
///
/// Each mask selects bits; the detector fires if any selected bit made the
/// corresponding transition. The first sample after a reset never fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EdgeDetector {
    pub rising: u128,
    pub falling: u128,
    pub both: u128,
    #[serde(skip)]
    previous: Option<SampleVector>,
}

impl EdgeDetector {
    pub fn new(rising: u128, falling: u128, both: u128) -> Self {
        Self {
            rising,
            falling,
            both,
            previous: None,
        }
    }

    pub fn rising(mask: u128) -> Self {
        Self::new(mask, 0, 0)
    }

    pub fn falling(mask: u128) -> Self {
        Self::new(0, mask, 0)
    }

    pub fn evaluate(&mut self, sample: SampleVector) -> bool {
        let hit = match self.previous {
            Some(prev) => {
                let rose = !prev.0 & sample.0;
                let fell = prev.0 & !sample.0;
                rose & self.rising != 0 || fell & self.falling != 0 || (rose | fell) & self.both != 0
            }
            None => false,
        };
        self.previous = Some(sample);
        hit
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

/// One trigger input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerPort {
    Term(TriggerTerm),
    Range(RangeDetector),
    Edge(EdgeDetector),
}

impl TriggerPort {
    pub fn evaluate(&mut self, sample: SampleVector) -> bool {
        match self {
            TriggerPort::Term(t) => t.evaluate(sample),
            TriggerPort::Range(r) => r.evaluate(sample),
            TriggerPort::Edge(e) => e.evaluate(sample),
        }
    }

    pub fn reset(&mut self) {
        if let TriggerPort::Edge(e) = self {
            e.reset();
        }
    }
}

impl From<TriggerTerm> for TriggerPort {
    fn from(t: TriggerTerm) -> Self {
        TriggerPort::Term(t)
    }
}

impl From<RangeDetector> for TriggerPort {
    fn from(r: RangeDetector) -> Self {
        TriggerPort::Range(r)
    }
}

impl From<EdgeDetector> for TriggerPort {
    fn from(e: EdgeDetector) -> Self {
        TriggerPort::Edge(e)
    }
}

/// OR-combination of trigger ports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trigger {
    ports: Vec<TriggerPort>,
}

impl Trigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a port and return its index.
    pub fn add_port(&mut self, port: impl Into<TriggerPort>) -> usize {
        self.ports.push(port.into());
        self.ports.len() - 1
    }

    pub fn port(&self, index: usize) -> Option<&TriggerPort> {
        self.ports.get(index)
    }

    pub fn port_mut(&mut self, index: usize) -> Option<&mut TriggerPort> {
        self.ports.get_mut(index)
    }

    pub fn ports(&self) -> &[TriggerPort] {
        &self.ports
    }

    /// Reprogram the pattern/mask term at `index`.
    pub fn configure(&mut self, index: usize, pattern: u128, mask: u128) -> Result<(), CaptureError> {
        match self.ports.get_mut(index) {
            Some(TriggerPort::Term(term)) => {
                term.configure(pattern, mask);
                Ok(())
            }
            Some(_) => Err(CaptureError::NotATerm(index)),
            None => Err(CaptureError::NoSuchPort(index)),
        }
    }

    pub fn clear(&mut self) {
        self.ports.clear();
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Evaluate every port against `sample`; true if any matched. With no
    /// ports this never fires.
    pub fn fires(&mut self, sample: SampleVector) -> bool {
        // Every port sees every sample so edge detectors keep their history.
        self.ports
            .iter_mut()
            .fold(false, |hit, port| port.evaluate(sample) | hit)
    }

    pub fn reset(&mut self) {
        for port in &mut self.ports {
            port.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_pattern_mask() {
        let term = TriggerTerm::new(0b1010, 0b1110);
        assert!(term.evaluate(SampleVector(0b1010)));
        assert!(term.evaluate(SampleVector(0b1011)));
        assert!(!term.evaluate(SampleVector(0b0010)));
    }

    #[test]
    fn test_zero_mask_always_matches() {
        let term = TriggerTerm::default();
        assert!(term.evaluate(SampleVector(0xDEAD)));
    }

    #[test]
    fn test_terms_are_ored() {
        let mut trigger = Trigger::new();
        trigger.add_port(TriggerTerm::new(0x1, 0xF));
        trigger.add_port(TriggerTerm::new(0x2, 0xF));
        assert!(trigger.fires(SampleVector(0x1)));
        assert!(trigger.fires(SampleVector(0x2)));
        assert!(!trigger.fires(SampleVector(0x3)));
    }

    #[test]
    fn test_empty_trigger_never_fires() {
        let mut trigger = Trigger::new();
        assert!(!trigger.fires(SampleVector(0)));
    }

    #[test]
    fn test_configure_term() {
        let mut trigger = Trigger::new();
        let idx = trigger.add_port(TriggerTerm::new(0, u128::MAX));
        let range = trigger.add_port(RangeDetector::new(0, 1, 1));
        trigger.configure(idx, 7, 0xF).unwrap();
        assert!(trigger.fires(SampleVector(0x17)));
        assert_eq!(trigger.configure(range, 0, 0), Err(CaptureError::NotATerm(range)));
        assert_eq!(trigger.configure(9, 0, 0), Err(CaptureError::NoSuchPort(9)));
    }

    #[test]
    fn test_range_detector() {
        let r = RangeDetector::new(10, 20, 0xFF);
        assert!(r.evaluate(SampleVector(0x10F)));
        assert!(!r.evaluate(SampleVector(9)));
        assert!(!r.evaluate(SampleVector(21)));
    }

    #[test]
    fn test_edge_detector_keeps_history_when_other_port_hits() {
        let mut trigger = Trigger::new();
        trigger.add_port(TriggerTerm::new(0, 0));
        let edge = trigger.add_port(EdgeDetector::rising(0b1));
        trigger.fires(SampleVector(0));
        match trigger.port_mut(edge) {
            Some(TriggerPort::Edge(e)) => assert!(e.evaluate(SampleVector(1))),
            other => panic!("unexpected port {other:?}"),
        }
    }

    #[test]
    fn test_edge_detector_transitions() {
        let mut e = EdgeDetector::new(0b01, 0b10, 0);
        assert!(!e.evaluate(SampleVector(0b10)));
        assert!(e.evaluate(SampleVector(0b01)));
        assert!(!e.evaluate(SampleVector(0b01)));
        e.reset();
        assert!(!e.evaluate(SampleVector(0b00)));
        let mut both = EdgeDetector::new(0, 0, 0b100);
        both.evaluate(SampleVector(0));
        assert!(both.evaluate(SampleVector(0b100)));
        assert!(both.evaluate(SampleVector(0)));
    }
}
