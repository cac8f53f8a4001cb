//! Capture engine state machine.

use super::layout::{SampleVector, SignalLayout};
use super::subsampler::Subsampler;
use super::trigger::Trigger;
use super::CaptureError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Capture lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptureState {
    /// Not armed; samples are ignored.
    Idle,
    /// Waiting for the trigger.
    Armed,
    /// Recording post-trigger samples.
    Capturing,
    /// Storage full; contents frozen until the next arm.
    Done,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureState::Idle => write!(f, "Idle"),
            CaptureState::Armed => write!(f, "Armed"),
            CaptureState::Capturing => write!(f, "Capturing"),
            CaptureState::Done => write!(f, "Done"),
        }
    }
}

/// When a subsampled capture counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Finish after `capacity * divider` post-trigger instants: the group of
    /// the last stored sample runs out before the engine reports Done.
    #[default]
    CompleteGroup,
    /// Finish on the instant that stores the last sample.
    StopOnFill,
}

/// Snapshot for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureStatus {
    pub state: CaptureState,
    pub samples: usize,
    pub capacity: usize,
    pub divider: u32,
    /// Sample instant (since construction) at which the trigger fired.
    pub trigger_instant: Option<u64>,
    pub instants: u64,
}

/// Triggered, subsampled, bounded signal recorder.
pub struct CaptureEngine {
    layout: SignalLayout,
    storage: Vec<SampleVector>,
    capacity: usize,
    trigger: Trigger,
    subsampler: Subsampler,
    policy: BoundaryPolicy,
    state: CaptureState,
    instants: u64,
    trigger_instant: Option<u64>,
}

impl CaptureEngine {
    /// Create an idle engine storing at most `capacity` samples.
    pub fn new(layout: SignalLayout, capacity: usize) -> Self {
        Self {
            layout,
            storage: Vec::with_capacity(capacity),
            capacity,
            trigger: Trigger::new(),
            subsampler: Subsampler::default(),
            policy: BoundaryPolicy::default(),
            state: CaptureState::Idle,
            instants: 0,
            trigger_instant: None,
        }
    }

    pub fn with_subsample(mut self, divider: u32) -> Result<Self, CaptureError> {
        self.subsampler.set_divider(divider)?;
        Ok(self)
    }

    pub fn with_boundary_policy(mut self, policy: BoundaryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn layout(&self) -> &SignalLayout {
        &self.layout
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples stored so far.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == CaptureState::Done
    }

    pub fn divider(&self) -> u32 {
        self.subsampler.divider()
    }

    pub fn boundary_policy(&self) -> BoundaryPolicy {
        self.policy
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// Trigger ports may be edited in any state; changes apply from the next
    /// sample instant.
    pub fn trigger_mut(&mut self) -> &mut Trigger {
        &mut self.trigger
    }

    fn ensure_not_running(&self) -> Result<(), CaptureError> {
        match self.state {
            CaptureState::Armed | CaptureState::Capturing => Err(CaptureError::Busy(self.state)),
            CaptureState::Idle | CaptureState::Done => Ok(()),
        }
    }

    pub fn set_subsample(&mut self, divider: u32) -> Result<(), CaptureError> {
        self.ensure_not_running()?;
        self.subsampler.set_divider(divider)
    }

    pub fn set_boundary_policy(&mut self, policy: BoundaryPolicy) -> Result<(), CaptureError> {
        self.ensure_not_running()?;
        self.policy = policy;
        Ok(())
    }

    /// Clear storage and wait for the trigger. Discards any previous capture.
    pub fn arm(&mut self) {
        if self.trigger.is_empty() {
            tracing::warn!("capture armed with no trigger ports; it will never fire");
        }
        if self.state == CaptureState::Done && !self.storage.is_empty() {
            tracing::debug!(samples = self.storage.len(), "re-arm discards previous capture");
        }
        self.storage.clear();
        self.subsampler.reset();
        self.trigger.reset();
        self.trigger_instant = None;
        self.state = CaptureState::Armed;
        tracing::info!(
            capacity = self.capacity,
            divider = self.subsampler.divider(),
            "capture armed"
        );
    }

    /// Back to Idle, dropping stored samples.
    pub fn reset(&mut self) {
        self.storage.clear();
        self.subsampler.reset();
        self.trigger.reset();
        self.trigger_instant = None;
        self.state = CaptureState::Idle;
    }

    /// Record one sample instant given one value per signal, in layout order.
    pub fn sample_tick(&mut self, values: &[u128]) -> Result<(), CaptureError> {
        if !self.is_sampling() {
            self.instants += 1;
            return Ok(());
        }
        let sample = self.layout.pack(values)?;
        self.advance(sample);
        Ok(())
    }

    /// Record one already-packed sample instant.
    pub fn sample_vector(&mut self, sample: SampleVector) -> Result<(), CaptureError> {
        if !self.is_sampling() {
            self.instants += 1;
            return Ok(());
        }
        if !self.layout.fits(sample) {
            return Err(CaptureError::InvalidLayout(format!(
                "sample {:?} wider than {} bits",
                sample,
                self.layout.total_width()
            )));
        }
        self.advance(sample);
        Ok(())
    }

    #[inline]
    fn is_sampling(&self) -> bool {
        matches!(self.state, CaptureState::Armed | CaptureState::Capturing)
    }

    fn advance(&mut self, sample: SampleVector) {
        let instant = self.instants;
        self.instants += 1;

        match self.state {
            CaptureState::Armed => {
                if self.trigger.fires(sample) {
                    self.trigger_instant = Some(instant);
                    tracing::info!(instant, "capture triggered");
                    if self.capacity == 0 {
                        self.finish();
                    } else {
                        self.state = CaptureState::Capturing;
                    }
                }
            }
            CaptureState::Capturing => {
                if self.subsampler.tick() {
                    self.storage.push(sample);
                }
                let full = self.storage.len() == self.capacity;
                let done = match self.policy {
                    BoundaryPolicy::StopOnFill => full,
                    BoundaryPolicy::CompleteGroup => full && self.subsampler.phase() == 0,
                };
                if done {
                    self.finish();
                }
            }
            CaptureState::Idle | CaptureState::Done => {}
        }
    }

    fn finish(&mut self) {
        self.state = CaptureState::Done;
        tracing::info!(samples = self.storage.len(), "capture done");
    }

    /// The completed capture, oldest sample first. Storage is kept until the
    /// next `arm()`, so a failed export can be retried.
    pub fn drain(&self) -> Result<Vec<SampleVector>, CaptureError> {
        self.samples().map(<[SampleVector]>::to_vec)
    }

    /// Borrowing variant of [`drain`](Self::drain).
    pub fn samples(&self) -> Result<&[SampleVector], CaptureError> {
        if self.state != CaptureState::Done {
            return Err(CaptureError::NotDone(self.state));
        }
        Ok(&self.storage)
    }

    pub fn status(&self) -> CaptureStatus {
        CaptureStatus {
            state: self.state,
            samples: self.storage.len(),
            capacity: self.capacity,
            divider: self.subsampler.divider(),
            trigger_instant: self.trigger_instant,
            instants: self.instants,
        }
    }
}

impl fmt::Debug for CaptureEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureEngine")
            .field("state", &self.state)
            .field("samples", &self.storage.len())
            .field("capacity", &self.capacity)
            .field("divider", &self.subsampler.divider())
            .field("ports", &self.trigger.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::layout::SignalField;
    use crate::capture::trigger::TriggerTerm;
    use proptest::prelude::*;

    fn engine(capacity: usize) -> CaptureEngine {
        let layout = SignalLayout::new(vec![
            SignalField::new("start", 1),
            SignalField::new("value", 8),
        ])
        .unwrap();
        let mut engine = CaptureEngine::new(layout, capacity);
        engine.trigger_mut().add_port(TriggerTerm::new(1, 1));
        engine
    }

    /// Feed idle samples, a trigger sample, then `post` counting samples.
    fn run(engine: &mut CaptureEngine, idle: usize, post: u128) {
        for _ in 0..idle {
            engine.sample_tick(&[0, 0xFF]).unwrap();
        }
        engine.sample_tick(&[1, 0xEE]).unwrap();
        for v in 0..post {
            engine.sample_tick(&[0, v]).unwrap();
        }
    }

    fn values(engine: &CaptureEngine) -> Vec<u128> {
        engine
            .drain()
            .unwrap()
            .into_iter()
            .map(|s| engine.layout().value(s, 1))
            .collect()
    }

    #[test]
    fn test_idle_ignores_samples() {
        let mut e = engine(4);
        run(&mut e, 3, 8);
        assert_eq!(e.state(), CaptureState::Idle);
        assert!(e.is_empty());
        assert_eq!(e.drain(), Err(CaptureError::NotDone(CaptureState::Idle)));
    }

    #[test]
    fn test_armed_waits_for_trigger() {
        let mut e = engine(4);
        e.arm();
        for _ in 0..10 {
            e.sample_tick(&[0, 0xFF]).unwrap();
        }
        assert_eq!(e.state(), CaptureState::Armed);
        assert!(e.is_empty());
    }

    #[test]
    fn test_capture_after_trigger() {
        let mut e = engine(4);
        e.arm();
        run(&mut e, 5, 10);
        assert!(e.is_done());
        assert_eq!(values(&e), vec![0, 1, 2, 3]);
        assert_eq!(e.status().trigger_instant, Some(5));
    }

    #[test]
    fn test_drain_refused_until_done() {
        let mut e = engine(4);
        e.arm();
        assert_eq!(e.drain(), Err(CaptureError::NotDone(CaptureState::Armed)));

        run(&mut e, 1, 2);
        assert_eq!(e.state(), CaptureState::Capturing);
        assert_eq!(e.status().samples, 2);
        assert_eq!(e.drain(), Err(CaptureError::NotDone(CaptureState::Capturing)));
        assert_eq!(e.samples(), Err(CaptureError::NotDone(CaptureState::Capturing)));

        for v in 2..4 {
            e.sample_tick(&[0, v]).unwrap();
        }
        assert!(e.is_done());
        assert_eq!(values(&e), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_subsample_commits_every_third() {
        let mut e = engine(3).with_subsample(3).unwrap();
        e.arm();
        run(&mut e, 0, 9);
        assert!(e.is_done());
        assert_eq!(values(&e), vec![0, 3, 6]);
    }

    #[test]
    fn test_complete_group_waits_for_group_end() {
        let mut e = engine(3).with_subsample(3).unwrap();
        e.arm();
        run(&mut e, 0, 8);
        assert_eq!(e.state(), CaptureState::Capturing);
        e.sample_tick(&[0, 8]).unwrap();
        assert!(e.is_done());
    }

    #[test]
    fn test_stop_on_fill() {
        let mut e = engine(3)
            .with_subsample(3)
            .unwrap()
            .with_boundary_policy(BoundaryPolicy::StopOnFill);
        e.arm();
        run(&mut e, 0, 7);
        assert!(e.is_done());
        assert_eq!(values(&e), vec![0, 3, 6]);
    }

    #[test]
    fn test_done_is_frozen() {
        let mut e = engine(2);
        e.arm();
        run(&mut e, 0, 2);
        assert!(e.is_done());
        run(&mut e, 0, 5);
        assert_eq!(values(&e), vec![0, 1]);
        // Drain does not consume
        assert_eq!(values(&e), vec![0, 1]);
    }

    #[test]
    fn test_rearm_clears() {
        let mut e = engine(2);
        e.arm();
        run(&mut e, 0, 2);
        e.arm();
        assert_eq!(e.state(), CaptureState::Armed);
        assert!(e.is_empty());
        run(&mut e, 0, 4);
        assert_eq!(values(&e), vec![0, 1]);
    }

    #[test]
    fn test_zero_capacity_done_on_trigger() {
        let mut e = engine(0);
        e.arm();
        run(&mut e, 2, 0);
        assert!(e.is_done());
        assert!(e.drain().unwrap().is_empty());
    }

    #[test]
    fn test_reconfigure_while_armed_rejected() {
        let mut e = engine(2);
        e.arm();
        assert_eq!(
            e.set_subsample(2),
            Err(CaptureError::Busy(CaptureState::Armed))
        );
        e.reset();
        assert!(e.set_subsample(2).is_ok());
        assert!(e.set_boundary_policy(BoundaryPolicy::StopOnFill).is_ok());
    }

    #[test]
    fn test_bad_sample_rejected_while_armed() {
        let mut e = engine(2);
        e.arm();
        assert!(e.sample_tick(&[0]).is_err());
        assert!(e.sample_tick(&[0, 0x1FF]).is_err());
        assert!(e.sample_vector(SampleVector(1 << 9)).is_err());
        assert!(e.sample_vector(SampleVector(1)).is_ok());
        assert_eq!(e.state(), CaptureState::Capturing);
    }

    proptest! {
        #[test]
        fn test_post_trigger_instants_to_done(
            capacity in 1usize..16,
            divider in 1u32..6,
            idle in 0usize..8,
        ) {
            let mut e = engine(capacity).with_subsample(divider).unwrap();
            e.arm();
            run(&mut e, idle, 0);
            let needed = capacity as u64 * divider as u64;
            for i in 0..needed {
                prop_assert!(!e.is_done());
                e.sample_tick(&[0, (i & 0xFF) as u128]).unwrap();
            }
            prop_assert!(e.is_done());
            prop_assert_eq!(e.len(), capacity);
        }
    }
}
