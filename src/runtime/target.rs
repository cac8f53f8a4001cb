use crate::capture::CaptureStatus;
use crate::error::Result;
use crate::pipeline::Indicator;
use crate::runtime::bridge::{StatusMessage, TargetCommand};

/// A simulated SoC the runner can drive.
pub trait Target: Send {
    fn name(&self) -> &str;

    /// Advance one cycle of the target's base clock.
    fn step(&mut self) -> Result<()>;

    /// Base-clock cycles completed since power-on.
    fn cycle(&self) -> u64;

    fn indicators(&self) -> Vec<Indicator>;

    /// Apply a control command. Commands that produce data answer with a message.
    fn handle(&mut self, cmd: TargetCommand) -> Result<Option<StatusMessage>>;

    fn capture_status(&self) -> Option<CaptureStatus> {
        None
    }

    /// Back to power-on state.
    fn reset(&mut self);
}
