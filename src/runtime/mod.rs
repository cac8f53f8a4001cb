//! Runner thread and its control channel.
//!
//! A [`Target`] is moved onto a dedicated thread and driven by a [`Runner`].
//! The controller talks to it through a [`RunnerBridge`]: commands in,
//! status messages out, both over bounded crossbeam channels.

pub mod bridge;
pub mod runner;
pub mod target;

pub use bridge::{
    RunnerBridge, RunnerCommand, RunnerStatus, StatusMessage, TargetCommand,
    CMD_CHANNEL_CAPACITY, MSG_CHANNEL_CAPACITY,
};
pub use runner::{spawn, spawn_with, Runner, DEFAULT_CYCLES_PER_TICK, DEFAULT_TICK_RATE_HZ};
pub use target::Target;
