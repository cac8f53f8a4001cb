//! # socscope: cycle-level model of SoC debug dataflow
//!
//! Simulates the debug plumbing of a small FPGA SoC one clock edge at a time:
//! valid/ready streams, clock-domain crossings, a shared serial channel and a
//! triggered logic analyzer whose captures export to VCD, CSV or JSON.
//!
//! ## Architecture
//!
//! - **Stream**: handshake endpoints, clock-domain queues, channel multiplexer
//! - **Capture**: signal layouts, trigger ports, subsampled bounded capture, export
//! - **Pipeline**: stage graph over stream links with multi-clock scheduling
//! - **Targets**: the `edid_debug` and `hdmi2eth` SoCs built from the above
//! - **Runtime**: drives a target on its own thread over crossbeam channels
//!
//! ## Configuration
//!
//! Settings live in a TOML file under the platform config directory
//! (`dev.socscope/socscope.toml`), or wherever `SOCSCOPE_CONFIG` points.
//!
//! ## Example
//!
//! ```ignore
//! use socscope::{
//!     capture::TraceFormat,
//!     runtime::{self, TargetCommand},
//!     targets::{EdidDebugConfig, EdidDebugSoc},
//! };
//!
//! let soc = EdidDebugSoc::new(EdidDebugConfig::default())?;
//! let term = soc.signal_term("uart_sel", 1)?;
//! let (bridge, handle) = runtime::spawn(Box::new(soc))?;
//!
//! bridge.target(TargetCommand::AddTriggerPort(term.into()));
//! bridge.target(TargetCommand::Arm);
//! bridge.target(TargetCommand::SetSwitch(true));
//! bridge.step(40_000);
//! bridge.target(TargetCommand::Export {
//!     path: "capture.vcd".into(),
//!     format: TraceFormat::Vcd,
//! });
//! bridge.shutdown();
//! handle.join().ok();
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod runtime;
pub mod stream;
pub mod targets;

// Re-export commonly used types
pub use capture::{CaptureEngine, CaptureState, Exporter, SignalLayout, TraceFormat, Trigger};
pub use config::SocConfig;
pub use error::{Result, ResultExt, SocError};
pub use pipeline::Pipeline;
pub use runtime::{RunnerBridge, RunnerCommand, StatusMessage, Target, TargetCommand};
pub use stream::{ChannelMultiplexer, ClockDomainQueue, StreamEndpoint};
pub use targets::{EdidDebugSoc, Hdmi2EthSoc};
