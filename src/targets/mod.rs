//! Composition roots.
//!
//! - [`edid_debug`] - one UART shared by a console and a register bridge,
//!   with a capture engine watching the multiplexer.
//! - [`hdmi2eth`] - DMA frames crossing into the encoder clock and out as
//!   UDP datagrams.

pub mod bus_bridge;
pub mod console;
pub mod edid_debug;
pub mod hdmi2eth;
pub mod uart;

pub use bus_bridge::{BridgeState, BusBridge, RegisterBus, RegisterFile};
pub use console::Console;
pub use edid_debug::{EdidDebugConfig, EdidDebugSoc};
pub use hdmi2eth::{Hdmi2EthConfig, Hdmi2EthSoc};
pub use uart::{UartPhy, UartStats};

use crate::stream::StreamEndpoint;

/// A byte-stream component attached to one logical multiplexer channel.
///
/// Called in cycle order: `publish_ready` during decide, `produce` and then
/// `consume` during transfer.
pub trait ByteAgent: Send {
    fn name(&self) -> &str;

    /// Publish ready on the channel's receive endpoint.
    fn publish_ready(&mut self, rx: &mut StreamEndpoint<u8>);

    /// Drive the channel's transmit endpoint.
    fn produce(&mut self, tx: &mut StreamEndpoint<u8>);

    /// Collect from the channel's receive endpoint.
    fn consume(&mut self, rx: &mut StreamEndpoint<u8>);

    fn reset(&mut self);
}
