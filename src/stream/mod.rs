//! Streaming interconnect primitives.
//!
//! - [`StreamEndpoint`] - valid/ready point-to-point channel
//! - [`ClockDomainQueue`] - bounded FIFO between clock domains
//! - [`ChannelMultiplexer`] - one physical pair shared by N logical pairs

pub mod cdc;
pub mod endpoint;
pub mod mux;

pub use cdc::{ClockDomainQueue, QueueReader, QueueWriter};
pub use endpoint::{EndpointStats, Handshake, SendSlot, Stall, StreamEndpoint};
pub use mux::{ChannelMultiplexer, MuxError, MuxStats, PortPair};
