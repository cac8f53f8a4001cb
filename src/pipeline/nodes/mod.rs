//! Built-in pipeline stage implementations.

pub mod buffer;
pub mod cdc;
pub mod dma_reader;
pub mod encoder;
pub mod udp_streamer;

pub use buffer::{BufferStage, DEFAULT_BUFFER_DEPTH};
pub use cdc::{CdcReaderStage, CdcWriterStage};
pub use dma_reader::DmaReaderStage;
pub use encoder::EncoderStage;
pub use udp_streamer::{
    ChannelSink, DatagramSink, StreamerStats, UdpSocketSink, UdpStreamerStage,
    DEFAULT_MAX_PAYLOAD,
};
