//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use socscope::runtime::{RunnerBridge, StatusMessage};
use socscope::targets::bus_bridge::{CMD_READ, CMD_WRITE};
use std::time::{Duration, Instant};

/// Upper bound for waiting on the runner thread
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Receive messages until `pred` matches one, or the timeout passes.
pub fn wait_for<F>(bridge: &RunnerBridge, mut pred: F) -> Option<StatusMessage>
where
    F: FnMut(&StatusMessage) -> bool,
{
    let deadline = Instant::now() + test_timeout();
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match bridge.msg_rx.recv_timeout(remaining) {
            Ok(msg) if pred(&msg) => return Some(msg),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
    None
}

/// Bridge frame reading `words` words from `addr`.
pub fn read_frame(addr: u32, words: u8) -> Vec<u8> {
    let mut frame = vec![CMD_READ, words];
    frame.extend(addr.to_be_bytes());
    frame
}

/// Bridge frame writing `data` starting at `addr`.
pub fn write_frame(addr: u32, data: &[u32]) -> Vec<u8> {
    let mut frame = vec![CMD_WRITE, data.len() as u8];
    frame.extend(addr.to_be_bytes());
    for word in data {
        frame.extend(word.to_be_bytes());
    }
    frame
}

/// Big-endian words back from a bridge response.
pub fn words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
