//! Test data builders for creating test objects

use socscope::capture::{SignalField, SignalLayout};
use socscope::targets::{EdidDebugConfig, Hdmi2EthConfig};

/// Builder for an edid_debug config with a UART fast enough to test
pub struct EdidConfigBuilder {
    config: EdidDebugConfig,
}

impl EdidConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EdidDebugConfig {
                clk_hz: 1_000,
                baud: 1_000,
                capture_depth: 16,
                ..EdidDebugConfig::default()
            },
        }
    }

    pub fn cycles_per_byte(mut self, cycles: u64) -> Self {
        self.config.clk_hz = cycles * u64::from(self.config.baud) / 10;
        self
    }

    pub fn depth(mut self, depth: usize) -> Self {
        self.config.capture_depth = depth;
        self
    }

    pub fn subsample(mut self, divider: u32) -> Self {
        self.config.subsample = divider;
        self
    }

    pub fn bridge_timeout(mut self, cycles: u64) -> Self {
        self.config.bridge_timeout_cycles = cycles;
        self
    }

    pub fn build(self) -> EdidDebugConfig {
        self.config
    }
}

/// Builder for a narrow, single-frame hdmi2eth config
pub struct Hdmi2EthConfigBuilder {
    config: Hdmi2EthConfig,
}

impl Hdmi2EthConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Hdmi2EthConfig {
                width: 32,
                frame_words: 64,
                repeat: false,
                max_payload: 64,
                ..Hdmi2EthConfig::default()
            },
        }
    }

    pub fn frame_words(mut self, words: usize) -> Self {
        self.config.frame_words = words;
        self
    }

    pub fn width(mut self, width: u32) -> Self {
        self.config.width = width;
        self
    }

    pub fn clocks(mut self, sys_hz: u64, encoder_hz: u64) -> Self {
        self.config.sys_clk_hz = sys_hz;
        self.config.encoder_clk_hz = encoder_hz;
        self
    }

    pub fn max_payload(mut self, bytes: usize) -> Self {
        self.config.max_payload = bytes;
        self
    }

    pub fn build(self) -> Hdmi2EthConfig {
        self.config
    }
}

/// `(name, width)` pairs to a layout
pub fn layout(fields: &[(&str, u32)]) -> SignalLayout {
    SignalLayout::new(
        fields
            .iter()
            .map(|&(name, width)| SignalField::new(name, width))
            .collect(),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edid_builder() {
        let config = EdidConfigBuilder::new().cycles_per_byte(20).depth(4).build();
        assert_eq!(config.clk_hz * 10 / u64::from(config.baud), 20);
        assert_eq!(config.capture_depth, 4);
    }
}
