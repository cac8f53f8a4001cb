//! Liveness indicators (board LEDs) derived from stream handshakes.

use crate::pipeline::id::LinkId;
use crate::stream::Handshake;
use serde::{Deserialize, Serialize};

/// Which handshake level an indicator mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorSource {
    Valid,
    Ready,
    /// Lit when a transfer happened.
    Transfer,
}

impl IndicatorSource {
    pub fn level(self, handshake: Handshake) -> bool {
        match self {
            IndicatorSource::Valid => handshake.valid,
            IndicatorSource::Ready => handshake.ready,
            IndicatorSource::Transfer => handshake.fired(),
        }
    }
}

/// An indicator wired to a pipeline link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorBinding {
    pub name: String,
    pub link: LinkId,
    pub source: IndicatorSource,
}

/// Indicator output level, sampled at the end of the last cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Indicator {
    pub name: String,
    pub lit: bool,
}

impl Indicator {
    pub fn new(name: impl Into<String>, lit: bool) -> Self {
        Self {
            name: name.into(),
            lit,
        }
    }
}
