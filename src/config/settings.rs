//! Capture, export and runner settings stored in the config file.
//!
//! # Main Types
//!
//! - [`TriggerSettings`] - One trigger port, expressed against signal names
//! - [`CaptureSettings`] - Trigger ports and arming behaviour
//! - [`ExportSettings`] - Trace format and output directory
//! - [`RuntimeSettings`] - Runner loop rate
//!
//! TOML has no 128-bit integers, so sample values are written as hex strings
//! (`"0x1f"`).

use crate::capture::{
    CaptureError, EdgeDetector, RangeDetector, SignalLayout, TraceFormat, TriggerPort, TriggerTerm,
};
use crate::runtime::{DEFAULT_CYCLES_PER_TICK, DEFAULT_TICK_RATE_HZ};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Serde adapter writing `u128` as a `0x`-prefixed hex string.
pub mod hex_u128 {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{value:#x}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(de::Error::custom)
    }

    /// Accepts `0x` hex or plain decimal.
    pub fn parse(s: &str) -> Result<u128, String> {
        let s = s.trim();
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u128::from_str_radix(&hex.replace('_', ""), 16),
            None => s.replace('_', "").parse(),
        };
        parsed.map_err(|e| format!("invalid value '{s}': {e}"))
    }
}

/// Which transition an edge trigger watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    #[default]
    Rising,
    Falling,
    Both,
}

/// A trigger port as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerSettings {
    /// Signal equals value.
    Match {
        signal: String,
        #[serde(with = "hex_u128")]
        value: u128,
    },
    /// Raw pattern/mask over the whole sample vector.
    Pattern {
        #[serde(with = "hex_u128")]
        pattern: u128,
        #[serde(with = "hex_u128")]
        mask: u128,
    },
    /// Signal within `[low, high]`.
    Range {
        signal: String,
        #[serde(with = "hex_u128")]
        low: u128,
        #[serde(with = "hex_u128")]
        high: u128,
    },
    Edge {
        signal: String,
        #[serde(default)]
        edge: EdgeKind,
    },
}

impl TriggerSettings {
    /// Resolve signal names against `layout`.
    pub fn to_port(&self, layout: &SignalLayout) -> Result<TriggerPort, CaptureError> {
        Ok(match self {
            TriggerSettings::Match { signal, value } => {
                TriggerTerm::new(layout.place(signal, *value)?, layout.field_mask(signal)?).into()
            }
            TriggerSettings::Pattern { pattern, mask } => TriggerTerm::new(*pattern, *mask).into(),
            TriggerSettings::Range { signal, low, high } => RangeDetector::new(
                layout.place(signal, *low)?,
                layout.place(signal, *high)?,
                layout.field_mask(signal)?,
            )
            .into(),
            TriggerSettings::Edge { signal, edge } => {
                let mask = layout.field_mask(signal)?;
                match edge {
                    EdgeKind::Rising => EdgeDetector::rising(mask),
                    EdgeKind::Falling => EdgeDetector::falling(mask),
                    EdgeKind::Both => EdgeDetector::new(0, 0, mask),
                }
                .into()
            }
        })
    }
}

/// Capture configuration applied when a target starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Arm the capture engine as soon as the target is built.
    pub arm_on_start: bool,
    pub triggers: Vec<TriggerSettings>,
}

impl CaptureSettings {
    pub fn ports(&self, layout: &SignalLayout) -> Result<Vec<TriggerPort>, CaptureError> {
        self.triggers.iter().map(|t| t.to_port(layout)).collect()
    }
}

/// Where and how finished captures are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub format: TraceFormat,
    pub directory: PathBuf,
    /// File name without extension.
    pub file_stem: String,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            format: TraceFormat::Vcd,
            directory: PathBuf::from("."),
            file_stem: "capture".to_string(),
        }
    }
}

impl ExportSettings {
    /// Destination path for the configured format.
    pub fn path(&self) -> PathBuf {
        self.path_in(&self.directory)
    }

    pub fn path_in(&self, directory: &Path) -> PathBuf {
        directory.join(format!("{}.{}", self.file_stem, self.format.extension()))
    }
}

/// Runner loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Outer loop iterations per second; zero runs unthrottled.
    pub tick_rate_hz: u32,
    pub cycles_per_tick: u64,
    /// Stop after this many cycles. Zero runs until interrupted.
    pub max_cycles: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            cycles_per_tick: DEFAULT_CYCLES_PER_TICK,
            max_cycles: 0,
        }
    }
}
