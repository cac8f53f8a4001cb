//! Payload and configuration value types for the pipeline.

use crate::capture::layout::width_mask;

/// One stream beat: up to 128 data bits plus an end-of-packet marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Beat {
    pub data: u128,
    /// Last beat of a packet (frame, datagram).
    pub last: bool,
}

impl Beat {
    pub const fn new(data: u128) -> Self {
        Self { data, last: false }
    }

    pub const fn last(data: u128) -> Self {
        Self { data, last: true }
    }

    /// True if `data` fits a port of `width` bits.
    #[inline]
    pub fn fits(&self, width: u32) -> bool {
        self.data & !width_mask(width) == 0
    }
}

/// Stage configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ConfigValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Non-negative integer as `usize`.
    pub fn as_usize(&self) -> Option<usize> {
        self.as_int().and_then(|v| usize::try_from(v).ok())
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl std::str::FromStr for ConfigValue {
    type Err = std::convert::Infallible;

    /// Parse a command-line value: `true`/`false`, integers, floats, otherwise text.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(b) = s.parse::<bool>() {
            return Ok(ConfigValue::Bool(b));
        }
        if let Ok(i) = s.parse::<i64>() {
            return Ok(ConfigValue::Int(i));
        }
        if let Ok(f) = s.parse::<f64>() {
            return Ok(ConfigValue::Float(f));
        }
        Ok(ConfigValue::String(s.to_string()))
    }
}
