//! Port descriptors for pipeline stages.
//!
//! Each stage declares its ports via a static `PortDescriptor` array (or a
//! per-instance one when the width is configurable). The pipeline uses these
//! to validate links.

use serde::Serialize;

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PortDirection {
    Input,
    Output,
}

/// Static descriptor for a stage's port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortDescriptor {
    pub name: &'static str,
    pub direction: PortDirection,
    /// Payload width in bits.
    pub width: u32,
}

impl PortDescriptor {
    pub const fn input(name: &'static str, width: u32) -> Self {
        Self {
            name,
            direction: PortDirection::Input,
            width,
        }
    }

    pub const fn output(name: &'static str, width: u32) -> Self {
        Self {
            name,
            direction: PortDirection::Output,
            width,
        }
    }
}

/// Position of port `name` among the ports of `direction`.
pub(crate) fn position_of(ports: &[PortDescriptor], name: &str, direction: PortDirection) -> Option<usize> {
    ports
        .iter()
        .filter(|p| p.direction == direction)
        .position(|p| p.name == name)
}
