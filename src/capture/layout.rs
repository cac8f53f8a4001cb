//! Signal layout: the ordered, named bit fields making up one sample.
//!
//! Field 0 occupies the least significant bits of the packed
//! [`SampleVector`]; each following field sits directly above the previous.

use super::CaptureError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Widest sample vector the engine can hold.
pub const MAX_SAMPLE_WIDTH: u32 = 128;

/// One tapped signal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalField {
    pub name: String,
    pub width: u32,
}

impl SignalField {
    pub fn new(name: impl Into<String>, width: u32) -> Self {
        Self {
            name: name.into(),
            width,
        }
    }

    /// Unpositioned mask covering `width` bits.
    pub fn mask(&self) -> u128 {
        width_mask(self.width)
    }
}

/// Concatenation of every tapped value at one sample instant.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SampleVector(pub u128);

impl fmt::Debug for SampleVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SampleVector(0x{:x})", self.0)
    }
}

#[inline]
pub(crate) fn width_mask(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Ordered set of signal fields with precomputed bit offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalLayout {
    fields: Vec<SignalField>,
    offsets: Vec<u32>,
    total_width: u32,
}

impl SignalLayout {
    pub fn new(fields: Vec<SignalField>) -> Result<Self, CaptureError> {
        if fields.is_empty() {
            return Err(CaptureError::InvalidLayout(
                "at least one signal is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut offsets = Vec::with_capacity(fields.len());
        let mut total_width = 0u32;
        for field in &fields {
            if !is_valid_name(&field.name) {
                return Err(CaptureError::InvalidLayout(format!(
                    "invalid signal name '{}'",
                    field.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(CaptureError::InvalidLayout(format!(
                    "duplicate signal '{}'",
                    field.name
                )));
            }
            if field.width == 0 || field.width > MAX_SAMPLE_WIDTH {
                return Err(CaptureError::InvalidLayout(format!(
                    "signal '{}' has width {}",
                    field.name, field.width
                )));
            }
            offsets.push(total_width);
            total_width += field.width;
            if total_width > MAX_SAMPLE_WIDTH {
                return Err(CaptureError::InvalidLayout(format!(
                    "total width exceeds {MAX_SAMPLE_WIDTH} bits"
                )));
            }
        }

        Ok(Self {
            fields,
            offsets,
            total_width,
        })
    }

    pub fn fields(&self) -> &[SignalField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn total_width(&self) -> u32 {
        self.total_width
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Mask selecting signal `name` inside the packed vector.
    pub fn field_mask(&self, name: &str) -> Result<u128, CaptureError> {
        let idx = self
            .index_of(name)
            .ok_or_else(|| CaptureError::UnknownSignal(name.to_string()))?;
        Ok(self.fields[idx].mask() << self.offsets[idx])
    }

    /// `value` shifted into the position of signal `name`.
    pub fn place(&self, name: &str, value: u128) -> Result<u128, CaptureError> {
        let idx = self
            .index_of(name)
            .ok_or_else(|| CaptureError::UnknownSignal(name.to_string()))?;
        let field = &self.fields[idx];
        if value & !field.mask() != 0 {
            return Err(CaptureError::ValueTooWide {
                signal: field.name.clone(),
                width: field.width,
                value,
            });
        }
        Ok(value << self.offsets[idx])
    }

    /// Pack one value per field, in layout order.
    pub fn pack(&self, values: &[u128]) -> Result<SampleVector, CaptureError> {
        if values.len() != self.fields.len() {
            return Err(CaptureError::LayoutMismatch {
                expected: self.fields.len(),
                got: values.len(),
            });
        }
        let mut packed = 0u128;
        for ((field, &offset), &value) in self.fields.iter().zip(&self.offsets).zip(values) {
            if value & !field.mask() != 0 {
                return Err(CaptureError::ValueTooWide {
                    signal: field.name.clone(),
                    width: field.width,
                    value,
                });
            }
            packed |= value << offset;
        }
        Ok(SampleVector(packed))
    }

    /// Value of field `index` inside `sample`.
    ///
    /// # Panics
    /// If `index` is out of range.
    pub fn value(&self, sample: SampleVector, index: usize) -> u128 {
        (sample.0 >> self.offsets[index]) & self.fields[index].mask()
    }

    pub fn unpack(&self, sample: SampleVector) -> Vec<u128> {
        (0..self.fields.len())
            .map(|idx| self.value(sample, idx))
            .collect()
    }

    /// True if `sample` has no bits above the layout's total width.
    pub fn fits(&self, sample: SampleVector) -> bool {
        sample.0 & !width_mask(self.total_width) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> SignalLayout {
        SignalLayout::new(vec![
            SignalField::new("scl", 1),
            SignalField::new("sda", 1),
            SignalField::new("counter", 8),
            SignalField::new("fsm_state", 4),
        ])
        .unwrap()
    }

    #[test]
    fn test_pack_unpack() {
        let layout = layout();
        assert_eq!(layout.total_width(), 14);
        let sample = layout.pack(&[1, 0, 0xAB, 0x5]).unwrap();
        assert_eq!(sample.0, 1 | (0xAB << 2) | (0x5 << 10));
        assert_eq!(layout.unpack(sample), vec![1, 0, 0xAB, 0x5]);
        assert_eq!(layout.value(sample, 2), 0xAB);
    }

    #[test]
    fn test_pack_rejects_wide_value() {
        let err = layout().pack(&[2, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, CaptureError::ValueTooWide { width: 1, .. }));
    }

    #[test]
    fn test_pack_rejects_wrong_arity() {
        assert_eq!(
            layout().pack(&[0, 0]).unwrap_err(),
            CaptureError::LayoutMismatch {
                expected: 4,
                got: 2
            }
        );
    }

    #[test]
    fn test_place_and_mask() {
        let layout = layout();
        assert_eq!(layout.field_mask("counter").unwrap(), 0xFF << 2);
        assert_eq!(layout.place("fsm_state", 3).unwrap(), 3 << 10);
        assert!(matches!(
            layout.place("missing", 0),
            Err(CaptureError::UnknownSignal(_))
        ));
    }

    #[test]
    fn test_rejects_bad_layouts() {
        assert!(SignalLayout::new(vec![]).is_err());
        assert!(SignalLayout::new(vec![SignalField::new("a", 0)]).is_err());
        assert!(SignalLayout::new(vec![SignalField::new("1a", 1)]).is_err());
        assert!(SignalLayout::new(vec![SignalField::new("a b", 1)]).is_err());
        assert!(
            SignalLayout::new(vec![SignalField::new("a", 1), SignalField::new("a", 2)]).is_err()
        );
        assert!(
            SignalLayout::new(vec![SignalField::new("a", 100), SignalField::new("b", 29)])
                .is_err()
        );
    }

    #[test]
    fn test_full_width_field() {
        let layout = SignalLayout::new(vec![SignalField::new("bus", 128)]).unwrap();
        let sample = layout.pack(&[u128::MAX]).unwrap();
        assert_eq!(layout.value(sample, 0), u128::MAX);
        assert!(layout.fits(sample));
    }
}
