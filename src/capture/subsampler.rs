//! Sample-rate divider.

use super::CaptureError;

/// Commits one sample out of every `divider` instants, starting with the
/// first instant after a reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subsampler {
    divider: u32,
    phase: u32,
}

impl Subsampler {
    pub fn new(divider: u32) -> Result<Self, CaptureError> {
        if divider == 0 {
            return Err(CaptureError::InvalidDivider);
        }
        Ok(Self { divider, phase: 0 })
    }

    pub fn divider(&self) -> u32 {
        self.divider
    }

    /// Position inside the current group; 0 means the next instant commits.
    pub fn phase(&self) -> u32 {
        self.phase
    }

    pub fn set_divider(&mut self, divider: u32) -> Result<(), CaptureError> {
        if divider == 0 {
            return Err(CaptureError::InvalidDivider);
        }
        self.divider = divider;
        self.phase = 0;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.phase = 0;
    }

    /// Advance one instant. Returns true if this instant is committed.
    #[inline]
    pub fn tick(&mut self) -> bool {
        let commit = self.phase == 0;
        self.phase += 1;
        if self.phase == self.divider {
            self.phase = 0;
        }
        commit
    }
}

impl Default for Subsampler {
    fn default() -> Self {
        Self {
            divider: 1,
            phase: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_commits_first_of_each_group() {
        let mut s = Subsampler::new(3).unwrap();
        let mut committed = Vec::new();
        for i in 0..9 {
            if s.tick() {
                committed.push(i);
            }
        }
        assert_eq!(committed, vec![0, 3, 6]);
    }

    #[test]
    fn test_zero_divider_rejected() {
        assert_eq!(Subsampler::new(0), Err(CaptureError::InvalidDivider));
        let mut s = Subsampler::default();
        assert_eq!(s.set_divider(0), Err(CaptureError::InvalidDivider));
        assert_eq!(s.divider(), 1);
    }

    proptest! {
        #[test]
        fn test_commit_rate(divider in 1u32..16, groups in 0u32..32) {
            let mut s = Subsampler::new(divider).unwrap();
            let commits = (0..divider * groups).filter(|_| s.tick()).count();
            prop_assert_eq!(commits as u32, groups);
            prop_assert_eq!(s.phase(), 0);
        }
    }
}
