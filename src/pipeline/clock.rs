//! Clock domains and the edge scheduler.
//!
//! Every domain has a fixed period. The scheduler advances simulated time to
//! the earliest pending edge and reports all domains that share it, in domain
//! order, which keeps multi-domain runs deterministic.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::DomainId;
use serde::{Deserialize, Serialize};

/// A named clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockDomain {
    pub name: String,
    /// Clock period in picoseconds.
    pub period_ps: u64,
}

impl ClockDomain {
    pub fn new(name: impl Into<String>, period_ps: u64) -> Self {
        Self {
            name: name.into(),
            period_ps,
        }
    }

    /// Build from a frequency; rounds the period to the nearest picosecond.
    pub fn from_hz(name: impl Into<String>, hz: u64) -> Self {
        let period_ps = if hz == 0 {
            0
        } else {
            (1_000_000_000_000 + hz / 2) / hz
        };
        Self::new(name, period_ps)
    }
}

#[derive(Debug, Clone)]
struct DomainClock {
    domain: ClockDomain,
    next_edge_ps: u64,
    cycles: u64,
}

/// Multi-domain edge scheduler.
#[derive(Debug, Clone, Default)]
pub struct ClockScheduler {
    clocks: Vec<DomainClock>,
    now_ps: u64,
}

impl ClockScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, domain: ClockDomain) -> PipelineResult<DomainId> {
        if domain.period_ps == 0 {
            return Err(PipelineError::InvalidDomain(format!(
                "domain '{}' has a zero period",
                domain.name
            )));
        }
        if self.clocks.iter().any(|c| c.domain.name == domain.name) {
            return Err(PipelineError::InvalidDomain(format!(
                "domain '{}' already exists",
                domain.name
            )));
        }
        let id = DomainId(self.clocks.len() as u32);
        self.clocks.push(DomainClock {
            next_edge_ps: self.now_ps + domain.period_ps,
            domain,
            cycles: 0,
        });
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }

    pub fn domain(&self, id: DomainId) -> Option<&ClockDomain> {
        self.clocks.get(id.index()).map(|c| &c.domain)
    }

    pub fn find(&self, name: &str) -> Option<DomainId> {
        self.clocks
            .iter()
            .position(|c| c.domain.name == name)
            .map(|idx| DomainId(idx as u32))
    }

    /// Completed cycles of domain `id`.
    pub fn cycles(&self, id: DomainId) -> u64 {
        self.clocks.get(id.index()).map_or(0, |c| c.cycles)
    }

    pub fn now_ps(&self) -> u64 {
        self.now_ps
    }

    /// Move to the next edge. Fills `due` with every domain clocked at that
    /// instant and returns the new time, or `None` with no domains.
    pub fn advance(&mut self, due: &mut Vec<DomainId>) -> Option<u64> {
        due.clear();
        let next = self.clocks.iter().map(|c| c.next_edge_ps).min()?;
        for (idx, clock) in self.clocks.iter_mut().enumerate() {
            if clock.next_edge_ps == next {
                due.push(DomainId(idx as u32));
                clock.next_edge_ps += clock.domain.period_ps;
                clock.cycles += 1;
            }
        }
        self.now_ps = next;
        Some(next)
    }

    pub fn reset(&mut self) {
        self.now_ps = 0;
        for clock in &mut self.clocks {
            clock.next_edge_ps = clock.domain.period_ps;
            clock.cycles = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleaves_by_period() {
        let mut sched = ClockScheduler::new();
        let fast = sched.add(ClockDomain::new("fast", 2)).unwrap();
        let slow = sched.add(ClockDomain::new("slow", 3)).unwrap();

        let mut due = Vec::new();
        let mut trace = Vec::new();
        for _ in 0..4 {
            let t = sched.advance(&mut due).unwrap();
            trace.push((t, due.clone()));
        }
        assert_eq!(
            trace,
            vec![
                (2, vec![fast]),
                (3, vec![slow]),
                (4, vec![fast]),
                (6, vec![fast, slow]),
            ]
        );
        assert_eq!(sched.cycles(fast), 3);
        assert_eq!(sched.cycles(slow), 2);
    }

    #[test]
    fn test_rejects_bad_domains() {
        let mut sched = ClockScheduler::new();
        assert!(sched.add(ClockDomain::new("zero", 0)).is_err());
        sched.add(ClockDomain::new("sys", 10)).unwrap();
        assert!(sched.add(ClockDomain::new("sys", 20)).is_err());
        assert_eq!(sched.find("sys"), Some(DomainId(0)));
    }

    #[test]
    fn test_from_hz() {
        assert_eq!(ClockDomain::from_hz("sys", 100_000_000).period_ps, 10_000);
        assert_eq!(ClockDomain::from_hz("pix", 75_000_000).period_ps, 13_333);
    }

    #[test]
    fn test_empty_scheduler() {
        let mut sched = ClockScheduler::new();
        let mut due = Vec::new();
        assert_eq!(sched.advance(&mut due), None);
    }
}
