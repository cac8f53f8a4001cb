//! Pipeline executor - the stage graph and its clocked step loop.
//!
//! Each step advances simulated time to the next clock edge. For every
//! domain with an edge at that instant, in domain order:
//! 1. `decide` every stage of the domain in reverse topological order
//!    (consumers publish ready before their producers look).
//! 2. `transfer` every stage in topological order.
//! 3. Tick the domain's links, closing the cycle.

use crate::pipeline::clock::{ClockDomain, ClockScheduler};
use crate::pipeline::compiled_plan::CompiledPlan;
use crate::pipeline::compiler::PipelineCompiler;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::{DomainId, LinkId, NodeId};
use crate::pipeline::indicator::{Indicator, IndicatorBinding, IndicatorSource};
use crate::pipeline::node::{AnyStage, StageContext, StageStats};
use crate::pipeline::nodes::{CdcReaderStage, CdcWriterStage};
use crate::pipeline::packet::{Beat, ConfigValue};
use crate::pipeline::port::{position_of, PortDirection};
use crate::stream::{ClockDomainQueue, StreamEndpoint};

/// A point-to-point stream between an output port and an input port of two
/// stages in the same clock domain.
#[derive(Debug)]
pub struct Link {
    pub id: LinkId,
    pub from: NodeId,
    pub from_port: usize,
    pub to: NodeId,
    pub to_port: usize,
    pub domain: DomainId,
    pub width: u32,
    pub endpoint: StreamEndpoint<Beat>,
}

/// Which half of a clock crossing a stage is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossingSide {
    Writer,
    Reader,
}

/// A writer/reader pair sharing one clock-domain queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockCrossing {
    pub writer: NodeId,
    pub reader: NodeId,
    pub from: DomainId,
    pub to: DomainId,
    pub capacity: usize,
}

/// A slot holding a stage and its port-to-link wiring.
pub struct StageSlot {
    pub stage: AnyStage,
    pub domain: DomainId,
    /// Link per input port, in port order.
    pub inputs: Vec<Option<LinkId>>,
    /// Link per output port, in port order.
    pub outputs: Vec<Option<LinkId>>,
    pub crossing: Option<CrossingSide>,
}

impl StageSlot {
    fn new(stage: AnyStage, domain: DomainId, crossing: Option<CrossingSide>) -> Self {
        let count = |dir| stage.ports().iter().filter(|p| p.direction == dir).count();
        let inputs = vec![None; count(PortDirection::Input)];
        let outputs = vec![None; count(PortDirection::Output)];
        Self {
            stage,
            domain,
            inputs,
            outputs,
            crossing,
        }
    }
}

/// The stage graph and executor.
pub struct Pipeline {
    name: String,
    clocks: ClockScheduler,
    stages: Vec<StageSlot>,
    links: Vec<Link>,
    crossings: Vec<ClockCrossing>,
    indicators: Vec<IndicatorBinding>,
    /// Cached compiled execution plan
    plan: CompiledPlan,
    /// Generation counter for cache invalidation
    generation: u64,
    /// Whether plan needs recompilation
    plan_dirty: bool,
    /// Scratch list of domains due at the current edge.
    due: Vec<DomainId>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clocks: ClockScheduler::new(),
            stages: Vec::new(),
            links: Vec::new(),
            crossings: Vec::new(),
            indicators: Vec::new(),
            plan: CompiledPlan::new(),
            generation: 0,
            plan_dirty: true,
            due: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ── Graph building ──

    /// Add a clock domain with the given period in picoseconds.
    pub fn add_domain(&mut self, name: &str, period_ps: u64) -> PipelineResult<DomainId> {
        let id = self.clocks.add(ClockDomain::new(name, period_ps))?;
        self.invalidate_plan();
        tracing::debug!("{}: domain '{}' ({} ps) = {}", self.name, name, period_ps, id);
        Ok(id)
    }

    /// Add a stage clocked by `domain`. Returns its NodeId.
    pub fn add_stage(
        &mut self,
        stage: impl Into<AnyStage>,
        domain: DomainId,
    ) -> PipelineResult<NodeId> {
        self.check_domain(domain)?;
        Ok(self.push_stage(stage.into(), domain, None))
    }

    fn push_stage(
        &mut self,
        stage: AnyStage,
        domain: DomainId,
        crossing: Option<CrossingSide>,
    ) -> NodeId {
        let id = NodeId(self.stages.len() as u32);
        self.stages.push(StageSlot::new(stage, domain, crossing));
        self.invalidate_plan();
        id
    }

    /// Create a clock-domain queue of `capacity` beats between two domains.
    /// Returns the writer stage (clocked by `from`, input port `in`) and the
    /// reader stage (clocked by `to`, output port `out`).
    pub fn add_clock_crossing(
        &mut self,
        capacity: usize,
        width: u32,
        from: DomainId,
        to: DomainId,
    ) -> PipelineResult<(NodeId, NodeId)> {
        self.check_domain(from)?;
        self.check_domain(to)?;
        if from == to {
            return Err(PipelineError::InvalidCrossing(format!(
                "both sides are in domain '{}'",
                self.domain_name(from)
            )));
        }
        if capacity == 0 {
            return Err(PipelineError::InvalidCrossing(
                "queue capacity must be non-zero".into(),
            ));
        }

        let label = format!("cdc.{}_to_{}", self.domain_name(from), self.domain_name(to));
        let (wr, rd) = ClockDomainQueue::new(capacity).split();
        let writer = self.push_stage(
            CdcWriterStage::new(format!("{label}.writer"), width, wr).into(),
            from,
            Some(CrossingSide::Writer),
        );
        let reader = self.push_stage(
            CdcReaderStage::new(format!("{label}.reader"), width, rd).into(),
            to,
            Some(CrossingSide::Reader),
        );
        self.crossings.push(ClockCrossing {
            writer,
            reader,
            from,
            to,
            capacity,
        });
        tracing::debug!("{}: {} with {} slots", self.name, label, capacity);
        Ok((writer, reader))
    }

    /// Connect output port `from_port` of `from` to input port `to_port` of `to`.
    pub fn connect(
        &mut self,
        from: NodeId,
        from_port: &str,
        to: NodeId,
        to_port: &str,
    ) -> PipelineResult<LinkId> {
        let src = self
            .stages
            .get(from.index())
            .ok_or(PipelineError::UnknownStage(from))?;
        let dst = self
            .stages
            .get(to.index())
            .ok_or(PipelineError::UnknownStage(to))?;

        let out_idx = position_of(src.stage.ports(), from_port, PortDirection::Output)
            .ok_or_else(|| {
                PipelineError::PortMismatch(format!(
                    "stage '{}' has no output port '{}'",
                    src.stage.name(),
                    from_port
                ))
            })?;
        let in_idx =
            position_of(dst.stage.ports(), to_port, PortDirection::Input).ok_or_else(|| {
                PipelineError::PortMismatch(format!(
                    "stage '{}' has no input port '{}'",
                    dst.stage.name(),
                    to_port
                ))
            })?;

        let width_of = |slot: &StageSlot, name: &str, dir| {
            slot.stage
                .ports()
                .iter()
                .find(|p| p.direction == dir && p.name == name)
                .map_or(0, |p| p.width)
        };
        let out_width = width_of(src, from_port, PortDirection::Output);
        let in_width = width_of(dst, to_port, PortDirection::Input);
        if out_width != in_width {
            return Err(PipelineError::PortMismatch(format!(
                "{}.{} is {} bits wide, {}.{} is {} bits wide",
                src.stage.name(),
                from_port,
                out_width,
                dst.stage.name(),
                to_port,
                in_width
            )));
        }

        if src.domain != dst.domain {
            return Err(PipelineError::CrossDomainLink {
                from: self.domain_name(src.domain),
                to: self.domain_name(dst.domain),
            });
        }
        if src.outputs[out_idx].is_some() {
            return Err(PipelineError::InvalidLink(format!(
                "{}.{} already has a consumer",
                src.stage.name(),
                from_port
            )));
        }
        if dst.inputs[in_idx].is_some() {
            return Err(PipelineError::InvalidLink(format!(
                "{}.{} already has a producer",
                dst.stage.name(),
                to_port
            )));
        }

        let id = LinkId(self.links.len() as u32);
        let name = format!(
            "{}.{}->{}.{}",
            src.stage.name(),
            from_port,
            dst.stage.name(),
            to_port
        );
        let domain = src.domain;
        self.links.push(Link {
            id,
            from,
            from_port: out_idx,
            to,
            to_port: in_idx,
            domain,
            width: out_width,
            endpoint: StreamEndpoint::new(name),
        });
        self.stages[from.index()].outputs[out_idx] = Some(id);
        self.stages[to.index()].inputs[in_idx] = Some(id);
        self.invalidate_plan();
        Ok(id)
    }

    /// Mirror a level of `link`'s last completed cycle on a named indicator.
    pub fn add_indicator(
        &mut self,
        name: impl Into<String>,
        link: LinkId,
        source: IndicatorSource,
    ) -> PipelineResult<()> {
        if link.index() >= self.links.len() {
            return Err(PipelineError::InvalidLink(format!("unknown link {link}")));
        }
        self.indicators.push(IndicatorBinding {
            name: name.into(),
            link,
            source,
        });
        Ok(())
    }

    fn check_domain(&self, domain: DomainId) -> PipelineResult<()> {
        if domain.index() < self.clocks.len() {
            Ok(())
        } else {
            Err(PipelineError::UnknownDomain(domain))
        }
    }

    fn domain_name(&self, domain: DomainId) -> String {
        self.clocks
            .domain(domain)
            .map_or_else(|| domain.to_string(), |d| d.name.clone())
    }

    // ── Compilation ──

    /// Invalidate the compiled plan (called when graph topology changes).
    fn invalidate_plan(&mut self) {
        self.plan_dirty = true;
        self.generation += 1;
    }

    /// Compile the graph now. `step` compiles lazily, so calling this is only
    /// needed to surface errors early.
    pub fn compile(&mut self) -> PipelineResult<()> {
        if !self.plan_dirty {
            return Ok(());
        }
        self.plan = PipelineCompiler::compile(
            &self.stages,
            &self.links,
            &self.crossings,
            self.clocks.len(),
            self.generation,
        )?;
        self.plan_dirty = false;

        tracing::debug!(
            "{} compiled: {} stages ({} idle), {} links, {} crossings (gen {})",
            self.name,
            self.plan.stats.total_stages,
            self.plan.stats.idle_stages,
            self.plan.stats.links,
            self.plan.stats.crossings,
            self.plan.generation,
        );
        for &idx in &self.plan.idle_stages {
            tracing::warn!(
                "{}: stage '{}' (idx {}) is not on a source-to-sink path",
                self.name,
                self.stages[idx].stage.name(),
                idx
            );
        }
        Ok(())
    }

    pub fn plan(&self) -> &CompiledPlan {
        &self.plan
    }

    // ── Execution ──

    /// Advance to the next clock edge and run every domain clocked there.
    /// Returns the new simulated time in picoseconds.
    pub fn step(&mut self) -> PipelineResult<u64> {
        self.compile()?;
        let mut due = std::mem::take(&mut self.due);
        let now = self
            .clocks
            .advance(&mut due)
            .ok_or_else(|| PipelineError::InvalidDomain("pipeline has no clock domains".into()))?;
        for &domain in &due {
            self.run_domain_cycle(domain);
        }
        self.due = due;
        Ok(now)
    }

    /// Step until `domain` has completed `n` more cycles.
    pub fn run_cycles(&mut self, domain: DomainId, n: u64) -> PipelineResult<()> {
        self.check_domain(domain)?;
        let target = self.clocks.cycles(domain) + n;
        while self.clocks.cycles(domain) < target {
            self.step()?;
        }
        Ok(())
    }

    fn run_domain_cycle(&mut self, domain: DomainId) {
        let cycle = self.clocks.cycles(domain);
        let Some(plan) = self.plan.domains.get(domain.index()) else {
            return;
        };

        for &idx in plan.order.iter().rev() {
            let slot = &mut self.stages[idx];
            let mut ctx =
                StageContext::new(&mut self.links, &slot.inputs, &slot.outputs, domain, cycle);
            slot.stage.decide(&mut ctx);
        }
        for &idx in &plan.order {
            let slot = &mut self.stages[idx];
            let mut ctx =
                StageContext::new(&mut self.links, &slot.inputs, &slot.outputs, domain, cycle);
            slot.stage.transfer(&mut ctx);
        }
        for &idx in &plan.links {
            self.links[idx].endpoint.tick();
        }
    }

    /// Return every stage, link and clock to power-on state. The graph is kept.
    pub fn reset(&mut self) {
        self.clocks.reset();
        for slot in &mut self.stages {
            slot.stage.on_reset();
        }
        for link in &mut self.links {
            link.endpoint.reset();
        }
        tracing::debug!("{} reset", self.name);
    }

    // ── Inspection and control ──

    /// Current indicator levels.
    pub fn indicators(&self) -> Vec<Indicator> {
        self.indicators
            .iter()
            .map(|b| {
                let handshake = self.links[b.link.index()].endpoint.last_cycle();
                Indicator::new(b.name.clone(), b.source.level(handshake))
            })
            .collect()
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id.index())
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn crossings(&self) -> &[ClockCrossing] {
        &self.crossings
    }

    pub fn stage(&self, id: NodeId) -> Option<&AnyStage> {
        self.stages.get(id.index()).map(|s| &s.stage)
    }

    pub fn stage_mut(&mut self, id: NodeId) -> Option<&mut AnyStage> {
        self.stages.get_mut(id.index()).map(|s| &mut s.stage)
    }

    pub fn stage_stats(&self, id: NodeId) -> Option<StageStats> {
        self.stage(id).map(|s| s.stats())
    }

    pub fn stage_domain(&self, id: NodeId) -> Option<DomainId> {
        self.stages.get(id.index()).map(|s| s.domain)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn configure_stage(
        &mut self,
        id: NodeId,
        key: &str,
        value: &ConfigValue,
    ) -> PipelineResult<()> {
        let slot = self
            .stages
            .get_mut(id.index())
            .ok_or(PipelineError::UnknownStage(id))?;
        tracing::debug!("{}: {}.{} = {:?}", self.name, slot.stage.name(), key, value);
        slot.stage.on_config_change(key, value);
        Ok(())
    }

    pub fn domain(&self, id: DomainId) -> Option<&ClockDomain> {
        self.clocks.domain(id)
    }

    pub fn find_domain(&self, name: &str) -> Option<DomainId> {
        self.clocks.find(name)
    }

    /// Completed cycles of `domain`.
    pub fn domain_cycles(&self, domain: DomainId) -> u64 {
        self.clocks.cycles(domain)
    }

    /// Simulated time in picoseconds.
    pub fn now_ps(&self) -> u64 {
        self.clocks.now_ps()
    }
}
