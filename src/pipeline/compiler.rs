use super::compiled_plan::{CompiledPlan, DomainPlan, PlanStats};
use super::error::{PipelineError, PipelineResult};
use super::executor::{ClockCrossing, CrossingSide, Link, StageSlot};
use super::port::PortDirection;
use std::collections::VecDeque;

/// Compiles a pipeline graph into a per-domain execution plan
pub struct PipelineCompiler;

impl PipelineCompiler {
    /// Compile a pipeline graph.
    ///
    /// Stages are ordered topologically over the links (all of which stay
    /// inside one domain). Clock crossings do not constrain the order: the
    /// queue between writer and reader breaks the combinational path.
    /// Bidirectional reachability, with crossings treated as edges, flags
    /// stages that sit on no source-to-sink path.
    ///
    /// # Arguments
    /// * `stages` - All stages in the graph
    /// * `links` - All links in the graph
    /// * `crossings` - Writer/reader pairs sharing a clock-domain queue
    /// * `domains` - Number of clock domains
    /// * `generation` - Generation counter for cache invalidation
    ///
    /// # Errors
    /// `CycleDetected` if the links form a loop.
    pub fn compile(
        stages: &[StageSlot],
        links: &[Link],
        crossings: &[ClockCrossing],
        domains: usize,
        generation: u64,
    ) -> PipelineResult<CompiledPlan> {
        let start_time = std::time::Instant::now();
        let n = stages.len();

        let order = Self::topological_sort(n, links)?;

        let mut domain_plans = vec![DomainPlan::default(); domains];
        for &idx in &order {
            if let Some(plan) = domain_plans.get_mut(stages[idx].domain.index()) {
                plan.order.push(idx);
            }
        }
        for (idx, link) in links.iter().enumerate() {
            if let Some(plan) = domain_plans.get_mut(link.domain.index()) {
                plan.links.push(idx);
            }
        }

        // Build adjacency lists (forward and backward), crossings included
        let (fwd_adj, bwd_adj) = Self::build_adjacency(n, links, crossings);

        let sources: Vec<usize> = (0..n)
            .filter(|&idx| !Self::has_port(&stages[idx], PortDirection::Input))
            .collect();
        let sinks: Vec<usize> = (0..n)
            .filter(|&idx| !Self::has_port(&stages[idx], PortDirection::Output))
            .collect();

        let fwd_reachable = Self::reachability(&sources, &fwd_adj, n);
        let bwd_reachable = Self::reachability(&sinks, &bwd_adj, n);

        let idle_stages: Vec<usize> = (0..n)
            .filter(|&idx| !(fwd_reachable[idx] && bwd_reachable[idx]))
            .collect();

        let stats = PlanStats {
            total_stages: n,
            active_stages: n - idle_stages.len(),
            idle_stages: idle_stages.len(),
            source_stages: sources.len(),
            sink_stages: sinks.len(),
            links: links.len(),
            crossings: crossings.len(),
            compile_time_us: start_time.elapsed().as_micros() as u64,
        };

        Ok(CompiledPlan {
            domains: domain_plans,
            generation,
            stats,
            idle_stages,
        })
    }

    /// Kahn's algorithm over the link graph. Ready stages are taken in index
    /// order so the schedule is deterministic.
    fn topological_sort(n: usize, links: &[Link]) -> PipelineResult<Vec<usize>> {
        let mut in_degree = vec![0usize; n];
        let mut fwd_adj = vec![Vec::new(); n];
        for link in links {
            fwd_adj[link.from.index()].push(link.to.index());
            in_degree[link.to.index()] += 1;
        }

        let mut queue: VecDeque<usize> = (0..n).filter(|&idx| in_degree[idx] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(idx) = queue.pop_front() {
            order.push(idx);
            for &next in &fwd_adj[idx] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() < n {
            return Err(PipelineError::CycleDetected);
        }
        Ok(order)
    }

    fn build_adjacency(
        n: usize,
        links: &[Link],
        crossings: &[ClockCrossing],
    ) -> (Vec<Vec<usize>>, Vec<Vec<usize>>) {
        let mut fwd_adj = vec![Vec::new(); n];
        let mut bwd_adj = vec![Vec::new(); n];

        let edges = links
            .iter()
            .map(|l| (l.from.index(), l.to.index()))
            .chain(crossings.iter().map(|c| (c.writer.index(), c.reader.index())));
        for (from, to) in edges {
            fwd_adj[from].push(to);
            bwd_adj[to].push(from);
        }

        (fwd_adj, bwd_adj)
    }

    /// A source has no input ports, a sink no output ports. Defined by port
    /// structure, not by connectivity. The writer half of a crossing counts as
    /// having an output through the queue, and the reader half an input.
    fn has_port(slot: &StageSlot, direction: PortDirection) -> bool {
        match (slot.crossing, direction) {
            (Some(CrossingSide::Writer), PortDirection::Output) => true,
            (Some(CrossingSide::Reader), PortDirection::Input) => true,
            _ => slot.stage.ports().iter().any(|p| p.direction == direction),
        }
    }

    /// DFS from `roots` along `adj`.
    fn reachability(roots: &[usize], adj: &[Vec<usize>], n: usize) -> Vec<bool> {
        let mut reachable = vec![false; n];
        let mut stack = Vec::new();

        for &root in roots {
            reachable[root] = true;
            stack.push(root);
        }

        while let Some(idx) = stack.pop() {
            for &next in &adj[idx] {
                if !reachable[next] {
                    reachable[next] = true;
                    stack.push(next);
                }
            }
        }

        reachable
    }
}
