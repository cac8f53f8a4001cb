/// Compiled execution plan for a pipeline graph.
/// Holds, per clock domain, the stage order and the links to tick.
#[derive(Debug, Clone, Default)]
pub struct CompiledPlan {
    /// Indexed by `DomainId`.
    pub domains: Vec<DomainPlan>,

    /// Cache invalidation generation number
    pub generation: u64,

    /// Compilation statistics
    pub stats: PlanStats,

    /// Stages not on any source-to-sink path
    pub idle_stages: Vec<usize>,
}

/// Execution schedule for one clock domain.
#[derive(Debug, Clone, Default)]
pub struct DomainPlan {
    /// Stage indices in topological order. `decide` walks it backwards,
    /// `transfer` forwards.
    pub order: Vec<usize>,

    /// Link indices clocked by this domain
    pub links: Vec<usize>,
}

/// Statistics about the compiled plan
#[derive(Debug, Clone, Default)]
pub struct PlanStats {
    pub total_stages: usize,

    /// Stages on a source-to-sink path
    pub active_stages: usize,

    pub idle_stages: usize,

    /// Stages without input ports
    pub source_stages: usize,

    /// Stages without output ports
    pub sink_stages: usize,

    pub links: usize,

    pub crossings: usize,

    /// Compilation time in microseconds
    pub compile_time_us: u64,
}

impl CompiledPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the plan schedules any stage
    pub fn is_empty(&self) -> bool {
        self.domains.iter().all(|d| d.order.is_empty())
    }

    pub fn domain(&self, index: usize) -> Option<&DomainPlan> {
        self.domains.get(index)
    }
}
