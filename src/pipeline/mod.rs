//! Stage-graph dataflow over valid/ready links.
//!
//! Stages live in clock domains and talk through [`StreamEndpoint`] links.
//! A link never crosses a domain boundary; the only path between domains is a
//! writer/reader stage pair sharing one [`ClockDomainQueue`].
//!
//! # Architecture
//!
//! ```text
//!  sys domain                          │  pix domain
//! [DmaReader] ──► [CdcWriter] ══queue══►[CdcReader] ──► [Buffer] ──► [Encoder] ──► [UdpStreamer]
//! ```
//!
//! # Design
//!
//! - **Enum dispatch on hot path** - `BuiltinStage` enum for all built-in stages.
//! - **Two-phase cycle** - `decide` in reverse topological order, `transfer` forward.
//! - **Deterministic time** - `ClockScheduler` visits simultaneous edges in domain order.
//!
//! [`StreamEndpoint`]: crate::stream::StreamEndpoint
//! [`ClockDomainQueue`]: crate::stream::ClockDomainQueue

pub mod clock;
pub mod compiled_plan;
pub mod compiler;
pub mod error;
pub mod executor;
pub mod id;
pub mod indicator;
pub mod node;
pub mod nodes;
pub mod packet;
pub mod port;

pub use clock::{ClockDomain, ClockScheduler};
pub use compiled_plan::{CompiledPlan, DomainPlan, PlanStats};
pub use error::{PipelineError, PipelineResult};
pub use executor::{ClockCrossing, CrossingSide, Link, Pipeline, StageSlot};
pub use id::{DomainId, LinkId, NodeId};
pub use indicator::{Indicator, IndicatorBinding, IndicatorSource};
pub use node::{AnyStage, BuiltinStage, StageContext, StagePlugin, StageStats};
pub use packet::{Beat, ConfigValue};
pub use port::{PortDescriptor, PortDirection};
