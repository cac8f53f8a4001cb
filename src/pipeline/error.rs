//! Pipeline-specific error types.

use crate::pipeline::id::{DomainId, NodeId};
use thiserror::Error;

/// Errors that can occur within the pipeline system.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Unknown stage {0:?}")]
    UnknownStage(NodeId),

    #[error("Unknown clock domain {0:?}")]
    UnknownDomain(DomainId),

    #[error("Invalid clock domain: {0}")]
    InvalidDomain(String),

    #[error("Invalid link: {0}")]
    InvalidLink(String),

    #[error("Link from domain '{from}' to domain '{to}' must go through a clock-domain queue")]
    CrossDomainLink { from: String, to: String },

    #[error("Invalid clock crossing: {0}")]
    InvalidCrossing(String),

    #[error("Cycle detected in pipeline graph")]
    CycleDetected,

    #[error("Port mismatch: {0}")]
    PortMismatch(String),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
