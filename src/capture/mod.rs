//! Triggered signal capture.
//!
//! A [`CaptureEngine`] records one [`SampleVector`] per sample instant into
//! bounded storage once its [`Trigger`] fires, thinned by a [`Subsampler`].
//! A completed capture is written out by an [`Exporter`].
//!
//! ```text
//! Idle ──arm──► Armed ──trigger──► Capturing ──full──► Done
//!                 ▲                                     │
//!                 └────────────────arm──────────────────┘
//! ```

pub mod engine;
pub mod export;
pub mod layout;
pub mod subsampler;
pub mod trigger;

pub use engine::{BoundaryPolicy, CaptureEngine, CaptureState, CaptureStatus};
pub use export::{ExportSummary, Exporter, TraceFormat};
pub use layout::{SampleVector, SignalField, SignalLayout, MAX_SAMPLE_WIDTH};
pub use subsampler::Subsampler;
pub use trigger::{EdgeDetector, RangeDetector, Trigger, TriggerPort, TriggerTerm};

use std::path::PathBuf;
use thiserror::Error;

/// Errors from capture configuration and sampling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("capture not complete (state: {0})")]
    NotDone(CaptureState),

    #[error("cannot reconfigure capture while {0}")]
    Busy(CaptureState),

    #[error("subsample divider must be at least 1")]
    InvalidDivider,

    #[error("invalid signal layout: {0}")]
    InvalidLayout(String),

    #[error("expected {expected} signal values, got {got}")]
    LayoutMismatch { expected: usize, got: usize },

    #[error("value 0x{value:x} does not fit {width}-bit signal '{signal}'")]
    ValueTooWide {
        signal: String,
        width: u32,
        value: u128,
    },

    #[error("unknown signal '{0}'")]
    UnknownSignal(String),

    #[error("no trigger port {0}")]
    NoSuchPort(usize),

    #[error("trigger port {0} is not a pattern/mask term")]
    NotATerm(usize),
}

/// Errors from writing a trace. The capture itself is never consumed, so the
/// export can be retried.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to write trace to {path:?}: {source}")]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write trace: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode trace: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}
