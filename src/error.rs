//! Error handling for socscope
//!
//! Each subsystem has its own error enum; `SocError` folds them together for
//! callers that drive whole targets (runtime, CLI).

use crate::capture::{CaptureError, ExportError};
use crate::pipeline::PipelineError;
use crate::stream::MuxError;
use thiserror::Error;

/// Main error type for socscope operations
#[derive(Error, Debug)]
pub enum SocError {
    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Capture engine misuse (wrong state, bad sample layout)
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Trace export failures
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Pipeline construction or execution errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Channel multiplexer control errors
    #[error("Multiplexer error: {0}")]
    Mux(#[from] MuxError),

    /// A command was sent to a target that does not support it
    #[error("Unsupported command for target '{target}': {command}")]
    Unsupported { target: String, command: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<SocError>,
    },
}

impl SocError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        SocError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for socscope operations
pub type Result<T> = std::result::Result<T, SocError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<SocError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}
