//! Error types for the resolution pipeline.
//!
//! Data-quality problems (`SchemaMismatch`, `CapacityExceeded`) are recovered
//! where they occur and surface as warnings on the [`Resolution`]; the rest
//! abort the run before any output is produced.
//!
//! [`Resolution`]: crate::pipeline::Resolution

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the resolution pipeline and its input/output boundary.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("record not found: {id}")]
    NotFound { id: String },

    #[error("field '{field}' is configured but not present in the record schema")]
    SchemaMismatch { field: String },

    #[error("{what} exceeds limit of {limit} (actual: {actual}); truncated")]
    CapacityExceeded {
        what: String,
        limit: usize,
        actual: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("dataset error at {}: {reason}", path.display())]
    Dataset { path: PathBuf, reason: String },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ResolveError {
    /// Whether the pipeline absorbs this error locally instead of aborting.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SchemaMismatch { .. } | Self::CapacityExceeded { .. }
        )
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ResolveError>;
