//! Unified error handling for the parkpulse pipeline
//!
//! Source failures are absorbed inside the acquisition cycle (the next adapter
//! in the priority chain takes over), so the unified error type mostly carries
//! persistence and I/O problems to callers. Every error is classified into a
//! category so callers can decide between retrying and giving up.

use thiserror::Error;

// Re-export the adapter error for convenience
pub use crate::sources::SourceError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Upstream data source errors (network, bad payloads)
    Source,
    /// Serialization and data contract errors
    Parsing,
    /// Storage and I/O errors
    Storage,
}

/// Unified error type for pipeline operations
#[derive(Error, Debug)]
pub enum Error {
    /// An acquisition adapter failed
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// The snapshot could not be persisted to disk. The in-memory bundle is
    /// still swapped in before persistence, so reads keep working.
    #[error("Cache write failed: {0}")]
    CacheWrite(#[source] std::io::Error),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Source(_) => ErrorCategory::Source,
            Self::CacheWrite(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Parsing,
        }
    }

    /// Check if a later cycle can be expected to clear the condition
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Sources are retried every cycle, persistence on every write
            Self::Source(_) | Self::CacheWrite(_) | Self::Io(_) => true,
            // A JSON failure means our own data contract broke
            Self::Json(_) => false,
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;
