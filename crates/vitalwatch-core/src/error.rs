//! Error types for the detection engine.
//!
//! Nothing here is fatal to the hosting process and nothing retries:
//! storage and transport collaborators own retry and backpressure policy,
//! the engine simply reports what went wrong.

use thiserror::Error;

/// A specialized `Result` type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the detection engine.
///
/// Reference-range and baseline lookup misses are deliberately *not*
/// errors: the affected parameter is skipped and evaluation continues.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EngineError {
    /// Malformed or missing required sample fields. The sample is dropped
    /// and no state changes.
    #[error("validation error: {message}")]
    Validation {
        /// Description of what validation failed.
        message: String,
    },

    /// A storage collaborator failed during a read or write. The in-flight
    /// operation is aborted; the sample is treated as unprocessed for
    /// baseline-update purposes.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },

    /// An invalid detector configuration was requested. The prior
    /// selection is left unchanged.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },
}

impl EngineError {
    /// Creates a new validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns `true` if the failed operation may succeed when repeated
    /// by the caller.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Storage { .. } => true,
            Self::Validation { .. } | Self::Configuration { .. } => false,
        }
    }
}
