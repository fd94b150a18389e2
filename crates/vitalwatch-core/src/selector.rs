//! Process-wide detector selection.
//!
//! The active (detector kind, subject) pair is mutated by control-plane
//! and transport-config messages and read on every ingestion event, so
//! both fields live behind one lock: a reader can never observe a
//! kind/subject pair that was not set together by a single call.

use parking_lot::RwLock;

use crate::error::{EngineResult, EngineError};
use crate::types::DetectorKind;

/// A consistent (kind, subject) pair read from the context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// The active detection strategy.
    pub kind: DetectorKind,
    /// The active subject id.
    pub subject_id: String,
}

/// Synchronized holder of the active detector selection.
#[derive(Debug)]
pub struct DetectorContext {
    inner: RwLock<Selection>,
}

impl DetectorContext {
    /// Create a context with an explicit initial selection.
    pub fn new(kind: DetectorKind, subject_id: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(Selection {
                kind,
                subject_id: subject_id.into(),
            }),
        }
    }

    /// The current selection as one consistent pair.
    #[must_use]
    pub fn snapshot(&self) -> Selection {
        self.inner.read().clone()
    }

    /// Atomically replace both the kind and the subject.
    pub fn select(&self, kind: DetectorKind, subject_id: impl Into<String>) {
        *self.inner.write() = Selection {
            kind,
            subject_id: subject_id.into(),
        };
    }

    /// Validate a wire-named kind and apply it together with the subject.
    ///
    /// # Errors
    ///
    /// Rejects unknown kinds with a configuration error; the prior
    /// selection is left unchanged.
    pub fn select_named(&self, kind: &str, subject_id: &str) -> EngineResult<Selection> {
        let kind: DetectorKind = kind
            .parse()
            .map_err(|_| EngineError::configuration(format!("unknown detector kind '{kind}'")))?;
        self.select(kind, subject_id);
        Ok(self.snapshot())
    }
}

impl Default for DetectorContext {
    fn default() -> Self {
        Self::new(DetectorKind::RangeBased, "default")
    }
}
