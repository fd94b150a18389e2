//! Persistence layer.
//!
//! [`PgStore`] is the production implementation; the [`EventSink`] trait
//! is the write seam the ingestion pipeline depends on, so tests can run
//! the full pipeline against an in-memory sink.

pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use vitalwatch_core::{Anomaly, EngineError, Selection, VitalsSample};

pub use postgres::{AlertRecord, PgStore, PgStoreConfig};

/// Errors from the persistence layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Connecting to or acquiring from the pool failed.
    #[error("database connection failed: {0}")]
    Connection(String),

    /// A query failed to execute.
    #[error("query failed: {0}")]
    Query(String),

    /// A row held a value the domain model cannot represent.
    #[error("row decode failed: {0}")]
    Decode(String),
}

impl StorageError {
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Connection(err.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::Decode(err.to_string())
            }
            other => Self::Query(other.to_string()),
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        EngineError::storage(err.to_string())
    }
}

/// Write seam used by the ingestion pipeline.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Persist one validated sample.
    async fn insert_sample(&self, sample: &VitalsSample) -> Result<(), StorageError>;

    /// Persist one anomaly as an alert row, returning its id.
    async fn insert_alert(&self, anomaly: &Anomaly, subject_id: &str)
        -> Result<Uuid, StorageError>;

    /// Persist the active detector selection.
    async fn store_selection(&self, selection: &Selection) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlx_error_classification() {
        let timeout = StorageError::from_sqlx(sqlx::Error::PoolTimedOut);
        assert!(matches!(timeout, StorageError::Connection(_)));

        let not_found = StorageError::from_sqlx(sqlx::Error::RowNotFound);
        assert!(matches!(not_found, StorageError::Query(_)));
    }

    #[test]
    fn converts_into_engine_error() {
        let err: EngineError = StorageError::Query("boom".into()).into();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("boom"));
    }
}
