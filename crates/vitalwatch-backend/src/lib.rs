//! # vitalwatch-backend
//!
//! The service around the [`vitalwatch_core`] detection engine:
//!
//! - **Storage** ([`storage`]): PostgreSQL persistence for samples,
//!   alerts, learned baselines, and the detector selection, over a
//!   bounded connection pool.
//! - **Ingestion** ([`ingest`]): a typed transport-event pipeline that
//!   validates payloads at the boundary, drives the engine, and fans
//!   processed messages out to stream subscribers.
//! - **API** ([`api`]): axum control plane plus a WebSocket relay of
//!   the live sample/alert stream.
//!
//! The binary in `main.rs` wires the three together.

pub mod api;
pub mod ingest;
pub mod storage;

pub use api::{create_router, ApiError, AppState};
pub use ingest::{IngestPipeline, TransportEvent};
pub use storage::{PgStore, PgStoreConfig, StorageError};

/// Unified error type for backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Detection engine error.
    #[error("engine error: {0}")]
    Engine(#[from] vitalwatch_core::EngineError),

    /// Persistence error.
    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),

    /// Malformed payload at the ingestion boundary.
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;
