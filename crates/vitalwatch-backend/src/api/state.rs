//! Shared state handed to every API handler.

use std::sync::Arc;

use tokio::sync::broadcast;

use vitalwatch_core::DetectionEngine;

use super::dto::StreamMessage;
use crate::storage::PgStore;

/// Cloneable handle on the shared service state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Arc<PgStore>,
    engine: Arc<DetectionEngine<PgStore>>,
    stream_tx: broadcast::Sender<StreamMessage>,
}

impl AppState {
    /// Assemble the state from its collaborators.
    pub fn new(
        store: Arc<PgStore>,
        engine: Arc<DetectionEngine<PgStore>>,
        stream_tx: broadcast::Sender<StreamMessage>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                store,
                engine,
                stream_tx,
            }),
        }
    }

    /// The persistence layer.
    #[must_use]
    pub fn store(&self) -> &PgStore {
        &self.inner.store
    }

    /// The detection engine.
    #[must_use]
    pub fn engine(&self) -> &DetectionEngine<PgStore> {
        &self.inner.engine
    }

    /// Subscribe to the processed-sample/alert stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StreamMessage> {
        self.inner.stream_tx.subscribe()
    }

    /// Number of live stream subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.stream_tx.receiver_count()
    }
}
