//! Telemetry ingestion.
//!
//! The message-transport client is an external collaborator; it hands
//! this module typed [`TransportEvent`]s. Payloads are parsed and
//! validated exactly once at ingress into schema-checked envelopes —
//! the detectors never re-validate.
//!
//! Per event the pipeline runs synchronously to completion: persist the
//! sample, broadcast it, evaluate it with the selected detector, then
//! persist and broadcast each raised alert. A storage failure aborts
//! the in-flight sample; there are no retries here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use vitalwatch_core::{BaselineStore, DetectionEngine, DetectorKind, VitalsSample};

use crate::api::dto::StreamMessage;
use crate::storage::EventSink;
use crate::BackendError;

/// Typed events delivered by the transport collaborator.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The transport established its connection.
    Connected,
    /// The transport lost its connection.
    Disconnected {
        /// Transport-provided reason, when known.
        reason: Option<String>,
    },
    /// A raw telemetry payload arrived on the sample channel.
    SampleReceived {
        /// Raw JSON payload.
        payload: String,
    },
    /// A configuration payload arrived on the config channel.
    ConfigReceived {
        /// Raw JSON payload.
        payload: String,
    },
}

/// Schema-checked sample payload, constructed once at ingress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleEnvelope {
    /// Measurement time.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Raw activity intensity (required).
    pub activity: i64,
    /// Subject id; defaults to the active selection when absent.
    #[serde(default)]
    pub subject_id: Option<String>,
    /// Heart rate (BPM).
    #[serde(default)]
    pub heart_rate: Option<f64>,
    /// Systolic blood pressure (mmHg).
    #[serde(default)]
    pub blood_pressure_systolic: Option<f64>,
    /// Diastolic blood pressure (mmHg).
    #[serde(default)]
    pub blood_pressure_diastolic: Option<f64>,
    /// Body temperature (deg C).
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Oxygen saturation (%).
    #[serde(default)]
    pub oxygen_saturation: Option<f64>,
}

impl SampleEnvelope {
    /// Convert into a domain sample, filling the subject id from the
    /// active selection when the payload does not carry one.
    #[must_use]
    pub fn into_sample(self, default_subject: &str) -> VitalsSample {
        VitalsSample {
            timestamp: self.timestamp,
            activity: self.activity,
            subject_id: self
                .subject_id
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| default_subject.to_string()),
            heart_rate: self.heart_rate,
            blood_pressure_systolic: self.blood_pressure_systolic,
            blood_pressure_diastolic: self.blood_pressure_diastolic,
            temperature: self.temperature,
            oxygen_saturation: self.oxygen_saturation,
        }
    }
}

/// Schema-checked configuration payload. Both fields are optional so a
/// message may change the strategy, the subject, or both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEnvelope {
    /// Wire name of the detector kind to activate.
    #[serde(default)]
    pub detector_type: Option<String>,
    /// Subject id to activate.
    #[serde(default)]
    pub subject_id: Option<String>,
}

/// Drains transport events and drives the detection engine.
pub struct IngestPipeline<S> {
    store: Arc<S>,
    engine: Arc<DetectionEngine<S>>,
    stream_tx: broadcast::Sender<StreamMessage>,
}

impl<S> IngestPipeline<S>
where
    S: EventSink + BaselineStore + 'static,
{
    /// Create a pipeline over a store, an engine, and the broadcast
    /// channel that fans processed messages out to stream subscribers.
    pub fn new(
        store: Arc<S>,
        engine: Arc<DetectionEngine<S>>,
        stream_tx: broadcast::Sender<StreamMessage>,
    ) -> Self {
        Self {
            store,
            engine,
            stream_tx,
        }
    }

    /// Process events until the sender side closes.
    pub async fn run(self, mut events: mpsc::Receiver<TransportEvent>) {
        info!("ingest pipeline started");
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        info!("ingest pipeline stopped");
    }

    /// Handle one transport event to completion.
    pub async fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                info!("telemetry transport connected");
            }
            TransportEvent::Disconnected { reason } => {
                warn!(reason = reason.as_deref(), "telemetry transport disconnected");
            }
            TransportEvent::SampleReceived { payload } => {
                if let Err(err) = self.handle_sample(&payload).await {
                    match err {
                        BackendError::Validation(message) => {
                            warn!(%message, "dropping malformed sample payload");
                        }
                        other => {
                            tracing::error!(error = %other, "sample processing aborted");
                        }
                    }
                }
            }
            TransportEvent::ConfigReceived { payload } => {
                if let Err(err) = self.handle_config(&payload).await {
                    warn!(error = %err, "configuration message rejected");
                }
            }
        }
    }

    async fn handle_sample(&self, payload: &str) -> Result<(), BackendError> {
        let envelope: SampleEnvelope = serde_json::from_str(payload)
            .map_err(|e| BackendError::Validation(format!("invalid sample payload: {e}")))?;

        let selection = self.engine.current_selection();
        let sample = envelope.into_sample(&selection.subject_id);

        self.store.insert_sample(&sample).await?;
        let _ = self.stream_tx.send(StreamMessage::Sample {
            sample: sample.clone(),
        });
        debug!(subject = %sample.subject_id, "sample stored");

        let anomalies = self.engine.evaluate(&sample).await?;
        for anomaly in anomalies {
            self.store.insert_alert(&anomaly, &sample.subject_id).await?;
            info!(
                subject = %sample.subject_id,
                parameter = %anomaly.parameter,
                severity = %anomaly.severity,
                "alert raised"
            );
            let _ = self.stream_tx.send(StreamMessage::Alert { anomaly });
        }

        Ok(())
    }

    async fn handle_config(&self, payload: &str) -> Result<(), BackendError> {
        let envelope: ConfigEnvelope = serde_json::from_str(payload)
            .map_err(|e| BackendError::Validation(format!("invalid config payload: {e}")))?;

        let current = self.engine.current_selection();
        let kind = match envelope.detector_type.as_deref() {
            Some(name) => name.parse::<DetectorKind>()?,
            None => current.kind,
        };
        let subject_id = envelope.subject_id.unwrap_or(current.subject_id);

        self.engine.select_detector(kind, subject_id);
        let selection = self.engine.current_selection();
        self.store.store_selection(&selection).await?;
        info!(
            kind = %selection.kind,
            subject = %selection.subject_id,
            "detector selection updated"
        );
        Ok(())
    }
}
