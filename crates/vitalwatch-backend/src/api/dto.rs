//! Wire types for the control-plane API and the WebSocket stream.

use serde::{Deserialize, Serialize};

use vitalwatch_core::{Anomaly, Selection, TrendReport, VitalsSample};

/// Messages fanned out to WebSocket subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// A processed, validated sample.
    Sample {
        /// The sample as stored.
        sample: VitalsSample,
    },
    /// A raised anomaly alert.
    Alert {
        /// The anomaly as stored.
        anomaly: Anomaly,
    },
}

/// Query parameters for the alert history endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertHistoryQuery {
    /// Subject to filter on; defaults to the active selection.
    #[serde(default)]
    pub subject_id: Option<String>,
    /// Maximum rows to return (clamped to 1..=1000).
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}

fn default_history_limit() -> i64 {
    50
}

/// Clamp a requested history limit to the supported window.
#[must_use]
pub(crate) fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, 1000)
}

/// Current detector selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorSelectionDto {
    /// Wire name of the active detector kind.
    pub detector_type: String,
    /// Active subject id.
    pub subject_id: String,
}

impl From<Selection> for DetectorSelectionDto {
    fn from(selection: Selection) -> Self {
        Self {
            detector_type: selection.kind.as_str().to_string(),
            subject_id: selection.subject_id,
        }
    }
}

/// Request body for changing the detector selection.
#[derive(Debug, Clone, Deserialize)]
pub struct SetDetectorRequest {
    /// Wire name of the detector kind to activate.
    pub detector_type: String,
    /// Subject to activate; defaults to the current one.
    #[serde(default)]
    pub subject_id: Option<String>,
}

/// Response body for a baseline reset.
#[derive(Debug, Clone, Serialize)]
pub struct ResetResponse {
    /// Always true when the reset succeeded.
    pub success: bool,
    /// Number of baseline rows removed.
    pub removed: u64,
}

/// Response body for the trends endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct TrendsResponse {
    /// Window label -> parameter -> series.
    pub trends: TrendReport,
}

/// Response body for the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always "ok" when storage answers the probe.
    pub status: &'static str,
}
