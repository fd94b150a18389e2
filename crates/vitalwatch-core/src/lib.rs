//! Adaptive anomaly detection for streaming vital signs.
//!
//! Evaluates physiological telemetry samples against activity-tiered
//! reference ranges, learns a per-subject statistical model of "normal"
//! as samples arrive, and aggregates history into multi-resolution
//! trend series.
//!
//! # Architecture
//!
//! A sample flows through three stages:
//!
//! 1. **Classification** ([`ActivityTier::classify`]): the raw activity
//!    intensity selects the tier whose reference values apply.
//! 2. **Detection**: the [`DetectionEngine`] dispatches to the strategy
//!    currently held by the [`DetectorContext`] — either the stateless
//!    [`RangeDetector`] over the population [`ReferenceRangeTable`], or
//!    the [`AdaptiveBaselineDetector`], which z-scores values against
//!    the subject's learned [`Baseline`]s and falls back to population
//!    ranges while a baseline is still warming up.
//! 3. **Learning**: after evaluation, every measured parameter that was
//!    *not* flagged anomalous is folded into the subject's baseline via
//!    the persisted-resumable Welford recurrence
//!    ([`BaselineStats::advance`]).
//!
//! The [`TrendAggregator`] runs independently, on demand, over a
//! [`SampleSeriesSource`] history collaborator.
//!
//! Persistence is owned entirely by the [`BaselineStore`] collaborator;
//! detectors never cache baselines across calls.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use vitalwatch_core::{
//!     DetectionEngine, DetectorKind, MemoryBaselineStore, VitalsSample,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let engine = DetectionEngine::new(Arc::new(MemoryBaselineStore::new()));
//! engine.select_detector(DetectorKind::AdaptiveBaseline, "subject-1");
//!
//! let sample = VitalsSample {
//!     timestamp: None,
//!     activity: 30,
//!     subject_id: "subject-1".into(),
//!     heart_rate: Some(95.0),
//!     blood_pressure_systolic: None,
//!     blood_pressure_diastolic: None,
//!     temperature: None,
//!     oxygen_saturation: None,
//! };
//!
//! // No baseline yet: the engine falls back to population ranges.
//! let anomalies = engine.evaluate(&sample).await.unwrap();
//! assert_eq!(anomalies.len(), 1);
//! # }
//! ```

#![warn(missing_docs)]

pub mod adaptive;
pub mod baseline;
pub mod engine;
pub mod error;
pub mod range;
pub mod ranges;
pub mod selector;
pub mod trends;
pub mod types;

pub use adaptive::{
    AdaptiveBaselineDetector, DetectorConfig, ParameterStats, SubjectStatistics, TierStatistics,
};
pub use baseline::{BaselineStats, BaselineStore, MemoryBaselineStore};
pub use engine::DetectionEngine;
pub use error::{EngineError, EngineResult};
pub use range::RangeDetector;
pub use ranges::ReferenceRangeTable;
pub use selector::{DetectorContext, Selection};
pub use trends::{
    align_to_bucket, MemorySeriesSource, SampleSeriesSource, TrendAggregator, TrendParameter,
    TrendReport, TrendSeries, TrendWindow,
};
pub use types::{
    ActivityTier, Anomaly, Baseline, DetectorKind, Severity, VitalParameter, VitalsSample,
};
