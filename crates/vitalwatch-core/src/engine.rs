//! The detection engine facade.
//!
//! This is the surface the transport and control-plane collaborators
//! call: it owns the detector context and both detector strategies, and
//! dispatches each sample to whichever strategy is currently selected.

use std::sync::Arc;

use crate::adaptive::{AdaptiveBaselineDetector, DetectorConfig, SubjectStatistics};
use crate::baseline::BaselineStore;
use crate::error::EngineResult;
use crate::range::RangeDetector;
use crate::selector::{DetectorContext, Selection};
use crate::types::{Anomaly, DetectorKind, VitalsSample};

/// Dispatches samples to the currently selected detector strategy.
pub struct DetectionEngine<S> {
    context: DetectorContext,
    range: RangeDetector,
    adaptive: AdaptiveBaselineDetector<S>,
}

impl<S: BaselineStore> DetectionEngine<S> {
    /// Create an engine with the default detector configuration and
    /// selection (range-based, subject "default").
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, DetectorConfig::default())
    }

    /// Create an engine with an explicit adaptive-detector configuration.
    pub fn with_config(store: Arc<S>, config: DetectorConfig) -> Self {
        Self {
            context: DetectorContext::default(),
            range: RangeDetector::new(),
            adaptive: AdaptiveBaselineDetector::with_config(store, config),
        }
    }

    /// The shared detector context.
    #[must_use]
    pub fn context(&self) -> &DetectorContext {
        &self.context
    }

    /// The current (kind, subject) selection.
    #[must_use]
    pub fn current_selection(&self) -> Selection {
        self.context.snapshot()
    }

    /// Atomically select a detector strategy and subject.
    pub fn select_detector(&self, kind: DetectorKind, subject_id: impl Into<String>) {
        self.context.select(kind, subject_id);
    }

    /// Select a strategy by wire name, rejecting unknown kinds.
    ///
    /// # Errors
    ///
    /// Configuration error on an unknown kind; the prior selection is
    /// left unchanged.
    pub fn select_detector_named(&self, kind: &str, subject_id: &str) -> EngineResult<Selection> {
        self.context.select_named(kind, subject_id)
    }

    /// Evaluate one sample with the currently selected strategy.
    ///
    /// For the adaptive strategy, the subject carried on the sample wins
    /// over the ambient selection, so concurrently ingested samples for
    /// different subjects evaluate against their own baselines.
    ///
    /// # Errors
    ///
    /// Storage errors from the adaptive strategy propagate; the
    /// range-based strategy cannot fail.
    pub async fn evaluate(&self, sample: &VitalsSample) -> EngineResult<Vec<Anomaly>> {
        let selection = self.context.snapshot();
        match selection.kind {
            DetectorKind::RangeBased => Ok(self.range.evaluate(sample)),
            DetectorKind::AdaptiveBaseline => {
                let subject_id = if sample.subject_id.is_empty() {
                    selection.subject_id.as_str()
                } else {
                    sample.subject_id.as_str()
                };
                self.adaptive.evaluate(sample, subject_id).await
            }
        }
    }

    /// Learning statistics for a subject.
    ///
    /// # Errors
    ///
    /// Storage errors from the baseline fetch propagate.
    pub async fn statistics(&self, subject_id: &str) -> EngineResult<SubjectStatistics> {
        self.adaptive.statistics(subject_id).await
    }

    /// Reset all learned baselines for a subject, returning the number
    /// of rows removed.
    ///
    /// # Errors
    ///
    /// Storage errors from the delete propagate.
    pub async fn reset_baselines(&self, subject_id: &str) -> EngineResult<u64> {
        self.adaptive.reset(subject_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::MemoryBaselineStore;
    use crate::types::{Severity, VitalParameter};
    use chrono::Utc;

    fn sample(subject: &str, heart_rate: f64) -> VitalsSample {
        VitalsSample {
            timestamp: Some(Utc::now()),
            activity: 10,
            subject_id: subject.into(),
            heart_rate: Some(heart_rate),
            blood_pressure_systolic: None,
            blood_pressure_diastolic: None,
            temperature: None,
            oxygen_saturation: None,
        }
    }

    #[tokio::test]
    async fn range_strategy_is_default() {
        let engine = DetectionEngine::new(Arc::new(MemoryBaselineStore::new()));
        let anomalies = engine.evaluate(&sample("s-1", 95.0)).await.unwrap();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].severity, Severity::High);
        // Range strategy carries no evidence note.
        assert!(anomalies[0].evidence.is_none());
    }

    #[tokio::test]
    async fn adaptive_strategy_learns_per_sample_subject() {
        let store = Arc::new(MemoryBaselineStore::new());
        let engine = DetectionEngine::new(Arc::clone(&store));
        engine.select_detector(DetectorKind::AdaptiveBaseline, "default");

        engine.evaluate(&sample("alice", 70.0)).await.unwrap();
        engine.evaluate(&sample("bob", 75.0)).await.unwrap();

        let alice = store.fetch_all_baselines("alice").await.unwrap();
        let bob = store.fetch_all_baselines("bob").await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(bob.len(), 1);
        assert!((alice[0].mean - 70.0).abs() < 1e-12);
        assert!((bob[0].mean - 75.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn adaptive_strategy_falls_back_to_selected_subject() {
        let store = Arc::new(MemoryBaselineStore::new());
        let engine = DetectionEngine::new(Arc::clone(&store));
        engine.select_detector(DetectorKind::AdaptiveBaseline, "ward-7");

        let anon = sample("", 70.0);
        engine.evaluate(&anon).await.unwrap();

        assert_eq!(store.fetch_all_baselines("ward-7").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejected_selection_keeps_prior_strategy() {
        let engine = DetectionEngine::new(Arc::new(MemoryBaselineStore::new()));
        engine.select_detector(DetectorKind::AdaptiveBaseline, "alice");
        assert!(engine.select_detector_named("bogus", "bob").is_err());

        let selection = engine.current_selection();
        assert_eq!(selection.kind, DetectorKind::AdaptiveBaseline);
        assert_eq!(selection.subject_id, "alice");
    }

    #[tokio::test]
    async fn statistics_and_reset_delegate() {
        let store = Arc::new(MemoryBaselineStore::new());
        let engine = DetectionEngine::new(Arc::clone(&store));
        engine.select_detector(DetectorKind::AdaptiveBaseline, "alice");
        engine.evaluate(&sample("alice", 70.0)).await.unwrap();

        let stats = engine.statistics("alice").await.unwrap();
        assert_eq!(stats.tiers.len(), 1);
        let tier = stats.tiers.values().next().unwrap();
        assert_eq!(tier.parameters[&VitalParameter::HeartRate].count, 1);

        assert_eq!(engine.reset_baselines("alice").await.unwrap(), 1);
        assert_eq!(engine.reset_baselines("alice").await.unwrap(), 0);
    }
}
