//! Adaptive per-subject baseline anomaly detection.
//!
//! Evaluates each sample against the subject's learned baseline for the
//! sample's activity tier, falling back to population reference ranges
//! when no usable baseline exists, then folds non-anomalous observations
//! back into the baseline so the model tracks the individual over time.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::baseline::BaselineStore;
use crate::error::EngineResult;
use crate::range::check_against_range;
use crate::ranges::ReferenceRangeTable;
use crate::types::{round2, ActivityTier, Anomaly, Severity, VitalParameter, VitalsSample};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tuning knobs for the adaptive detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    /// Minimum observations before a baseline supports z-score checks.
    pub min_samples: u32,
    /// Z-score above which a value is flagged anomalous.
    pub z_threshold: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_samples: 5,
            z_threshold: 2.5,
        }
    }
}

/// Rounded statistics for one learned parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParameterStats {
    /// Running mean (two decimals).
    pub mean: f64,
    /// Running standard deviation (two decimals).
    pub std_dev: f64,
    /// Observations folded in.
    pub count: i64,
}

/// Learned statistics for one activity tier.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TierStatistics {
    /// Per-parameter statistics.
    pub parameters: BTreeMap<VitalParameter, ParameterStats>,
    /// Total observations across all parameters at this tier.
    pub total_samples: i64,
}

/// Learning statistics for one subject, grouped by activity tier.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SubjectStatistics {
    /// Subject the statistics belong to.
    pub subject_id: String,
    /// Statistics per tier; tiers with no learned baselines are absent.
    pub tiers: BTreeMap<ActivityTier, TierStatistics>,
}

/// Anomaly detector that learns a per-subject notion of "normal".
pub struct AdaptiveBaselineDetector<S> {
    store: Arc<S>,
    config: DetectorConfig,
}

impl<S: BaselineStore> AdaptiveBaselineDetector<S> {
    /// Create a detector with default configuration.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, DetectorConfig::default())
    }

    /// Create a detector with explicit configuration.
    pub fn with_config(store: Arc<S>, config: DetectorConfig) -> Self {
        Self { store, config }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Evaluate a sample for `subject_id`, then update the subject's
    /// baselines with every measured parameter that was not flagged.
    ///
    /// Anomalous parameters are excluded from the update so the baseline
    /// cannot drift toward observed outliers.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the baseline fetch or any baseline
    /// update fails; the sample is then unprocessed for learning
    /// purposes.
    pub async fn evaluate(
        &self,
        sample: &VitalsSample,
        subject_id: &str,
    ) -> EngineResult<Vec<Anomaly>> {
        let tier = sample.tier();
        let timestamp = sample.timestamp_or_now();

        let baselines: HashMap<VitalParameter, _> = self
            .store
            .fetch_baselines(subject_id, tier)
            .await?
            .into_iter()
            .map(|b| (b.parameter, b))
            .collect();

        let mut anomalies = Vec::new();

        for parameter in VitalParameter::ALL {
            let Some(value) = sample.value_of(parameter) else {
                continue;
            };

            match baselines.get(&parameter) {
                // A zero-variance baseline cannot support a meaningful
                // z-score and is not treated as a range check either:
                // the parameter is skipped outright.
                Some(baseline) if baseline.std_dev == 0.0 => {
                    debug!(
                        subject = subject_id,
                        parameter = %parameter,
                        "zero-variance baseline, skipping parameter"
                    );
                }
                Some(baseline) if baseline.is_eligible(self.config.min_samples) => {
                    let z = (value - baseline.mean).abs() / baseline.std_dev;
                    if z > self.config.z_threshold {
                        let severity = if z > 4.0 {
                            Severity::High
                        } else if z > 3.0 {
                            Severity::Medium
                        } else {
                            Severity::Low
                        };
                        anomalies.push(Anomaly {
                            parameter,
                            value,
                            normal_range: (
                                Some(round2(baseline.mean - 2.0 * baseline.std_dev)),
                                Some(round2(baseline.mean + 2.0 * baseline.std_dev)),
                            ),
                            tier,
                            // Normalized so that three sigma reads as 100%.
                            deviation_percent: Some(round2(z * 100.0 / 3.0)),
                            severity,
                            timestamp,
                            evidence: Some(format!(
                                "z-score {z:.2} against subject baseline {:.2} ± {:.2}",
                                baseline.mean, baseline.std_dev
                            )),
                        });
                    }
                }
                // Baseline missing, or still warming up: fall back to the
                // population reference range for this one parameter.
                _ => {
                    debug!(
                        subject = subject_id,
                        parameter = %parameter,
                        "no usable baseline, falling back to population range"
                    );
                    let Some(range) = ReferenceRangeTable::normal_range(parameter, tier) else {
                        warn!(
                            parameter = %parameter,
                            tier = %tier,
                            "no reference range defined, skipping parameter"
                        );
                        continue;
                    };
                    if let Some(mut anomaly) =
                        check_against_range(parameter, value, range, tier, timestamp)
                    {
                        anomaly.evidence = Some(
                            "population reference range (no usable subject baseline)".to_string(),
                        );
                        anomalies.push(anomaly);
                    }
                }
            }
        }

        let flagged: HashSet<VitalParameter> =
            anomalies.iter().map(|a| a.parameter).collect();

        for parameter in VitalParameter::ALL {
            let Some(value) = sample.value_of(parameter) else {
                continue;
            };
            if flagged.contains(&parameter) {
                debug!(
                    subject = subject_id,
                    parameter = %parameter,
                    "anomalous parameter excluded from baseline update"
                );
                continue;
            }
            self.store
                .apply_observation(subject_id, parameter, tier, value, timestamp)
                .await?;
        }

        Ok(anomalies)
    }

    /// Learning statistics for a subject across every tier.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the baseline fetch fails.
    pub async fn statistics(&self, subject_id: &str) -> EngineResult<SubjectStatistics> {
        let mut tiers: BTreeMap<ActivityTier, TierStatistics> = BTreeMap::new();

        for baseline in self.store.fetch_all_baselines(subject_id).await? {
            let tier = tiers.entry(baseline.tier).or_default();
            tier.parameters.insert(
                baseline.parameter,
                ParameterStats {
                    mean: round2(baseline.mean),
                    std_dev: round2(baseline.std_dev),
                    count: baseline.sample_count,
                },
            );
            tier.total_samples += baseline.sample_count;
        }

        Ok(SubjectStatistics {
            subject_id: subject_id.to_string(),
            tiers,
        })
    }

    /// Delete every learned baseline for a subject, returning the number
    /// of rows removed. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the delete fails.
    pub async fn reset(&self, subject_id: &str) -> EngineResult<u64> {
        let removed = self.store.delete_baselines(subject_id).await?;
        debug!(subject = subject_id, removed, "subject baselines reset");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::MemoryBaselineStore;
    use crate::types::{Baseline, Severity};
    use chrono::Utc;

    fn sample(heart_rate: Option<f64>, temperature: Option<f64>) -> VitalsSample {
        VitalsSample {
            timestamp: Some(Utc::now()),
            activity: 10,
            subject_id: "s-1".into(),
            heart_rate,
            blood_pressure_systolic: None,
            blood_pressure_diastolic: None,
            temperature,
            oxygen_saturation: None,
        }
    }

    async fn seed(
        store: &MemoryBaselineStore,
        parameter: VitalParameter,
        mean: f64,
        std_dev: f64,
        count: i64,
    ) {
        store
            .upsert_baseline(&Baseline {
                subject_id: "s-1".into(),
                parameter,
                tier: ActivityTier::Low,
                mean,
                std_dev,
                sample_count: count,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn z_score_flags_outlier_against_learned_baseline() {
        let store = Arc::new(MemoryBaselineStore::new());
        seed(&store, VitalParameter::HeartRate, 72.0, 4.0, 10).await;
        let detector = AdaptiveBaselineDetector::new(store);

        let anomalies = detector
            .evaluate(&sample(Some(95.0), None), "s-1")
            .await
            .unwrap();
        assert_eq!(anomalies.len(), 1);
        let anomaly = &anomalies[0];
        // z = |95 - 72| / 4 = 5.75
        assert_eq!(anomaly.severity, Severity::High);
        assert_eq!(anomaly.deviation_percent, Some(191.67));
        assert_eq!(anomaly.normal_range, (Some(64.0), Some(80.0)));
        assert!(anomaly.evidence.as_deref().unwrap().contains("z-score 5.75"));
    }

    #[tokio::test]
    async fn z_severity_tiers() {
        let store = Arc::new(MemoryBaselineStore::new());
        seed(&store, VitalParameter::HeartRate, 72.0, 4.0, 10).await;
        let detector = AdaptiveBaselineDetector::new(store);

        // z = 2.75 -> low severity
        let low = detector
            .evaluate(&sample(Some(83.0), None), "s-1")
            .await
            .unwrap();
        assert_eq!(low[0].severity, Severity::Low);

        // z = 3.5 -> medium severity
        let medium = detector
            .evaluate(&sample(Some(86.0), None), "s-1")
            .await
            .unwrap();
        assert_eq!(medium[0].severity, Severity::Medium);
    }

    #[tokio::test]
    async fn within_threshold_is_silent_and_learns() {
        let store = Arc::new(MemoryBaselineStore::new());
        seed(&store, VitalParameter::HeartRate, 72.0, 4.0, 10).await;
        let detector = AdaptiveBaselineDetector::new(Arc::clone(&store));

        let anomalies = detector
            .evaluate(&sample(Some(75.0), None), "s-1")
            .await
            .unwrap();
        assert!(anomalies.is_empty());

        let baselines = store.fetch_baselines("s-1", ActivityTier::Low).await.unwrap();
        assert_eq!(baselines[0].sample_count, 11);
    }

    #[tokio::test]
    async fn zero_variance_baseline_skips_entirely() {
        let store = Arc::new(MemoryBaselineStore::new());
        seed(&store, VitalParameter::HeartRate, 72.0, 0.0, 10).await;
        let detector = AdaptiveBaselineDetector::new(Arc::clone(&store));

        // Wildly out of the population range, but the zero-variance
        // baseline suppresses both the z-score and the range fallback.
        let anomalies = detector
            .evaluate(&sample(Some(180.0), None), "s-1")
            .await
            .unwrap();
        assert!(anomalies.is_empty());

        // The parameter was not flagged, so it still feeds learning.
        let baselines = store.fetch_baselines("s-1", ActivityTier::Low).await.unwrap();
        assert_eq!(baselines[0].sample_count, 11);
        assert!(baselines[0].std_dev > 0.0);
    }

    #[tokio::test]
    async fn missing_baseline_falls_back_to_population_range() {
        let store = Arc::new(MemoryBaselineStore::new());
        let detector = AdaptiveBaselineDetector::new(store);

        let anomalies = detector
            .evaluate(&sample(Some(95.0), None), "s-1")
            .await
            .unwrap();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].deviation_percent, Some(75.0));
        assert_eq!(anomalies[0].severity, Severity::High);
        assert_eq!(
            anomalies[0].evidence.as_deref(),
            Some("population reference range (no usable subject baseline)")
        );
    }

    #[tokio::test]
    async fn warming_baseline_falls_back_to_population_range() {
        let store = Arc::new(MemoryBaselineStore::new());
        // Two samples with spread: below the minimum, variance nonzero.
        seed(&store, VitalParameter::HeartRate, 70.0, 1.0, 2).await;
        let detector = AdaptiveBaselineDetector::new(store);

        let anomalies = detector
            .evaluate(&sample(Some(95.0), None), "s-1")
            .await
            .unwrap();
        assert_eq!(anomalies.len(), 1);
        // Population range (60, 80), not the warming baseline.
        assert_eq!(anomalies[0].normal_range, (Some(60.0), Some(80.0)));
    }

    #[tokio::test]
    async fn anomalous_parameter_is_excluded_from_learning() {
        let store = Arc::new(MemoryBaselineStore::new());
        seed(&store, VitalParameter::HeartRate, 72.0, 4.0, 10).await;
        seed(&store, VitalParameter::Temperature, 36.6, 0.2, 10).await;
        let detector = AdaptiveBaselineDetector::new(Arc::clone(&store));

        // Heart rate is anomalous, temperature is normal.
        let anomalies = detector
            .evaluate(&sample(Some(95.0), Some(36.7)), "s-1")
            .await
            .unwrap();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].parameter, VitalParameter::HeartRate);

        let baselines = store.fetch_baselines("s-1", ActivityTier::Low).await.unwrap();
        let by_param: std::collections::HashMap<_, _> =
            baselines.into_iter().map(|b| (b.parameter, b)).collect();
        assert_eq!(by_param[&VitalParameter::HeartRate].sample_count, 10);
        assert_eq!(by_param[&VitalParameter::Temperature].sample_count, 11);
    }

    #[tokio::test]
    async fn statistics_groups_by_tier() {
        let store = Arc::new(MemoryBaselineStore::new());
        seed(&store, VitalParameter::HeartRate, 72.123, 4.456, 10).await;
        seed(&store, VitalParameter::Temperature, 36.6, 0.2, 4).await;
        let detector = AdaptiveBaselineDetector::new(store);

        let stats = detector.statistics("s-1").await.unwrap();
        assert_eq!(stats.subject_id, "s-1");
        let low = &stats.tiers[&ActivityTier::Low];
        assert_eq!(low.total_samples, 14);
        assert_eq!(low.parameters[&VitalParameter::HeartRate].mean, 72.12);
        assert_eq!(low.parameters[&VitalParameter::HeartRate].std_dev, 4.46);
    }

    #[tokio::test]
    async fn reset_twice_is_safe() {
        let store = Arc::new(MemoryBaselineStore::new());
        seed(&store, VitalParameter::HeartRate, 72.0, 4.0, 10).await;
        let detector = AdaptiveBaselineDetector::new(Arc::clone(&store));

        assert_eq!(detector.reset("s-1").await.unwrap(), 1);
        assert_eq!(detector.reset("s-1").await.unwrap(), 0);
        let stats = detector.statistics("s-1").await.unwrap();
        assert!(stats.tiers.is_empty());
    }
}
