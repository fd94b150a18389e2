//! End-to-end detection flow: fallback while warming up, z-score
//! detection once the baseline is established, learning exclusion for
//! flagged parameters, reset, and trend aggregation over the same
//! history.

use std::sync::Arc;

use chrono::{DateTime, Duration};
use vitalwatch_core::{
    ActivityTier, BaselineStore, DetectionEngine, DetectorKind, MemoryBaselineStore,
    MemorySeriesSource, Severity, TrendAggregator, VitalParameter, VitalsSample,
};

fn sample_at(epoch_secs: i64, heart_rate: f64) -> VitalsSample {
    VitalsSample {
        timestamp: DateTime::from_timestamp(epoch_secs, 0),
        activity: 20,
        subject_id: "subject-1".into(),
        heart_rate: Some(heart_rate),
        blood_pressure_systolic: None,
        blood_pressure_diastolic: None,
        temperature: Some(36.6),
        oxygen_saturation: None,
    }
}

#[tokio::test]
async fn adaptive_detection_end_to_end() {
    let store = Arc::new(MemoryBaselineStore::new());
    let engine = DetectionEngine::new(Arc::clone(&store));
    engine.select_detector(DetectorKind::AdaptiveBaseline, "subject-1");

    let start = 1_700_000_000;

    // Warm-up: in-range readings with some spread. No anomalies, and the
    // fallback path is the population range while count < 5.
    for (i, hr) in [72.0, 76.0, 74.0, 71.0, 73.0, 75.0, 72.5, 74.5].iter().enumerate() {
        let anomalies = engine
            .evaluate(&sample_at(start + i as i64 * 5, *hr))
            .await
            .unwrap();
        assert!(anomalies.is_empty(), "warm-up reading {hr} flagged");
    }

    let baselines = store.fetch_all_baselines("subject-1").await.unwrap();
    let hr_baseline = baselines
        .iter()
        .find(|b| b.parameter == VitalParameter::HeartRate)
        .unwrap();
    assert_eq!(hr_baseline.sample_count, 8);
    assert_eq!(hr_baseline.tier, ActivityTier::Low);
    assert!(hr_baseline.std_dev > 0.0);

    // An outlier against the learned baseline is flagged with z-score
    // evidence, even though 95 BPM would also breach the population range.
    let anomalies = engine.evaluate(&sample_at(start + 100, 95.0)).await.unwrap();
    let hr_anomaly = anomalies
        .iter()
        .find(|a| a.parameter == VitalParameter::HeartRate)
        .expect("outlier flagged");
    assert_eq!(hr_anomaly.severity, Severity::High);
    assert!(hr_anomaly
        .evidence
        .as_deref()
        .unwrap()
        .contains("subject baseline"));

    // The flagged reading must not have polluted the baseline...
    let after = store.fetch_all_baselines("subject-1").await.unwrap();
    let hr_after = after
        .iter()
        .find(|b| b.parameter == VitalParameter::HeartRate)
        .unwrap();
    assert_eq!(hr_after.sample_count, 8);

    // ...while the normal temperature in the same sample kept learning.
    let temp_after = after
        .iter()
        .find(|b| b.parameter == VitalParameter::Temperature)
        .unwrap();
    assert_eq!(temp_after.sample_count, 9);

    // Reset, twice: both succeed, and learning starts over.
    assert!(engine.reset_baselines("subject-1").await.unwrap() > 0);
    assert_eq!(engine.reset_baselines("subject-1").await.unwrap(), 0);
    let stats = engine.statistics("subject-1").await.unwrap();
    assert!(stats.tiers.is_empty());
}

#[tokio::test]
async fn switching_strategies_mid_stream() {
    let store = Arc::new(MemoryBaselineStore::new());
    let engine = DetectionEngine::new(Arc::clone(&store));

    // Default range-based strategy: no learning happens.
    engine.evaluate(&sample_at(1_700_000_000, 72.0)).await.unwrap();
    assert!(store.is_empty());

    // Switch to adaptive: the same reading now feeds learning.
    engine.select_detector(DetectorKind::AdaptiveBaseline, "subject-1");
    engine.evaluate(&sample_at(1_700_000_005, 72.0)).await.unwrap();
    assert!(!store.is_empty());

    // A rejected selection leaves the adaptive strategy active.
    assert!(engine
        .select_detector_named("quantum", "subject-1")
        .is_err());
    assert_eq!(
        engine.current_selection().kind,
        DetectorKind::AdaptiveBaseline
    );
}

#[tokio::test]
async fn trends_over_recorded_history() {
    let start = 1_700_000_000;
    let history: Vec<VitalsSample> = (0..12)
        .map(|i| sample_at(start + i * 5, 70.0 + i as f64))
        .collect();
    let now = DateTime::from_timestamp(start, 0).unwrap() + Duration::seconds(60);

    let source = MemorySeriesSource::new(history);
    let report = TrendAggregator::analyze(&source, now).await;

    // One-minute window at 5s buckets over a sample every 5s.
    let minute = &report.windows["1min"]["heart_rate"];
    assert!(!minute.times.is_empty());
    assert_eq!(minute.times.len(), minute.values.len());

    // Sub-day labels are hour:minute:second.
    assert!(minute.times[0].len() == 8 && minute.times[0].contains(':'));

    // The coarse window folds everything into a single daily bucket.
    let weekly = &report.windows["7day"]["heart_rate"];
    assert_eq!(weekly.times.len(), 1);
    assert!((weekly.values[0] - 75.5).abs() < 1e-9);
}
