//! Stateless range-based anomaly detection.
//!
//! Compares each measured parameter against the population reference
//! range for the sample's activity tier.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::ranges::ReferenceRangeTable;
use crate::types::{round2, ActivityTier, Anomaly, Severity, VitalParameter, VitalsSample};

/// Evaluates samples against fixed population reference ranges.
#[derive(Debug, Default, Clone, Copy)]
pub struct RangeDetector;

impl RangeDetector {
    /// Create a new range detector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Evaluate a sample, producing one anomaly per out-of-range parameter.
    ///
    /// Parameters without a defined reference range are skipped with a
    /// warning; the rest of the sample is still evaluated.
    #[must_use]
    pub fn evaluate(&self, sample: &VitalsSample) -> Vec<Anomaly> {
        let tier = sample.tier();
        let timestamp = sample.timestamp_or_now();
        let mut anomalies = Vec::new();

        for parameter in VitalParameter::ALL {
            let Some(value) = sample.value_of(parameter) else {
                continue;
            };
            let Some(range) = ReferenceRangeTable::normal_range(parameter, tier) else {
                warn!(
                    parameter = %parameter,
                    tier = %tier,
                    "no reference range defined, skipping parameter"
                );
                continue;
            };
            if let Some(anomaly) = check_against_range(parameter, value, range, tier, timestamp) {
                anomalies.push(anomaly);
            }
        }

        anomalies
    }
}

/// Check one value against a `[min, max]` range.
///
/// Returns `None` when the value lies inside the range. A zero-width
/// range that the value misses is reported as deviation 100 at high
/// severity without computing a ratio.
pub(crate) fn check_against_range(
    parameter: VitalParameter,
    value: f64,
    (min, max): (f64, f64),
    tier: ActivityTier,
    timestamp: DateTime<Utc>,
) -> Option<Anomaly> {
    if value >= min && value <= max {
        return None;
    }

    let width = max - min;
    let (deviation, severity) = if width == 0.0 {
        let deviation = if value != min { 100.0 } else { 0.0 };
        (deviation, Severity::High)
    } else {
        let deviation = if value < min {
            (min - value).abs() / width * 100.0
        } else {
            (value - max).abs() / width * 100.0
        };
        (deviation, severity_for(deviation))
    };

    Some(Anomaly {
        parameter,
        value,
        normal_range: (Some(min), Some(max)),
        tier,
        deviation_percent: Some(round2(deviation)),
        severity,
        timestamp,
        evidence: None,
    })
}

/// Severity from a range deviation percentage: strictly above 30 is
/// high, strictly above 15 is medium, anything else is low.
pub(crate) fn severity_for(deviation: f64) -> Severity {
    if deviation > 30.0 {
        Severity::High
    } else if deviation > 15.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resting_sample(heart_rate: Option<f64>) -> VitalsSample {
        VitalsSample {
            timestamp: Some(Utc::now()),
            activity: 20,
            subject_id: "s-1".into(),
            heart_rate,
            blood_pressure_systolic: None,
            blood_pressure_diastolic: None,
            temperature: None,
            oxygen_saturation: None,
        }
    }

    #[test]
    fn high_heart_rate_at_rest() {
        let detector = RangeDetector::new();
        let anomalies = detector.evaluate(&resting_sample(Some(95.0)));
        assert_eq!(anomalies.len(), 1);
        let anomaly = &anomalies[0];
        assert_eq!(anomaly.parameter, VitalParameter::HeartRate);
        assert_eq!(anomaly.deviation_percent, Some(75.0));
        assert_eq!(anomaly.severity, Severity::High);
        assert_eq!(anomaly.normal_range, (Some(60.0), Some(80.0)));
        assert_eq!(anomaly.tier, ActivityTier::Low);
    }

    #[test]
    fn slightly_high_heart_rate_is_low_severity() {
        let detector = RangeDetector::new();
        let anomalies = detector.evaluate(&resting_sample(Some(82.0)));
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].deviation_percent, Some(10.0));
        assert_eq!(anomalies[0].severity, Severity::Low);
    }

    #[test]
    fn in_range_value_is_silent() {
        let detector = RangeDetector::new();
        assert!(detector.evaluate(&resting_sample(Some(70.0))).is_empty());
    }

    #[test]
    fn unmeasured_parameters_are_skipped() {
        let detector = RangeDetector::new();
        assert!(detector.evaluate(&resting_sample(None)).is_empty());
    }

    #[test]
    fn severity_boundaries_are_strict() {
        // Deviation of exactly 15 stays low, exactly 30 stays medium.
        let ts = Utc::now();
        let range = (0.0, 100.0);
        let at_15 = check_against_range(VitalParameter::HeartRate, 115.0, range, ActivityTier::Low, ts)
            .unwrap();
        assert_eq!(at_15.deviation_percent, Some(15.0));
        assert_eq!(at_15.severity, Severity::Low);

        let at_30 = check_against_range(VitalParameter::HeartRate, 130.0, range, ActivityTier::Low, ts)
            .unwrap();
        assert_eq!(at_30.deviation_percent, Some(30.0));
        assert_eq!(at_30.severity, Severity::Medium);

        let above_30 =
            check_against_range(VitalParameter::HeartRate, 130.5, range, ActivityTier::Low, ts)
                .unwrap();
        assert_eq!(above_30.severity, Severity::High);
    }

    #[test]
    fn zero_width_range_misses_at_full_deviation() {
        let ts = Utc::now();
        let anomaly =
            check_against_range(VitalParameter::Temperature, 37.5, (37.0, 37.0), ActivityTier::Low, ts)
                .unwrap();
        assert_eq!(anomaly.deviation_percent, Some(100.0));
        assert_eq!(anomaly.severity, Severity::High);
    }

    #[test]
    fn zero_width_range_hit_is_silent() {
        let ts = Utc::now();
        assert!(check_against_range(
            VitalParameter::Temperature,
            37.0,
            (37.0, 37.0),
            ActivityTier::Low,
            ts
        )
        .is_none());
    }

    #[test]
    fn below_range_deviation() {
        let detector = RangeDetector::new();
        let anomalies = detector.evaluate(&resting_sample(Some(50.0)));
        assert_eq!(anomalies.len(), 1);
        // (60 - 50) / 20 * 100 = 50
        assert_eq!(anomalies[0].deviation_percent, Some(50.0));
        assert_eq!(anomalies[0].severity, Severity::High);
    }
}
