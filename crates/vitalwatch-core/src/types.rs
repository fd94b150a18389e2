//! Vital sign domain types.

use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// A physiological parameter tracked by the detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum VitalParameter {
    /// Heart rate in beats per minute.
    HeartRate,
    /// Systolic blood pressure in mmHg.
    BloodPressureSystolic,
    /// Diastolic blood pressure in mmHg.
    BloodPressureDiastolic,
    /// Body temperature in degrees Celsius.
    Temperature,
    /// Blood oxygen saturation in percent.
    OxygenSaturation,
}

impl VitalParameter {
    /// All tracked parameters, in evaluation order.
    pub const ALL: [VitalParameter; 5] = [
        VitalParameter::HeartRate,
        VitalParameter::BloodPressureSystolic,
        VitalParameter::BloodPressureDiastolic,
        VitalParameter::Temperature,
        VitalParameter::OxygenSaturation,
    ];

    /// Wire name of the parameter.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            VitalParameter::HeartRate => "heart_rate",
            VitalParameter::BloodPressureSystolic => "blood_pressure_systolic",
            VitalParameter::BloodPressureDiastolic => "blood_pressure_diastolic",
            VitalParameter::Temperature => "temperature",
            VitalParameter::OxygenSaturation => "oxygen_saturation",
        }
    }
}

impl std::fmt::Display for VitalParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VitalParameter {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "heart_rate" => Ok(VitalParameter::HeartRate),
            "blood_pressure_systolic" => Ok(VitalParameter::BloodPressureSystolic),
            "blood_pressure_diastolic" => Ok(VitalParameter::BloodPressureDiastolic),
            "temperature" => Ok(VitalParameter::Temperature),
            "oxygen_saturation" => Ok(VitalParameter::OxygenSaturation),
            other => Err(EngineError::validation(format!(
                "unknown vital parameter '{other}'"
            ))),
        }
    }
}

/// Discretized activity level used to select context-appropriate
/// reference values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ActivityTier {
    /// Resting or light activity (intensity 0-50).
    Low,
    /// Moderate activity (intensity 51-100).
    Medium,
    /// Intense activity (intensity above 100).
    High,
}

impl ActivityTier {
    /// All tiers.
    pub const ALL: [ActivityTier; 3] =
        [ActivityTier::Low, ActivityTier::Medium, ActivityTier::High];

    /// Classify a raw activity intensity into a tier.
    ///
    /// Boundaries are closed intervals: `[0, 50]` is low, `[51, 100]` is
    /// medium, everything else is high (no upper bound check).
    #[must_use]
    pub fn classify(activity: i64) -> Self {
        if (0..=50).contains(&activity) {
            ActivityTier::Low
        } else if (51..=100).contains(&activity) {
            ActivityTier::Medium
        } else {
            ActivityTier::High
        }
    }

    /// Wire name of the tier.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityTier::Low => "low",
            ActivityTier::Medium => "medium",
            ActivityTier::High => "high",
        }
    }
}

impl std::fmt::Display for ActivityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActivityTier {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(ActivityTier::Low),
            "medium" => Ok(ActivityTier::Medium),
            "high" => Ok(ActivityTier::High),
            other => Err(EngineError::validation(format!(
                "unknown activity tier '{other}'"
            ))),
        }
    }
}

/// Severity of a detected anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Severity {
    /// Mild deviation.
    Low,
    /// Notable deviation.
    Medium,
    /// Severe deviation.
    High,
}

impl Severity {
    /// Wire name of the severity.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detection strategy selected for the ingestion path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DetectorKind {
    /// Fixed population reference ranges per activity tier.
    RangeBased,
    /// Per-subject adaptive baseline with population fallback.
    AdaptiveBaseline,
}

impl DetectorKind {
    /// Wire name of the detector kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::RangeBased => "range_based",
            DetectorKind::AdaptiveBaseline => "adaptive_baseline",
        }
    }
}

impl std::fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DetectorKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "range_based" => Ok(DetectorKind::RangeBased),
            "adaptive_baseline" => Ok(DetectorKind::AdaptiveBaseline),
            other => Err(EngineError::configuration(format!(
                "unknown detector kind '{other}'"
            ))),
        }
    }
}

/// A single validated telemetry sample.
///
/// Each optional vital is `None` when the parameter was not measured in
/// this cycle. Samples are immutable once received.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VitalsSample {
    /// Measurement time; detectors fall back to the current time when absent.
    pub timestamp: Option<DateTime<Utc>>,
    /// Raw activity intensity.
    pub activity: i64,
    /// Subject the sample belongs to.
    pub subject_id: String,
    /// Heart rate (BPM).
    pub heart_rate: Option<f64>,
    /// Systolic blood pressure (mmHg).
    pub blood_pressure_systolic: Option<f64>,
    /// Diastolic blood pressure (mmHg).
    pub blood_pressure_diastolic: Option<f64>,
    /// Body temperature (deg C).
    pub temperature: Option<f64>,
    /// Oxygen saturation (%).
    pub oxygen_saturation: Option<f64>,
}

impl VitalsSample {
    /// Value of a tracked parameter, if measured in this sample.
    #[must_use]
    pub fn value_of(&self, parameter: VitalParameter) -> Option<f64> {
        match parameter {
            VitalParameter::HeartRate => self.heart_rate,
            VitalParameter::BloodPressureSystolic => self.blood_pressure_systolic,
            VitalParameter::BloodPressureDiastolic => self.blood_pressure_diastolic,
            VitalParameter::Temperature => self.temperature,
            VitalParameter::OxygenSaturation => self.oxygen_saturation,
        }
    }

    /// Activity tier the sample falls into.
    #[must_use]
    pub fn tier(&self) -> ActivityTier {
        ActivityTier::classify(self.activity)
    }

    /// Sample timestamp, or the current time when the sample lacks one.
    #[must_use]
    pub fn timestamp_or_now(&self) -> DateTime<Utc> {
        self.timestamp.unwrap_or_else(Utc::now)
    }
}

/// An anomaly raised by a detector for exactly one (sample, parameter)
/// pair. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Anomaly {
    /// Parameter that deviated.
    pub parameter: VitalParameter,
    /// Observed value.
    pub value: f64,
    /// Applicable normal range; either bound may be population-fixed or
    /// baseline-derived.
    pub normal_range: (Option<f64>, Option<f64>),
    /// Activity tier the sample was evaluated under.
    pub tier: ActivityTier,
    /// Deviation as a percentage of the applicable spread.
    pub deviation_percent: Option<f64>,
    /// Severity of the deviation.
    pub severity: Severity,
    /// Time of the originating sample.
    pub timestamp: DateTime<Utc>,
    /// Free-text evidence note.
    pub evidence: Option<String>,
}

/// Per-subject running statistics for one (parameter, tier) key.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Baseline {
    /// Subject the baseline belongs to.
    pub subject_id: String,
    /// Parameter being tracked.
    pub parameter: VitalParameter,
    /// Activity tier the statistics apply to.
    pub tier: ActivityTier,
    /// Running mean.
    pub mean: f64,
    /// Running standard deviation (always >= 0).
    pub std_dev: f64,
    /// Number of observations folded in.
    pub sample_count: i64,
    /// Time of the last update.
    pub updated_at: DateTime<Utc>,
}

impl Baseline {
    /// Whether the baseline can support a z-score evaluation.
    ///
    /// A baseline with fewer than `min_samples` observations or zero
    /// variance is not eligible.
    #[must_use]
    pub fn is_eligible(&self, min_samples: u32) -> bool {
        self.sample_count >= i64::from(min_samples) && self.std_dev > 0.0
    }
}

/// Round to two decimal places, the precision used in reported ranges
/// and deviations.
#[must_use]
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
