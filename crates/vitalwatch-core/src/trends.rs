//! Multi-resolution time-bucketed trend aggregation.
//!
//! Produces five fixed rolling windows per parameter, each with its own
//! bucket width and label format. The window table is fixed by design
//! and not overridable at runtime.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::error;

use crate::error::EngineResult;
use crate::types::{round2, VitalsSample};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One of the five fixed rolling windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrendWindow {
    /// Last minute in 5-second buckets.
    OneMinute,
    /// Last 30 minutes in 1-minute buckets.
    ThirtyMinutes,
    /// Last hour in 5-minute buckets.
    OneHour,
    /// Last day in 1-hour buckets.
    OneDay,
    /// Last 7 days in 1-day buckets.
    SevenDays,
}

impl TrendWindow {
    /// All windows, coarsest lookback last.
    pub const ALL: [TrendWindow; 5] = [
        TrendWindow::OneMinute,
        TrendWindow::ThirtyMinutes,
        TrendWindow::OneHour,
        TrendWindow::OneDay,
        TrendWindow::SevenDays,
    ];

    /// Wire label of the window.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            TrendWindow::OneMinute => "1min",
            TrendWindow::ThirtyMinutes => "30min",
            TrendWindow::OneHour => "1h",
            TrendWindow::OneDay => "1day",
            TrendWindow::SevenDays => "7day",
        }
    }

    /// Fixed bucket width for this window.
    #[must_use]
    pub fn bucket_width(self) -> Duration {
        match self {
            TrendWindow::OneMinute => Duration::seconds(5),
            TrendWindow::ThirtyMinutes => Duration::minutes(1),
            TrendWindow::OneHour => Duration::minutes(5),
            TrendWindow::OneDay => Duration::hours(1),
            TrendWindow::SevenDays => Duration::days(1),
        }
    }

    /// How far back the window reaches.
    #[must_use]
    pub fn lookback(self) -> Duration {
        match self {
            TrendWindow::OneMinute => Duration::minutes(1),
            TrendWindow::ThirtyMinutes => Duration::minutes(30),
            TrendWindow::OneHour => Duration::hours(1),
            TrendWindow::OneDay => Duration::days(1),
            TrendWindow::SevenDays => Duration::days(7),
        }
    }

    /// Format a bucket boundary for this window's granularity.
    #[must_use]
    pub fn format_bucket(self, bucket: DateTime<Utc>) -> String {
        let pattern = match self {
            TrendWindow::OneMinute | TrendWindow::ThirtyMinutes | TrendWindow::OneHour => {
                "%H:%M:%S"
            }
            TrendWindow::OneDay => "%H:%M",
            TrendWindow::SevenDays => "%m-%d",
        };
        bucket.format(pattern).to_string()
    }
}

/// A numeric series the aggregator reports on: the five vitals plus the
/// raw activity intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TrendParameter {
    /// Heart rate.
    HeartRate,
    /// Systolic blood pressure.
    BloodPressureSystolic,
    /// Diastolic blood pressure.
    BloodPressureDiastolic,
    /// Body temperature.
    Temperature,
    /// Oxygen saturation.
    OxygenSaturation,
    /// Raw activity intensity.
    Activity,
}

impl TrendParameter {
    /// All aggregated parameters.
    pub const ALL: [TrendParameter; 6] = [
        TrendParameter::HeartRate,
        TrendParameter::BloodPressureSystolic,
        TrendParameter::BloodPressureDiastolic,
        TrendParameter::Temperature,
        TrendParameter::OxygenSaturation,
        TrendParameter::Activity,
    ];

    /// Wire name of the parameter.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TrendParameter::HeartRate => "heart_rate",
            TrendParameter::BloodPressureSystolic => "blood_pressure_systolic",
            TrendParameter::BloodPressureDiastolic => "blood_pressure_diastolic",
            TrendParameter::Temperature => "temperature",
            TrendParameter::OxygenSaturation => "oxygen_saturation",
            TrendParameter::Activity => "activity",
        }
    }

    /// Extract this parameter's value from a sample, if measured.
    #[must_use]
    pub fn value_of(self, sample: &VitalsSample) -> Option<f64> {
        match self {
            TrendParameter::HeartRate => sample.heart_rate,
            TrendParameter::BloodPressureSystolic => sample.blood_pressure_systolic,
            TrendParameter::BloodPressureDiastolic => sample.blood_pressure_diastolic,
            TrendParameter::Temperature => sample.temperature,
            TrendParameter::OxygenSaturation => sample.oxygen_saturation,
            TrendParameter::Activity => Some(sample.activity as f64),
        }
    }
}

impl std::fmt::Display for TrendParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parallel arrays of formatted bucket labels and rounded averages, in
/// ascending time order.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrendSeries {
    /// Formatted bucket labels.
    pub times: Vec<String>,
    /// Per-bucket averages, rounded to two decimals.
    pub values: Vec<f64>,
}

/// Full aggregation result: window label -> parameter name -> series.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrendReport {
    /// Series keyed by window label, then parameter name.
    pub windows: BTreeMap<String, BTreeMap<String, TrendSeries>>,
}

/// History collaborator queried by the aggregator.
///
/// Rows are (bucket boundary, average of non-null values in the
/// bucket), ascending by bucket time, covering samples at or after
/// `since`, with buckets aligned to the width (Unix-epoch origin).
#[async_trait]
pub trait SampleSeriesSource: Send + Sync {
    /// Fetch the bucket-averaged series for one parameter.
    async fn fetch_bucketed_series(
        &self,
        parameter: TrendParameter,
        bucket_width: Duration,
        since: DateTime<Utc>,
    ) -> EngineResult<Vec<(DateTime<Utc>, f64)>>;
}

/// Floor a timestamp to its bucket boundary (Unix-epoch aligned).
#[must_use]
pub fn align_to_bucket(timestamp: DateTime<Utc>, bucket_width: Duration) -> DateTime<Utc> {
    let width_secs = bucket_width.num_seconds().max(1);
    let aligned = timestamp.timestamp().div_euclid(width_secs) * width_secs;
    DateTime::from_timestamp(aligned, 0).unwrap_or(timestamp)
}

/// Produces the five fixed-resolution series per parameter.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrendAggregator;

impl TrendAggregator {
    /// Aggregate all 6 x 5 (parameter, window) series as of `now`.
    ///
    /// A failure while aggregating one pair yields an empty series for
    /// that pair only; every other pair is still produced.
    pub async fn analyze<S: SampleSeriesSource>(source: &S, now: DateTime<Utc>) -> TrendReport {
        let mut windows = BTreeMap::new();

        for window in TrendWindow::ALL {
            let mut parameters = BTreeMap::new();
            for parameter in TrendParameter::ALL {
                let since = now - window.lookback();
                let series = match source
                    .fetch_bucketed_series(parameter, window.bucket_width(), since)
                    .await
                {
                    Ok(rows) => TrendSeries {
                        times: rows
                            .iter()
                            .map(|(bucket, _)| window.format_bucket(*bucket))
                            .collect(),
                        values: rows.iter().map(|(_, avg)| round2(*avg)).collect(),
                    },
                    Err(err) => {
                        error!(
                            parameter = parameter.as_str(),
                            window = window.label(),
                            %err,
                            "trend aggregation failed for series"
                        );
                        TrendSeries::default()
                    }
                };
                parameters.insert(parameter.as_str().to_string(), series);
            }
            windows.insert(window.label().to_string(), parameters);
        }

        TrendReport { windows }
    }
}

/// In-memory [`SampleSeriesSource`] over a fixed sample history, for
/// tests and storage-free deployments.
#[derive(Debug, Default)]
pub struct MemorySeriesSource {
    samples: Vec<VitalsSample>,
}

impl MemorySeriesSource {
    /// Create a source over a fixed history.
    #[must_use]
    pub fn new(samples: Vec<VitalsSample>) -> Self {
        Self { samples }
    }
}

#[async_trait]
impl SampleSeriesSource for MemorySeriesSource {
    async fn fetch_bucketed_series(
        &self,
        parameter: TrendParameter,
        bucket_width: Duration,
        since: DateTime<Utc>,
    ) -> EngineResult<Vec<(DateTime<Utc>, f64)>> {
        let mut buckets: BTreeMap<DateTime<Utc>, (f64, u32)> = BTreeMap::new();

        for sample in &self.samples {
            let Some(timestamp) = sample.timestamp else {
                continue;
            };
            if timestamp < since {
                continue;
            }
            let Some(value) = parameter.value_of(sample) else {
                continue;
            };
            let bucket = align_to_bucket(timestamp, bucket_width);
            let entry = buckets.entry(bucket).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }

        Ok(buckets
            .into_iter()
            .map(|(bucket, (sum, count))| (bucket, sum / f64::from(count)))
            .collect())
    }
}
