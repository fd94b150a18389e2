//! Population reference ranges per (parameter, activity tier).

use crate::types::{ActivityTier, VitalParameter};

/// Static lookup of `[min, max]` population reference values.
///
/// The table covers every tracked parameter at every tier; the lookup
/// still returns `Option` because detectors must treat a missing pair as
/// a non-fatal miss (skip the parameter, keep evaluating the rest).
pub struct ReferenceRangeTable;

impl ReferenceRangeTable {
    /// Normal `[min, max]` for a parameter at an activity tier.
    #[must_use]
    pub fn normal_range(parameter: VitalParameter, tier: ActivityTier) -> Option<(f64, f64)> {
        use ActivityTier::{High, Low, Medium};
        use VitalParameter::{
            BloodPressureDiastolic, BloodPressureSystolic, HeartRate, OxygenSaturation,
            Temperature,
        };

        let range = match (tier, parameter) {
            (Low, HeartRate) => (60.0, 80.0),
            (Low, BloodPressureSystolic) => (110.0, 120.0),
            (Low, BloodPressureDiastolic) => (70.0, 80.0),
            (Low, Temperature) => (36.1, 37.2),
            (Low, OxygenSaturation) => (95.0, 100.0),

            (Medium, HeartRate) => (80.0, 100.0),
            (Medium, BloodPressureSystolic) => (120.0, 140.0),
            (Medium, BloodPressureDiastolic) => (80.0, 90.0),
            (Medium, Temperature) => (36.5, 37.5),
            (Medium, OxygenSaturation) => (94.0, 99.0),

            (High, HeartRate) => (100.0, 160.0),
            (High, BloodPressureSystolic) => (140.0, 160.0),
            (High, BloodPressureDiastolic) => (90.0, 100.0),
            (High, Temperature) => (37.0, 38.0),
            (High, OxygenSaturation) => (92.0, 98.0),
        };
        Some(range)
    }
}
