//! Per-subject running baseline statistics and their persistence seam.
//!
//! The recurrence is Welford's single-pass mean/variance update adapted
//! to a persisted, resumable running state: instead of holding the
//! variance accumulator in memory, it is reconstructed on every step
//! from the stored standard deviation as `(count - 1) * std_dev^2`.
//! This trades a little numerical drift for surviving process restarts
//! without replaying history.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::EngineResult;
use crate::types::{ActivityTier, Baseline, VitalParameter};

/// Running (mean, standard deviation, count) triple for one baseline key.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BaselineStats {
    /// Running mean.
    pub mean: f64,
    /// Running standard deviation.
    pub std_dev: f64,
    /// Observations folded in so far.
    pub count: i64,
}

impl BaselineStats {
    /// Fold one observation into the running statistics.
    ///
    /// The first observation seeds the mean; the second anchors the
    /// spread to the distance from that seed; from the third onward the
    /// incremental mean update and the reconstructed-accumulator
    /// variance update apply.
    #[must_use]
    pub fn advance(self, value: f64) -> Self {
        let new_count = self.count + 1;
        match self.count {
            0 => Self {
                mean: value,
                std_dev: 0.0,
                count: new_count,
            },
            1 => Self {
                mean: self.mean,
                std_dev: (value - self.mean).abs(),
                count: new_count,
            },
            count => {
                let new_mean = self.mean + (value - self.mean) / new_count as f64;
                let delta = value - self.mean;
                let delta2 = value - new_mean;
                let m2 = (count - 1) as f64 * self.std_dev * self.std_dev + delta * delta2;
                Self {
                    mean: new_mean,
                    std_dev: (m2 / count as f64).sqrt(),
                    count: new_count,
                }
            }
        }
    }
}

impl From<&Baseline> for BaselineStats {
    fn from(baseline: &Baseline) -> Self {
        Self {
            mean: baseline.mean,
            std_dev: baseline.std_dev,
            count: baseline.sample_count,
        }
    }
}

/// Persistence authority for per-(subject, parameter, tier) baselines.
///
/// The store is the only owner of baseline state; detectors never cache
/// baselines across calls.
#[async_trait]
pub trait BaselineStore: Send + Sync {
    /// All baselines for one subject at one activity tier.
    async fn fetch_baselines(
        &self,
        subject_id: &str,
        tier: ActivityTier,
    ) -> EngineResult<Vec<Baseline>>;

    /// All baselines for one subject across every tier.
    async fn fetch_all_baselines(&self, subject_id: &str) -> EngineResult<Vec<Baseline>>;

    /// Insert or replace one baseline row.
    async fn upsert_baseline(&self, baseline: &Baseline) -> EngineResult<()>;

    /// Fold one observation into the stored baseline for a key,
    /// creating the row when absent.
    ///
    /// Implementations must make the read-then-write atomic with respect
    /// to concurrent observations of the same (subject, parameter, tier)
    /// key; a lost update is a correctness bug, not an accepted race.
    async fn apply_observation(
        &self,
        subject_id: &str,
        parameter: VitalParameter,
        tier: ActivityTier,
        value: f64,
        observed_at: DateTime<Utc>,
    ) -> EngineResult<Baseline>;

    /// Delete every baseline row for a subject, returning the number of
    /// rows removed. Idempotent.
    async fn delete_baselines(&self, subject_id: &str) -> EngineResult<u64>;
}

type BaselineKey = (String, VitalParameter, ActivityTier);

/// In-memory [`BaselineStore`] for tests and storage-free deployments.
///
/// A single mutex guards the map, so per-key atomicity of
/// [`BaselineStore::apply_observation`] holds trivially.
#[derive(Debug, Default)]
pub struct MemoryBaselineStore {
    inner: Mutex<HashMap<BaselineKey, Baseline>>,
}

impl MemoryBaselineStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of baseline rows held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the store holds no baselines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[async_trait]
impl BaselineStore for MemoryBaselineStore {
    async fn fetch_baselines(
        &self,
        subject_id: &str,
        tier: ActivityTier,
    ) -> EngineResult<Vec<Baseline>> {
        Ok(self
            .inner
            .lock()
            .values()
            .filter(|b| b.subject_id == subject_id && b.tier == tier)
            .cloned()
            .collect())
    }

    async fn fetch_all_baselines(&self, subject_id: &str) -> EngineResult<Vec<Baseline>> {
        Ok(self
            .inner
            .lock()
            .values()
            .filter(|b| b.subject_id == subject_id)
            .cloned()
            .collect())
    }

    async fn upsert_baseline(&self, baseline: &Baseline) -> EngineResult<()> {
        let key = (
            baseline.subject_id.clone(),
            baseline.parameter,
            baseline.tier,
        );
        self.inner.lock().insert(key, baseline.clone());
        Ok(())
    }

    async fn apply_observation(
        &self,
        subject_id: &str,
        parameter: VitalParameter,
        tier: ActivityTier,
        value: f64,
        observed_at: DateTime<Utc>,
    ) -> EngineResult<Baseline> {
        let mut inner = self.inner.lock();
        let key = (subject_id.to_string(), parameter, tier);
        let stats = inner
            .get(&key)
            .map(BaselineStats::from)
            .unwrap_or_default()
            .advance(value);
        let baseline = Baseline {
            subject_id: subject_id.to_string(),
            parameter,
            tier,
            mean: stats.mean,
            std_dev: stats.std_dev,
            sample_count: stats.count,
            updated_at: observed_at,
        };
        inner.insert(key, baseline.clone());
        Ok(baseline)
    }

    async fn delete_baselines(&self, subject_id: &str) -> EngineResult<u64> {
        let mut inner = self.inner.lock();
        let before = inner.len();
        inner.retain(|(subject, _, _), _| subject != subject_id);
        Ok((before - inner.len()) as u64)
    }
}
