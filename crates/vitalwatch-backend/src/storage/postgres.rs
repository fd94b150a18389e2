//! PostgreSQL storage over a bounded async connection pool.
//!
//! Schema lives in a `SCHEMA_SQL` const applied by [`PgStore::migrate`].
//! Baseline updates run inside a transaction holding a per-key advisory
//! lock, so the read-then-write of one (subject, parameter, tier) key
//! serializes against concurrent samples for the same subject.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use uuid::Uuid;

use vitalwatch_core::{
    ActivityTier, Anomaly, Baseline, BaselineStats, BaselineStore, DetectorKind, EngineResult,
    SampleSeriesSource, Selection, TrendParameter, VitalParameter, VitalsSample,
};

use super::{EventSink, StorageError};

/// Connection configuration for [`PgStore`].
#[derive(Debug, Clone)]
pub struct PgStoreConfig {
    /// Connection string.
    pub url: String,
    /// Maximum connections in the pool; acquisition blocks (up to the
    /// timeout) when exhausted.
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection.
    pub acquire_timeout_secs: u64,
}

impl Default for PgStoreConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/vitalwatch".to_string(),
            max_connections: 5,
            acquire_timeout_secs: 30,
        }
    }
}

impl PgStoreConfig {
    /// Create a config from a connection string, keeping the defaults.
    #[must_use]
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// PostgreSQL-backed store for samples, alerts, baselines, and the
/// persisted detector selection.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

/// One alert row as returned by the history endpoint.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AlertRecord {
    /// Alert id.
    pub id: Uuid,
    /// Time of the originating sample.
    pub timestamp: DateTime<Utc>,
    /// Parameter that deviated.
    pub parameter: String,
    /// Observed value.
    pub value: f64,
    /// Severity wire name.
    pub severity: String,
    /// Activity tier wire name.
    pub tier: String,
    /// Lower bound of the applicable normal range.
    pub normal_range_min: Option<f64>,
    /// Upper bound of the applicable normal range.
    pub normal_range_max: Option<f64>,
    /// Deviation percentage.
    pub deviation_percent: Option<f64>,
    /// Evidence note.
    pub evidence: Option<String>,
    /// Subject the alert belongs to.
    pub subject_id: String,
}

#[derive(Debug, FromRow)]
struct BaselineRow {
    subject_id: String,
    parameter: String,
    tier: String,
    mean_value: f64,
    std_deviation: f64,
    sample_count: i64,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BaselineRow> for Baseline {
    type Error = StorageError;

    fn try_from(row: BaselineRow) -> Result<Self, Self::Error> {
        let parameter: VitalParameter = row
            .parameter
            .parse()
            .map_err(|_| StorageError::Decode(format!("unknown parameter '{}'", row.parameter)))?;
        let tier: ActivityTier = row
            .tier
            .parse()
            .map_err(|_| StorageError::Decode(format!("unknown tier '{}'", row.tier)))?;
        Ok(Baseline {
            subject_id: row.subject_id,
            parameter,
            tier,
            mean: row.mean_value,
            std_dev: row.std_deviation,
            sample_count: row.sample_count,
            updated_at: row.updated_at,
        })
    }
}

impl PgStore {
    /// Connect with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns a connection error when the pool cannot be established.
    pub async fn connect(config: PgStoreConfig) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the schema.
    ///
    /// # Errors
    ///
    /// Returns a query error when schema creation fails.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(SCHEMA_SQL)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from_sqlx)?;
        Ok(())
    }

    /// Probe the database.
    ///
    /// # Errors
    ///
    /// Returns a connection error when the probe fails.
    pub async fn health_check(&self) -> Result<(), StorageError> {
        let row: (i32,) = sqlx::query_as("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::from_sqlx)?;
        debug_assert_eq!(row.0, 1);
        Ok(())
    }

    /// The underlying pool, for advanced callers.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Most recent alerts for a subject, newest first.
    ///
    /// # Errors
    ///
    /// Returns a query error when the fetch fails.
    pub async fn alerts_history(
        &self,
        subject_id: &str,
        limit: i64,
    ) -> Result<Vec<AlertRecord>, StorageError> {
        sqlx::query_as(
            r#"
            SELECT id, timestamp, parameter, value, severity, tier,
                   normal_range_min, normal_range_max, deviation_percent, evidence, subject_id
            FROM alerts
            WHERE subject_id = $1
            ORDER BY timestamp DESC
            LIMIT $2
            "#,
        )
        .bind(subject_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from_sqlx)
    }

    /// Load the persisted detector selection, if one was stored.
    ///
    /// # Errors
    ///
    /// Returns a query error when the fetch fails; an unparseable stored
    /// kind is treated as absent rather than fatal.
    pub async fn load_selection(&self) -> Result<Option<Selection>, StorageError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT key, value FROM system_config WHERE key IN ('detector_kind', 'subject_id')",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from_sqlx)?;

        let mut kind: Option<DetectorKind> = None;
        let mut subject_id: Option<String> = None;
        for (key, value) in rows {
            match key.as_str() {
                "detector_kind" => kind = value.parse().ok(),
                "subject_id" => subject_id = Some(value),
                _ => {}
            }
        }

        Ok(kind.map(|kind| Selection {
            kind,
            subject_id: subject_id.unwrap_or_else(|| "default".to_string()),
        }))
    }
}

#[async_trait]
impl EventSink for PgStore {
    async fn insert_sample(&self, sample: &VitalsSample) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO vitals (timestamp, heart_rate, blood_pressure_systolic,
                                blood_pressure_diastolic, temperature, oxygen_saturation,
                                activity, subject_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(sample.timestamp_or_now())
        .bind(sample.heart_rate)
        .bind(sample.blood_pressure_systolic)
        .bind(sample.blood_pressure_diastolic)
        .bind(sample.temperature)
        .bind(sample.oxygen_saturation)
        .bind(sample.activity)
        .bind(&sample.subject_id)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from_sqlx)?;
        Ok(())
    }

    async fn insert_alert(
        &self,
        anomaly: &Anomaly,
        subject_id: &str,
    ) -> Result<Uuid, StorageError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO alerts (id, timestamp, parameter, value, severity, tier,
                                normal_range_min, normal_range_max, deviation_percent,
                                evidence, subject_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(id)
        .bind(anomaly.timestamp)
        .bind(anomaly.parameter.as_str())
        .bind(anomaly.value)
        .bind(anomaly.severity.as_str())
        .bind(anomaly.tier.as_str())
        .bind(anomaly.normal_range.0)
        .bind(anomaly.normal_range.1)
        .bind(anomaly.deviation_percent)
        .bind(anomaly.evidence.as_deref())
        .bind(subject_id)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from_sqlx)?;
        Ok(id)
    }

    async fn store_selection(&self, selection: &Selection) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO system_config (key, value, updated_at)
            VALUES ('detector_kind', $1, NOW()), ('subject_id', $2, NOW())
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(selection.kind.as_str())
        .bind(&selection.subject_id)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from_sqlx)?;
        Ok(())
    }
}

#[async_trait]
impl BaselineStore for PgStore {
    async fn fetch_baselines(
        &self,
        subject_id: &str,
        tier: ActivityTier,
    ) -> EngineResult<Vec<Baseline>> {
        let rows: Vec<BaselineRow> = sqlx::query_as(
            r#"
            SELECT subject_id, parameter, tier, mean_value, std_deviation,
                   sample_count, updated_at
            FROM subject_baselines
            WHERE subject_id = $1 AND tier = $2
            "#,
        )
        .bind(subject_id)
        .bind(tier.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from_sqlx)?;

        rows.into_iter()
            .map(|row| Baseline::try_from(row).map_err(Into::into))
            .collect()
    }

    async fn fetch_all_baselines(&self, subject_id: &str) -> EngineResult<Vec<Baseline>> {
        let rows: Vec<BaselineRow> = sqlx::query_as(
            r#"
            SELECT subject_id, parameter, tier, mean_value, std_deviation,
                   sample_count, updated_at
            FROM subject_baselines
            WHERE subject_id = $1
            ORDER BY tier, parameter
            "#,
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from_sqlx)?;

        rows.into_iter()
            .map(|row| Baseline::try_from(row).map_err(Into::into))
            .collect()
    }

    async fn upsert_baseline(&self, baseline: &Baseline) -> EngineResult<()> {
        sqlx::query(UPSERT_BASELINE_SQL)
            .bind(&baseline.subject_id)
            .bind(baseline.parameter.as_str())
            .bind(baseline.tier.as_str())
            .bind(baseline.mean)
            .bind(baseline.std_dev)
            .bind(baseline.sample_count)
            .bind(baseline.updated_at)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from_sqlx)?;
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
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(StorageError::from_sqlx)?;

        // The row may not exist yet, so lock the key, not the row.
        let lock_key = format!("{subject_id}:{}:{}", parameter.as_str(), tier.as_str());
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1)::bigint)")
            .bind(&lock_key)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::from_sqlx)?;

        let existing: Option<(f64, f64, i64)> = sqlx::query_as(
            r#"
            SELECT mean_value, std_deviation, sample_count
            FROM subject_baselines
            WHERE subject_id = $1 AND parameter = $2 AND tier = $3
            "#,
        )
        .bind(subject_id)
        .bind(parameter.as_str())
        .bind(tier.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(StorageError::from_sqlx)?;

        let stats = existing
            .map(|(mean, std_dev, count)| BaselineStats {
                mean,
                std_dev,
                count,
            })
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

        sqlx::query(UPSERT_BASELINE_SQL)
            .bind(&baseline.subject_id)
            .bind(baseline.parameter.as_str())
            .bind(baseline.tier.as_str())
            .bind(baseline.mean)
            .bind(baseline.std_dev)
            .bind(baseline.sample_count)
            .bind(baseline.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::from_sqlx)?;

        tx.commit().await.map_err(StorageError::from_sqlx)?;
        Ok(baseline)
    }

    async fn delete_baselines(&self, subject_id: &str) -> EngineResult<u64> {
        let result = sqlx::query("DELETE FROM subject_baselines WHERE subject_id = $1")
            .bind(subject_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from_sqlx)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SampleSeriesSource for PgStore {
    async fn fetch_bucketed_series(
        &self,
        parameter: TrendParameter,
        bucket_width: Duration,
        since: DateTime<Utc>,
    ) -> EngineResult<Vec<(DateTime<Utc>, f64)>> {
        // Column names come from a closed enum, never from input; the
        // time parameters are bound.
        let column = trend_column(parameter);
        let sql = format!(
            r#"
            SELECT to_timestamp(floor(extract(epoch FROM timestamp) / $2) * $2) AS bucket_time,
                   AVG({column})::double precision AS avg_value
            FROM vitals
            WHERE {column} IS NOT NULL AND timestamp >= $1
            GROUP BY bucket_time
            ORDER BY bucket_time
            "#
        );

        let width_secs = bucket_width.num_seconds().max(1) as f64;
        let rows: Vec<(DateTime<Utc>, f64)> = sqlx::query_as(&sql)
            .bind(since)
            .bind(width_secs)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from_sqlx)?;

        Ok(rows)
    }
}

/// `vitals` column backing each aggregated parameter.
fn trend_column(parameter: TrendParameter) -> &'static str {
    match parameter {
        TrendParameter::HeartRate => "heart_rate",
        TrendParameter::BloodPressureSystolic => "blood_pressure_systolic",
        TrendParameter::BloodPressureDiastolic => "blood_pressure_diastolic",
        TrendParameter::Temperature => "temperature",
        TrendParameter::OxygenSaturation => "oxygen_saturation",
        TrendParameter::Activity => "activity",
    }
}

const UPSERT_BASELINE_SQL: &str = r#"
INSERT INTO subject_baselines (subject_id, parameter, tier, mean_value,
                               std_deviation, sample_count, updated_at)
VALUES ($1, $2, $3, $4, $5, $6, $7)
ON CONFLICT (subject_id, parameter, tier) DO UPDATE
SET mean_value = EXCLUDED.mean_value,
    std_deviation = EXCLUDED.std_deviation,
    sample_count = EXCLUDED.sample_count,
    updated_at = EXCLUDED.updated_at
"#;

/// Database schema.
const SCHEMA_SQL: &str = r#"
-- Raw telemetry samples
CREATE TABLE IF NOT EXISTS vitals (
    timestamp TIMESTAMPTZ NOT NULL,
    heart_rate DOUBLE PRECISION,
    blood_pressure_systolic DOUBLE PRECISION,
    blood_pressure_diastolic DOUBLE PRECISION,
    temperature DOUBLE PRECISION,
    oxygen_saturation DOUBLE PRECISION,
    activity BIGINT NOT NULL,
    subject_id TEXT NOT NULL DEFAULT 'default'
);

CREATE INDEX IF NOT EXISTS idx_vitals_time ON vitals(timestamp);
CREATE INDEX IF NOT EXISTS idx_vitals_subject_time ON vitals(subject_id, timestamp);

-- Raised anomaly alerts
CREATE TABLE IF NOT EXISTS alerts (
    id UUID PRIMARY KEY,
    timestamp TIMESTAMPTZ NOT NULL,
    parameter TEXT NOT NULL,
    value DOUBLE PRECISION NOT NULL,
    severity TEXT NOT NULL,
    tier TEXT NOT NULL,
    normal_range_min DOUBLE PRECISION,
    normal_range_max DOUBLE PRECISION,
    deviation_percent DOUBLE PRECISION,
    evidence TEXT,
    subject_id TEXT NOT NULL DEFAULT 'default'
);

CREATE INDEX IF NOT EXISTS idx_alerts_subject_time ON alerts(subject_id, timestamp DESC);

-- Learned per-subject baselines
CREATE TABLE IF NOT EXISTS subject_baselines (
    subject_id TEXT NOT NULL,
    parameter TEXT NOT NULL,
    tier TEXT NOT NULL,
    mean_value DOUBLE PRECISION NOT NULL,
    std_deviation DOUBLE PRECISION NOT NULL,
    sample_count BIGINT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (subject_id, parameter, tier)
);

-- Persisted runtime configuration
CREATE TABLE IF NOT EXISTS system_config (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = PgStoreConfig::default();
        assert_eq!(config.max_connections, 5);

        let config = PgStoreConfig::from_url("postgresql://test/db");
        assert_eq!(config.url, "postgresql://test/db");
        assert_eq!(config.acquire_timeout_secs, 30);
    }

    #[test]
    fn trend_columns_cover_every_parameter() {
        for parameter in TrendParameter::ALL {
            assert_eq!(trend_column(parameter), parameter.as_str());
        }
    }

    #[test]
    fn baseline_row_decodes() {
        let row = BaselineRow {
            subject_id: "s-1".into(),
            parameter: "heart_rate".into(),
            tier: "low".into(),
            mean_value: 72.0,
            std_deviation: 4.0,
            sample_count: 10,
            updated_at: Utc::now(),
        };
        let baseline = Baseline::try_from(row).unwrap();
        assert_eq!(baseline.parameter, VitalParameter::HeartRate);
        assert_eq!(baseline.tier, ActivityTier::Low);
    }

    #[test]
    fn baseline_row_rejects_unknown_parameter() {
        let row = BaselineRow {
            subject_id: "s-1".into(),
            parameter: "midichlorians".into(),
            tier: "low".into(),
            mean_value: 0.0,
            std_deviation: 0.0,
            sample_count: 0,
            updated_at: Utc::now(),
        };
        assert!(matches!(
            Baseline::try_from(row),
            Err(StorageError::Decode(_))
        ));
    }

    // Integration tests below need a running PostgreSQL instance, e.g.
    // DATABASE_URL=postgresql://localhost/vitalwatch_test cargo test -- --ignored

    async fn test_store() -> PgStore {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/vitalwatch_test".to_string());
        let store = PgStore::connect(PgStoreConfig::from_url(url)).await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL"]
    async fn postgres_health_check() {
        let store = test_store().await;
        store.health_check().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL"]
    async fn postgres_observation_sequence() {
        let store = test_store().await;
        let subject = format!("test-{}", Uuid::new_v4());
        let now = Utc::now();

        for value in [72.0, 76.0, 74.0] {
            store
                .apply_observation(&subject, VitalParameter::HeartRate, ActivityTier::Low, value, now)
                .await
                .unwrap();
        }

        let baselines = store.fetch_baselines(&subject, ActivityTier::Low).await.unwrap();
        assert_eq!(baselines.len(), 1);
        assert_eq!(baselines[0].sample_count, 3);
        assert!((baselines[0].mean - 72.666_666_666).abs() < 1e-6);

        assert_eq!(store.delete_baselines(&subject).await.unwrap(), 1);
        assert_eq!(store.delete_baselines(&subject).await.unwrap(), 0);
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL"]
    async fn postgres_selection_round_trip() {
        let store = test_store().await;
        store
            .store_selection(&Selection {
                kind: DetectorKind::AdaptiveBaseline,
                subject_id: "ward-7".into(),
            })
            .await
            .unwrap();

        let loaded = store.load_selection().await.unwrap().unwrap();
        assert_eq!(loaded.kind, DetectorKind::AdaptiveBaseline);
        assert_eq!(loaded.subject_id, "ward-7");
    }
}
