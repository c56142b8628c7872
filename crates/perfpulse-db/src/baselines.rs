//! Database operations for `baselines` and `statistics`.
//!
//! [`finalize_pulse`] is the only writer of both tables. It runs the whole
//! read-compare-fold-write cycle in one transaction holding a per
//! (target, url) advisory lock, so concurrent finalizations for the same key
//! apply one after another and a pulse is never folded twice.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use perfpulse_core::{
    fold_baseline, Baseline, BaselinePolicy, BaselineWindow, Comparison, Metric,
    MetricComparison, MetricVector, Pulse, Statistic, WindowEntry,
};
use sqlx::{types::Json, PgPool};

use crate::DbError;

/// A row from the `baselines` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BaselineRow {
    pub target_id: i64,
    pub url_id: i64,
    pub window_size: i32,
    pub entries: Json<Vec<WindowEntry>>,
    pub reference: Json<MetricVector>,
    pub last_pulse_id: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<BaselineRow> for Baseline {
    type Error = DbError;

    fn try_from(row: BaselineRow) -> Result<Self, Self::Error> {
        let window_size = usize::try_from(row.window_size).map_err(|_| {
            DbError::InvalidRow(format!("negative window_size {}", row.window_size))
        })?;
        Ok(Baseline {
            target_id: row.target_id,
            url_id: row.url_id,
            window: BaselineWindow {
                window_size,
                entries: row.entries.0,
                reference: row.reference.0,
                last_pulse_id: row.last_pulse_id,
            },
            updated_at: row.updated_at,
        })
    }
}

/// A row from the `statistics` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StatisticRow {
    pub id: i64,
    pub pulse_id: i64,
    pub target_id: i64,
    pub url_id: i64,
    pub classification: String,
    pub metrics: Json<MetricVector>,
    pub comparisons: Json<BTreeMap<Metric, MetricComparison>>,
    pub seeded_baseline: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<StatisticRow> for Statistic {
    type Error = DbError;

    fn try_from(row: StatisticRow) -> Result<Self, Self::Error> {
        Ok(Statistic {
            id: row.id,
            pulse_id: row.pulse_id,
            target_id: row.target_id,
            url_id: row.url_id,
            metrics: row.metrics.0,
            comparison: Comparison {
                overall: row.classification.parse()?,
                metrics: row.comparisons.0,
            },
            seeded_baseline: row.seeded_baseline,
            created_at: row.created_at,
        })
    }
}

const STATISTIC_COLUMNS: &str = "id, pulse_id, target_id, url_id, classification, metrics, \
                                 comparisons, seeded_baseline, created_at";

/// Fetches the current baseline for a (target, url) pair.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_baseline(
    pool: &PgPool,
    target_id: i64,
    url_id: i64,
) -> Result<Option<Baseline>, DbError> {
    sqlx::query_as::<_, BaselineRow>(
        "SELECT target_id, url_id, window_size, entries, reference, last_pulse_id, updated_at \
         FROM baselines \
         WHERE target_id = $1 AND url_id = $2",
    )
    .bind(target_id)
    .bind(url_id)
    .fetch_optional(pool)
    .await?
    .map(Baseline::try_from)
    .transpose()
}

/// Fetches the statistic recorded for a pulse, if it was finalized.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_statistic_for_pulse(
    pool: &PgPool,
    pulse_id: i64,
) -> Result<Option<Statistic>, DbError> {
    sqlx::query_as::<_, StatisticRow>(&format!(
        "SELECT {STATISTIC_COLUMNS} FROM statistics WHERE pulse_id = $1"
    ))
    .bind(pulse_id)
    .fetch_optional(pool)
    .await?
    .map(Statistic::try_from)
    .transpose()
}

/// Most recent statistics for a (target, url) pair, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_recent_statistics(
    pool: &PgPool,
    target_id: i64,
    url_id: i64,
    limit: i64,
) -> Result<Vec<Statistic>, DbError> {
    let rows = sqlx::query_as::<_, StatisticRow>(&format!(
        "SELECT {STATISTIC_COLUMNS} FROM statistics \
         WHERE target_id = $1 AND url_id = $2 \
         ORDER BY created_at DESC, id DESC \
         LIMIT $3"
    ))
    .bind(target_id)
    .bind(url_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Statistic::try_from).collect()
}

/// Folds a completed pulse into its baseline and records its statistic.
///
/// Returns `None` when the pulse was already finalized (a statistic exists or
/// the pulse is already in the window); nothing is written in that case.
///
/// # Errors
///
/// Returns [`DbError`] if any statement fails; the transaction is rolled back.
pub async fn finalize_pulse(
    pool: &PgPool,
    pulse: &Pulse,
    metrics: &MetricVector,
    policy: &BaselinePolicy,
) -> Result<Option<Statistic>, DbError> {
    let mut tx = pool.begin().await?;

    // Serializes finalizations per key, including the first one when no
    // baseline row exists yet to lock.
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(format!("baseline:{}:{}", pulse.target_id, pulse.url_id))
        .execute(&mut *tx)
        .await?;

    let already_recorded = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM statistics WHERE pulse_id = $1)",
    )
    .bind(pulse.id)
    .fetch_one(&mut *tx)
    .await?;
    if already_recorded {
        return Ok(None);
    }

    let current = sqlx::query_as::<_, BaselineRow>(
        "SELECT target_id, url_id, window_size, entries, reference, last_pulse_id, updated_at \
         FROM baselines \
         WHERE target_id = $1 AND url_id = $2 \
         FOR UPDATE",
    )
    .bind(pulse.target_id)
    .bind(pulse.url_id)
    .fetch_optional(&mut *tx)
    .await?
    .map(Baseline::try_from)
    .transpose()?;

    let Some(fin) = fold_baseline(current.as_ref().map(|b| &b.window), pulse.id, metrics, policy)
    else {
        return Ok(None);
    };

    let window_size = i32::try_from(fin.window.window_size).map_err(|_| {
        DbError::InvalidRow(format!("window_size {} too large", fin.window.window_size))
    })?;

    sqlx::query(
        "INSERT INTO baselines \
             (target_id, url_id, window_size, entries, reference, last_pulse_id, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, NOW()) \
         ON CONFLICT (target_id, url_id) DO UPDATE SET \
             window_size   = EXCLUDED.window_size, \
             entries       = EXCLUDED.entries, \
             reference     = EXCLUDED.reference, \
             last_pulse_id = EXCLUDED.last_pulse_id, \
             updated_at    = EXCLUDED.updated_at",
    )
    .bind(pulse.target_id)
    .bind(pulse.url_id)
    .bind(window_size)
    .bind(Json(&fin.window.entries))
    .bind(Json(&fin.window.reference))
    .bind(fin.window.last_pulse_id)
    .execute(&mut *tx)
    .await?;

    let statistic = sqlx::query_as::<_, StatisticRow>(&format!(
        "INSERT INTO statistics \
             (pulse_id, target_id, url_id, classification, metrics, comparisons, seeded_baseline) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (pulse_id) DO NOTHING \
         RETURNING {STATISTIC_COLUMNS}"
    ))
    .bind(pulse.id)
    .bind(pulse.target_id)
    .bind(pulse.url_id)
    .bind(fin.comparison.overall.as_str())
    .bind(Json(metrics))
    .bind(Json(&fin.comparison.metrics))
    .bind(fin.seeded)
    .fetch_optional(&mut *tx)
    .await?;

    // Dropping the transaction rolls back the baseline write.
    let Some(row) = statistic else {
        return Ok(None);
    };

    tx.commit().await?;
    Ok(Some(row.try_into()?))
}
