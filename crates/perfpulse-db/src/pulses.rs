//! Database operations for `pulses`.
//!
//! Every status change goes through [`transition_pulse`], a conditional
//! single-row update. Its boolean result is the only signal callers use to
//! decide who "won" a transition.

use chrono::{DateTime, Utc};
use perfpulse_core::{NewPulse, Pulse, PulseFilter, PulseStatus};
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use crate::DbError;

/// Name of the unique constraint on `pulses.slug`.
pub const PULSE_SLUG_CONSTRAINT: &str = "pulses_slug_key";

const PULSE_COLUMNS: &str = "id, slug, target_id, url_id, playlist_id, expected_slots, \
                             status, requested_by, created_at, completed_at";

/// A row from the `pulses` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PulseRow {
    pub id: i64,
    pub slug: String,
    pub target_id: i64,
    pub url_id: i64,
    pub playlist_id: String,
    pub expected_slots: Json<Vec<String>>,
    pub status: String,
    pub requested_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<PulseRow> for Pulse {
    type Error = DbError;

    fn try_from(row: PulseRow) -> Result<Self, Self::Error> {
        Ok(Pulse {
            id: row.id,
            slug: row.slug,
            target_id: row.target_id,
            url_id: row.url_id,
            playlist_id: row.playlist_id,
            expected_slots: row.expected_slots.0,
            status: row.status.parse()?,
            requested_by: row.requested_by,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

fn into_pulses(rows: Vec<PulseRow>) -> Result<Vec<Pulse>, DbError> {
    rows.into_iter().map(Pulse::try_from).collect()
}

/// Inserts a `pending` pulse under `slug`.
///
/// # Errors
///
/// Returns [`DbError::UniqueViolation`] with constraint
/// [`PULSE_SLUG_CONSTRAINT`] if the slug is taken, or [`DbError::Sqlx`] if the
/// insert fails.
pub async fn insert_pulse(pool: &PgPool, new: &NewPulse, slug: &str) -> Result<Pulse, DbError> {
    let row = sqlx::query_as::<_, PulseRow>(&format!(
        "INSERT INTO pulses (slug, target_id, url_id, playlist_id, expected_slots, status, requested_by) \
         VALUES ($1, $2, $3, $4, $5, 'pending', $6) \
         RETURNING {PULSE_COLUMNS}"
    ))
    .bind(slug)
    .bind(new.target_id)
    .bind(new.url_id)
    .bind(&new.playlist_id)
    .bind(Json(&new.expected_slots))
    .bind(new.requested_by)
    .fetch_one(pool)
    .await
    .map_err(DbError::from_insert)?;

    row.try_into()
}

/// Moves a pulse to `to` only if its current status is one of `from`.
///
/// Terminal targets stamp `completed_at`. Returns `true` when this call
/// performed the transition and `false` when the row was not in an allowed
/// state (another caller got there first, or the pulse does not exist).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn transition_pulse(
    pool: &PgPool,
    pulse_id: i64,
    from: &[PulseStatus],
    to: PulseStatus,
) -> Result<bool, DbError> {
    let from: Vec<&str> = from
        .iter()
        .copied()
        .filter(|s| s.can_transition_to(to))
        .map(PulseStatus::as_str)
        .collect();
    if from.is_empty() {
        return Ok(false);
    }

    let result = sqlx::query(
        "UPDATE pulses \
         SET status = $1, \
             completed_at = CASE WHEN $2 THEN NOW() ELSE completed_at END \
         WHERE id = $3 AND status = ANY($4)",
    )
    .bind(to.as_str())
    .bind(to.is_terminal())
    .bind(pulse_id)
    .bind(&from)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Fetches a pulse by internal id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no pulse has this id, or [`DbError::Sqlx`]
/// if the query fails.
pub async fn get_pulse(pool: &PgPool, pulse_id: i64) -> Result<Pulse, DbError> {
    sqlx::query_as::<_, PulseRow>(&format!("SELECT {PULSE_COLUMNS} FROM pulses WHERE id = $1"))
        .bind(pulse_id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)?
        .try_into()
}

/// Fetches a pulse by its public slug.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no pulse has this slug, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_pulse_by_slug(pool: &PgPool, slug: &str) -> Result<Pulse, DbError> {
    sqlx::query_as::<_, PulseRow>(&format!(
        "SELECT {PULSE_COLUMNS} FROM pulses WHERE slug = $1"
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?
    .try_into()
}

/// Lists pulses newest first, keyset-paginated on `id`.
///
/// Pulses of soft-deleted targets are hidden.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_pulses(pool: &PgPool, filter: &PulseFilter) -> Result<Vec<Pulse>, DbError> {
    let rows = sqlx::query_as::<_, PulseRow>(
        "SELECT p.id, p.slug, p.target_id, p.url_id, p.playlist_id, p.expected_slots, \
                p.status, p.requested_by, p.created_at, p.completed_at \
         FROM pulses p \
         JOIN targets t ON t.id = p.target_id \
         WHERE t.deleted_at IS NULL \
           AND ($1::BIGINT IS NULL OR p.target_id = $1) \
           AND ($2::TEXT IS NULL OR p.status = $2) \
           AND ($3::timestamptz IS NULL OR p.created_at >= $3) \
           AND ($4::timestamptz IS NULL OR p.created_at <= $4) \
           AND ($5::BIGINT IS NULL OR p.id < $5) \
         ORDER BY p.id DESC \
         LIMIT $6",
    )
    .bind(filter.target_id)
    .bind(filter.status.map(PulseStatus::as_str))
    .bind(filter.created_from)
    .bind(filter.created_to)
    .bind(filter.cursor)
    .bind(filter.effective_limit())
    .fetch_all(pool)
    .await?;

    into_pulses(rows)
}

/// Lists non-terminal pulses created before `cutoff`, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_stale_pulses(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Pulse>, DbError> {
    let rows = sqlx::query_as::<_, PulseRow>(&format!(
        "SELECT {PULSE_COLUMNS} FROM pulses \
         WHERE status IN ('pending', 'in_progress') AND created_at < $1 \
         ORDER BY created_at, id \
         LIMIT $2"
    ))
    .bind(cutoff)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    into_pulses(rows)
}

/// Lists completed pulses with no recorded statistic that finished before
/// `completed_before`, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_unfinalized_pulses(
    pool: &PgPool,
    completed_before: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Pulse>, DbError> {
    let rows = sqlx::query_as::<_, PulseRow>(&format!(
        "SELECT {PULSE_COLUMNS} FROM pulses \
         WHERE status = 'completed' AND completed_at < $1 \
           AND NOT EXISTS (SELECT 1 FROM statistics WHERE statistics.pulse_id = pulses.id) \
         ORDER BY completed_at, id \
         LIMIT $2"
    ))
    .bind(completed_before)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    into_pulses(rows)
}
