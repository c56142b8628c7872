//! Database operations for `heartbeats`.

use chrono::{DateTime, Utc};
use perfpulse_core::{Heartbeat, HeartbeatPayload};
use sqlx::{types::Json, PgPool};

use crate::DbError;

/// A row from the `heartbeats` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HeartbeatRow {
    pub id: i64,
    pub pulse_id: i64,
    pub slot_id: String,
    pub payload: Json<HeartbeatPayload>,
    pub disposition: String,
    pub received_at: DateTime<Utc>,
}

impl TryFrom<HeartbeatRow> for Heartbeat {
    type Error = DbError;

    fn try_from(row: HeartbeatRow) -> Result<Self, Self::Error> {
        Ok(Heartbeat {
            id: row.id,
            pulse_id: row.pulse_id,
            slot_id: row.slot_id,
            payload: row.payload.0,
            disposition: row.disposition.parse()?,
            received_at: row.received_at,
        })
    }
}

/// Records a heartbeat that counts toward completion.
///
/// Returns `None` when an accepted heartbeat already exists for
/// `(pulse_id, slot_id)`; the duplicate is not stored.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_accepted_heartbeat(
    pool: &PgPool,
    pulse_id: i64,
    slot_id: &str,
    payload: &HeartbeatPayload,
) -> Result<Option<Heartbeat>, DbError> {
    let row = sqlx::query_as::<_, HeartbeatRow>(
        "INSERT INTO heartbeats (pulse_id, slot_id, payload, disposition) \
         VALUES ($1, $2, $3, 'accepted') \
         ON CONFLICT (pulse_id, slot_id) WHERE disposition = 'accepted' DO NOTHING \
         RETURNING id, pulse_id, slot_id, payload, disposition, received_at",
    )
    .bind(pulse_id)
    .bind(slot_id)
    .bind(Json(payload))
    .fetch_optional(pool)
    .await?;

    row.map(Heartbeat::try_from).transpose()
}

/// Records a straggler that arrived after its pulse reached a terminal state.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_late_heartbeat(
    pool: &PgPool,
    pulse_id: i64,
    slot_id: &str,
    payload: &HeartbeatPayload,
) -> Result<Heartbeat, DbError> {
    sqlx::query_as::<_, HeartbeatRow>(
        "INSERT INTO heartbeats (pulse_id, slot_id, payload, disposition) \
         VALUES ($1, $2, $3, 'late') \
         RETURNING id, pulse_id, slot_id, payload, disposition, received_at",
    )
    .bind(pulse_id)
    .bind(slot_id)
    .bind(Json(payload))
    .fetch_one(pool)
    .await?
    .try_into()
}

/// Counts accepted heartbeats for a pulse.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_accepted_heartbeats(pool: &PgPool, pulse_id: i64) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM heartbeats WHERE pulse_id = $1 AND disposition = 'accepted'",
    )
    .bind(pulse_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Accepted heartbeats for a pulse in arrival order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_accepted_heartbeats(
    pool: &PgPool,
    pulse_id: i64,
) -> Result<Vec<Heartbeat>, DbError> {
    let rows = sqlx::query_as::<_, HeartbeatRow>(
        "SELECT id, pulse_id, slot_id, payload, disposition, received_at \
         FROM heartbeats \
         WHERE pulse_id = $1 AND disposition = 'accepted' \
         ORDER BY received_at, id",
    )
    .bind(pulse_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Heartbeat::try_from).collect()
}

/// Every heartbeat for a pulse, accepted and late, in arrival order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_heartbeats(pool: &PgPool, pulse_id: i64) -> Result<Vec<Heartbeat>, DbError> {
    let rows = sqlx::query_as::<_, HeartbeatRow>(
        "SELECT id, pulse_id, slot_id, payload, disposition, received_at \
         FROM heartbeats \
         WHERE pulse_id = $1 \
         ORDER BY received_at, id",
    )
    .bind(pulse_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Heartbeat::try_from).collect()
}
