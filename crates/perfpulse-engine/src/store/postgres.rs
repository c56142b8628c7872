use async_trait::async_trait;
use chrono::{DateTime, Utc};
use perfpulse_core::{
    Baseline, BaselinePolicy, Heartbeat, HeartbeatPayload, MetricVector, NewPulse, Pulse,
    PulseFilter, PulseStatus, Statistic,
};
use perfpulse_db::DbError;
use sqlx::PgPool;

use super::PulseStore;
use crate::StoreError;

/// [`PulseStore`] backed by the `perfpulse-db` query layer.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn optional<T>(result: Result<T, DbError>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(DbError::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl PulseStore for PgStore {
    async fn insert_pulse(&self, new: &NewPulse, slug: &str) -> Result<Pulse, StoreError> {
        Ok(perfpulse_db::insert_pulse(&self.pool, new, slug).await?)
    }

    async fn transition(
        &self,
        pulse_id: i64,
        from: &[PulseStatus],
        to: PulseStatus,
    ) -> Result<bool, StoreError> {
        Ok(perfpulse_db::transition_pulse(&self.pool, pulse_id, from, to).await?)
    }

    async fn get_pulse(&self, pulse_id: i64) -> Result<Option<Pulse>, StoreError> {
        optional(perfpulse_db::get_pulse(&self.pool, pulse_id).await)
    }

    async fn get_pulse_by_slug(&self, slug: &str) -> Result<Option<Pulse>, StoreError> {
        optional(perfpulse_db::get_pulse_by_slug(&self.pool, slug).await)
    }

    async fn list_pulses(&self, filter: &PulseFilter) -> Result<Vec<Pulse>, StoreError> {
        Ok(perfpulse_db::list_pulses(&self.pool, filter).await?)
    }

    async fn list_stale(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Pulse>, StoreError> {
        Ok(perfpulse_db::list_stale_pulses(&self.pool, cutoff, limit).await?)
    }

    async fn list_unfinalized(
        &self,
        completed_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Pulse>, StoreError> {
        Ok(perfpulse_db::list_unfinalized_pulses(&self.pool, completed_before, limit).await?)
    }

    async fn insert_accepted_heartbeat(
        &self,
        pulse_id: i64,
        slot_id: &str,
        payload: &HeartbeatPayload,
    ) -> Result<Option<Heartbeat>, StoreError> {
        Ok(perfpulse_db::insert_accepted_heartbeat(&self.pool, pulse_id, slot_id, payload).await?)
    }

    async fn insert_late_heartbeat(
        &self,
        pulse_id: i64,
        slot_id: &str,
        payload: &HeartbeatPayload,
    ) -> Result<Heartbeat, StoreError> {
        Ok(perfpulse_db::insert_late_heartbeat(&self.pool, pulse_id, slot_id, payload).await?)
    }

    async fn accepted_heartbeats(&self, pulse_id: i64) -> Result<Vec<Heartbeat>, StoreError> {
        Ok(perfpulse_db::list_accepted_heartbeats(&self.pool, pulse_id).await?)
    }

    async fn heartbeats(&self, pulse_id: i64) -> Result<Vec<Heartbeat>, StoreError> {
        Ok(perfpulse_db::list_heartbeats(&self.pool, pulse_id).await?)
    }

    async fn finalize(
        &self,
        pulse: &Pulse,
        metrics: &MetricVector,
        policy: &BaselinePolicy,
    ) -> Result<Option<Statistic>, StoreError> {
        Ok(perfpulse_db::finalize_pulse(&self.pool, pulse, metrics, policy).await?)
    }

    async fn baseline(
        &self,
        target_id: i64,
        url_id: i64,
    ) -> Result<Option<Baseline>, StoreError> {
        Ok(perfpulse_db::get_baseline(&self.pool, target_id, url_id).await?)
    }

    async fn statistic_for_pulse(&self, pulse_id: i64) -> Result<Option<Statistic>, StoreError> {
        Ok(perfpulse_db::get_statistic_for_pulse(&self.pool, pulse_id).await?)
    }
}
