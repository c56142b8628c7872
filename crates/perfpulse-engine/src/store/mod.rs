//! Persistence seam for the orchestration engine.
//!
//! Implementations must make [`PulseStore::transition`] a compare-and-swap,
//! [`PulseStore::insert_accepted_heartbeat`] unique per (pulse, slot) and
//! [`PulseStore::finalize`] serialized per (target, url) and idempotent per
//! pulse. The engine relies on nothing else for correctness under
//! concurrency.

mod memory;
mod postgres;

pub use memory::MemoryPulseStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use perfpulse_core::{
    Baseline, BaselinePolicy, Heartbeat, HeartbeatPayload, MetricVector, NewPulse, Pulse,
    PulseFilter, PulseStatus, Statistic,
};

use crate::StoreError;

#[async_trait]
pub trait PulseStore: Send + Sync {
    /// Inserts a pending pulse. Fails with [`StoreError::SlugTaken`] on a
    /// slug collision.
    async fn insert_pulse(&self, new: &NewPulse, slug: &str) -> Result<Pulse, StoreError>;

    /// Moves the pulse to `to` iff its status is in `from`. Returns whether
    /// this call made the change.
    async fn transition(
        &self,
        pulse_id: i64,
        from: &[PulseStatus],
        to: PulseStatus,
    ) -> Result<bool, StoreError>;

    async fn get_pulse(&self, pulse_id: i64) -> Result<Option<Pulse>, StoreError>;

    async fn get_pulse_by_slug(&self, slug: &str) -> Result<Option<Pulse>, StoreError>;

    async fn list_pulses(&self, filter: &PulseFilter) -> Result<Vec<Pulse>, StoreError>;

    /// Non-terminal pulses created before `cutoff`, oldest first.
    async fn list_stale(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Pulse>, StoreError>;

    /// Completed pulses with no statistic that finished before
    /// `completed_before`, oldest first.
    async fn list_unfinalized(
        &self,
        completed_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Pulse>, StoreError>;

    /// Returns `None` when the slot already has an accepted heartbeat.
    async fn insert_accepted_heartbeat(
        &self,
        pulse_id: i64,
        slot_id: &str,
        payload: &HeartbeatPayload,
    ) -> Result<Option<Heartbeat>, StoreError>;

    async fn insert_late_heartbeat(
        &self,
        pulse_id: i64,
        slot_id: &str,
        payload: &HeartbeatPayload,
    ) -> Result<Heartbeat, StoreError>;

    async fn accepted_heartbeats(&self, pulse_id: i64) -> Result<Vec<Heartbeat>, StoreError>;

    /// Accepted and late heartbeats in arrival order.
    async fn heartbeats(&self, pulse_id: i64) -> Result<Vec<Heartbeat>, StoreError>;

    /// Folds the pulse into its baseline and records its statistic in one
    /// atomic step. Returns `None` if the pulse was already finalized.
    async fn finalize(
        &self,
        pulse: &Pulse,
        metrics: &MetricVector,
        policy: &BaselinePolicy,
    ) -> Result<Option<Statistic>, StoreError>;

    async fn baseline(&self, target_id: i64, url_id: i64)
        -> Result<Option<Baseline>, StoreError>;

    async fn statistic_for_pulse(&self, pulse_id: i64) -> Result<Option<Statistic>, StoreError>;
}
