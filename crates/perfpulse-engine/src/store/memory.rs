use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use perfpulse_core::{
    fold_baseline, Baseline, BaselinePolicy, Heartbeat, HeartbeatDisposition, HeartbeatPayload,
    MetricVector, NewPulse, Pulse, PulseFilter, PulseStatus, Statistic,
};

use super::PulseStore;
use crate::StoreError;

#[derive(Debug, Default)]
struct State {
    pulses: Vec<Pulse>,
    heartbeats: Vec<Heartbeat>,
    baselines: HashMap<(i64, i64), Baseline>,
    statistics: Vec<Statistic>,
}

impl State {
    fn pulse_mut(&mut self, pulse_id: i64) -> Option<&mut Pulse> {
        self.pulses.iter_mut().find(|p| p.id == pulse_id)
    }

    fn push_heartbeat(
        &mut self,
        pulse_id: i64,
        slot_id: &str,
        payload: &HeartbeatPayload,
        disposition: HeartbeatDisposition,
    ) -> Heartbeat {
        let heartbeat = Heartbeat {
            id: next_id(self.heartbeats.len()),
            pulse_id,
            slot_id: slot_id.to_owned(),
            payload: payload.clone(),
            disposition,
            received_at: Utc::now(),
        };
        self.heartbeats.push(heartbeat.clone());
        heartbeat
    }
}

fn next_id(len: usize) -> i64 {
    i64::try_from(len).map_or(i64::MAX, |n| n + 1)
}

/// In-process [`PulseStore`] holding everything behind one mutex.
///
/// Every trait method runs under the lock, which gives the same
/// compare-and-swap and uniqueness guarantees the Postgres store gets from
/// conditional updates and unique indexes.
#[derive(Debug, Default)]
pub struct MemoryPulseStore {
    state: Mutex<State>,
}

impl MemoryPulseStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PulseStore for MemoryPulseStore {
    async fn insert_pulse(&self, new: &NewPulse, slug: &str) -> Result<Pulse, StoreError> {
        let mut state = self.lock();
        if state.pulses.iter().any(|p| p.slug == slug) {
            return Err(StoreError::SlugTaken);
        }
        let pulse = Pulse {
            id: next_id(state.pulses.len()),
            slug: slug.to_owned(),
            target_id: new.target_id,
            url_id: new.url_id,
            playlist_id: new.playlist_id.clone(),
            expected_slots: new.expected_slots.clone(),
            status: PulseStatus::Pending,
            requested_by: new.requested_by,
            created_at: Utc::now(),
            completed_at: None,
        };
        state.pulses.push(pulse.clone());
        Ok(pulse)
    }

    async fn transition(
        &self,
        pulse_id: i64,
        from: &[PulseStatus],
        to: PulseStatus,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock();
        let Some(pulse) = state.pulse_mut(pulse_id) else {
            return Ok(false);
        };
        if !from.contains(&pulse.status) || !pulse.status.can_transition_to(to) {
            return Ok(false);
        }
        pulse.status = to;
        if to.is_terminal() {
            pulse.completed_at = Some(Utc::now());
        }
        Ok(true)
    }

    async fn get_pulse(&self, pulse_id: i64) -> Result<Option<Pulse>, StoreError> {
        Ok(self.lock().pulses.iter().find(|p| p.id == pulse_id).cloned())
    }

    async fn get_pulse_by_slug(&self, slug: &str) -> Result<Option<Pulse>, StoreError> {
        Ok(self.lock().pulses.iter().find(|p| p.slug == slug).cloned())
    }

    async fn list_pulses(&self, filter: &PulseFilter) -> Result<Vec<Pulse>, StoreError> {
        let limit = usize::try_from(filter.effective_limit()).unwrap_or(usize::MAX);
        Ok(self
            .lock()
            .pulses
            .iter()
            .rev()
            .filter(|p| filter.matches(p))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_stale(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Pulse>, StoreError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .lock()
            .pulses
            .iter()
            .filter(|p| !p.status.is_terminal() && p.created_at < cutoff)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_unfinalized(
        &self,
        completed_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Pulse>, StoreError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let state = self.lock();
        Ok(state
            .pulses
            .iter()
            .filter(|p| {
                p.status == PulseStatus::Completed
                    && p.completed_at.is_some_and(|at| at < completed_before)
                    && !state.statistics.iter().any(|s| s.pulse_id == p.id)
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_accepted_heartbeat(
        &self,
        pulse_id: i64,
        slot_id: &str,
        payload: &HeartbeatPayload,
    ) -> Result<Option<Heartbeat>, StoreError> {
        let mut state = self.lock();
        let taken = state.heartbeats.iter().any(|h| {
            h.pulse_id == pulse_id
                && h.slot_id == slot_id
                && h.disposition == HeartbeatDisposition::Accepted
        });
        if taken {
            return Ok(None);
        }
        Ok(Some(state.push_heartbeat(
            pulse_id,
            slot_id,
            payload,
            HeartbeatDisposition::Accepted,
        )))
    }

    async fn insert_late_heartbeat(
        &self,
        pulse_id: i64,
        slot_id: &str,
        payload: &HeartbeatPayload,
    ) -> Result<Heartbeat, StoreError> {
        Ok(self
            .lock()
            .push_heartbeat(pulse_id, slot_id, payload, HeartbeatDisposition::Late))
    }

    async fn accepted_heartbeats(&self, pulse_id: i64) -> Result<Vec<Heartbeat>, StoreError> {
        Ok(self
            .lock()
            .heartbeats
            .iter()
            .filter(|h| h.pulse_id == pulse_id && h.disposition == HeartbeatDisposition::Accepted)
            .cloned()
            .collect())
    }

    async fn heartbeats(&self, pulse_id: i64) -> Result<Vec<Heartbeat>, StoreError> {
        Ok(self
            .lock()
            .heartbeats
            .iter()
            .filter(|h| h.pulse_id == pulse_id)
            .cloned()
            .collect())
    }

    async fn finalize(
        &self,
        pulse: &Pulse,
        metrics: &MetricVector,
        policy: &BaselinePolicy,
    ) -> Result<Option<Statistic>, StoreError> {
        let mut state = self.lock();
        if state.statistics.iter().any(|s| s.pulse_id == pulse.id) {
            return Ok(None);
        }

        let key = (pulse.target_id, pulse.url_id);
        let Some(fin) = fold_baseline(
            state.baselines.get(&key).map(|b| &b.window),
            pulse.id,
            metrics,
            policy,
        ) else {
            return Ok(None);
        };

        let now = Utc::now();
        state.baselines.insert(
            key,
            Baseline {
                target_id: pulse.target_id,
                url_id: pulse.url_id,
                window: fin.window,
                updated_at: now,
            },
        );
        let statistic = Statistic {
            id: next_id(state.statistics.len()),
            pulse_id: pulse.id,
            target_id: pulse.target_id,
            url_id: pulse.url_id,
            metrics: metrics.clone(),
            comparison: fin.comparison,
            seeded_baseline: fin.seeded,
            created_at: now,
        };
        state.statistics.push(statistic.clone());
        Ok(Some(statistic))
    }

    async fn baseline(
        &self,
        target_id: i64,
        url_id: i64,
    ) -> Result<Option<Baseline>, StoreError> {
        Ok(self.lock().baselines.get(&(target_id, url_id)).cloned())
    }

    async fn statistic_for_pulse(&self, pulse_id: i64) -> Result<Option<Statistic>, StoreError> {
        Ok(self
            .lock()
            .statistics
            .iter()
            .find(|s| s.pulse_id == pulse_id)
            .cloned())
    }
}
