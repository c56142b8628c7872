#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use perfpulse_core::{
    parse_playlists, Baseline, BaselinePolicy, Heartbeat, HeartbeatPayload, Metric, MetricVector,
    NewPulse, Pulse, PulseEvent, PulseFilter, PulseStatus, Statistic,
};
use perfpulse_db::DbError;
use perfpulse_engine::{
    CreatePulse, DispatchGateway, DispatchOutcome, DispatchPayload, Engine, EngineSettings,
    EventPublisher, ManualClock, MembershipResolver, MemoryPulseStore, Notifier, PublishError,
    PulseStore, StoreError, WorkerInvoker,
};
use uuid::Uuid;

pub const PLAYLISTS: &str = r"
playlists:
  - id: pair
    flags: [lighthouse-v12]
    slots:
      - { id: moto-g4-fra, device: moto-g4, location: eu-central-1 }
      - { id: desktop-iad, device: desktop, location: us-east-1 }
  - id: trio
    slots:
      - { id: s1, device: moto-g4, location: eu-central-1 }
      - { id: s2, device: iphone-12, location: eu-west-4 }
      - { id: s3, device: desktop, location: us-east-1 }
  - id: solo
    slots:
      - { id: only, device: desktop, location: us-east-1 }
";

pub const TIMEOUT_SECS: i64 = 900;

/// Records every payload and answers with a fixed outcome.
#[derive(Default)]
pub struct RecordingInvoker {
    pub payloads: Mutex<Vec<DispatchPayload>>,
    pub fail_slot: Option<String>,
}

#[async_trait]
impl WorkerInvoker for RecordingInvoker {
    async fn invoke(&self, payload: &DispatchPayload) -> DispatchOutcome {
        self.payloads
            .lock()
            .expect("lock")
            .push(payload.clone());
        if self.fail_slot.as_deref() == Some(payload.slot.id.as_str()) {
            DispatchOutcome::Failed("connection refused".to_string())
        } else {
            DispatchOutcome::Dispatched
        }
    }
}

pub struct StaticMemberships(pub Option<Uuid>);

#[async_trait]
impl MembershipResolver for StaticMemberships {
    async fn account_for(&self, _user_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        Ok(self.0)
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub events: Mutex<Vec<PulseEvent>>,
}

impl RecordingPublisher {
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .expect("lock")
            .iter()
            .map(PulseEvent::kind)
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &PulseEvent) -> Result<(), PublishError> {
        self.events.lock().expect("lock").push(event.clone());
        Ok(())
    }
}

pub struct Harness {
    pub engine: Engine,
    pub store: Arc<MemoryPulseStore>,
    pub invoker: Arc<RecordingInvoker>,
    pub events: Arc<RecordingPublisher>,
    pub clock: Arc<ManualClock>,
}

pub fn settings() -> EngineSettings {
    EngineSettings {
        slug_length: 12,
        slug_max_attempts: 5,
        dispatch_concurrency: 4,
        pulse_timeout: chrono::Duration::seconds(TIMEOUT_SECS),
        baseline: BaselinePolicy::default(),
    }
}

pub fn harness() -> Harness {
    harness_with(settings(), RecordingInvoker::default(), Some(Uuid::nil()))
}

pub fn harness_with(
    settings: EngineSettings,
    invoker: RecordingInvoker,
    account: Option<Uuid>,
) -> Harness {
    let store = Arc::new(MemoryPulseStore::new());
    harness_on(store.clone(), store, settings, invoker, account)
}

/// Harness whose engine runs on a [`FaultyStore`] over the harness store.
pub fn faulty_harness() -> (Harness, Arc<FaultyStore>) {
    let memory = Arc::new(MemoryPulseStore::new());
    let faulty = Arc::new(FaultyStore::new(memory.clone()));
    let h = harness_on(
        faulty.clone(),
        memory,
        settings(),
        RecordingInvoker::default(),
        Some(Uuid::nil()),
    );
    (h, faulty)
}

fn harness_on(
    engine_store: Arc<dyn PulseStore>,
    store: Arc<MemoryPulseStore>,
    settings: EngineSettings,
    invoker: RecordingInvoker,
    account: Option<Uuid>,
) -> Harness {
    let invoker = Arc::new(invoker);
    let events = Arc::new(RecordingPublisher::default());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let playlists = Arc::new(parse_playlists(PLAYLISTS).expect("playlists"));

    let gateway = DispatchGateway::new(
        invoker.clone(),
        Arc::new(StaticMemberships(account)),
        settings.dispatch_concurrency,
    );
    let engine = Engine::new(
        engine_store,
        Arc::new(gateway),
        Notifier::single(events.clone()),
        playlists,
        clock.clone(),
        settings,
    );

    Harness {
        engine,
        store,
        invoker,
        events,
        clock,
    }
}

pub fn request(playlist_id: &str) -> CreatePulse {
    request_for(1, 1, playlist_id)
}

pub fn request_for(target_id: i64, url_id: i64, playlist_id: &str) -> CreatePulse {
    CreatePulse {
        target_id,
        target_slug: "acme".to_string(),
        url_id,
        url: "https://acme.com/pricing".to_string(),
        playlist_id: playlist_id.to_string(),
        flags: vec![],
        requested_by: None,
    }
}

pub fn lcp(value: f64) -> HeartbeatPayload {
    HeartbeatPayload {
        metrics: MetricVector::new()
            .with(Metric::Lcp, value)
            .with(Metric::Performance, 92.0),
        ..HeartbeatPayload::default()
    }
}

fn injected() -> StoreError {
    StoreError::Db(DbError::InvalidRow("injected failure".to_string()))
}

/// Delegates to a memory store, failing the next `finalize_failures`
/// finalize calls and every transition of the pulses in `broken_pulses`.
pub struct FaultyStore {
    inner: Arc<MemoryPulseStore>,
    pub finalize_failures: AtomicUsize,
    pub broken_pulses: Mutex<HashSet<i64>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryPulseStore>) -> Self {
        Self {
            inner,
            finalize_failures: AtomicUsize::new(0),
            broken_pulses: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_next_finalize(&self) {
        self.finalize_failures.fetch_add(1, Ordering::SeqCst);
    }

    pub fn break_pulse(&self, pulse_id: i64) {
        self.broken_pulses.lock().expect("lock").insert(pulse_id);
    }
}

#[async_trait]
impl PulseStore for FaultyStore {
    async fn insert_pulse(&self, new: &NewPulse, slug: &str) -> Result<Pulse, StoreError> {
        self.inner.insert_pulse(new, slug).await
    }

    async fn transition(
        &self,
        pulse_id: i64,
        from: &[PulseStatus],
        to: PulseStatus,
    ) -> Result<bool, StoreError> {
        if self.broken_pulses.lock().expect("lock").contains(&pulse_id) {
            return Err(injected());
        }
        self.inner.transition(pulse_id, from, to).await
    }

    async fn get_pulse(&self, pulse_id: i64) -> Result<Option<Pulse>, StoreError> {
        self.inner.get_pulse(pulse_id).await
    }

    async fn get_pulse_by_slug(&self, slug: &str) -> Result<Option<Pulse>, StoreError> {
        self.inner.get_pulse_by_slug(slug).await
    }

    async fn list_pulses(&self, filter: &PulseFilter) -> Result<Vec<Pulse>, StoreError> {
        self.inner.list_pulses(filter).await
    }

    async fn list_stale(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Pulse>, StoreError> {
        self.inner.list_stale(cutoff, limit).await
    }

    async fn list_unfinalized(
        &self,
        completed_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Pulse>, StoreError> {
        self.inner.list_unfinalized(completed_before, limit).await
    }

    async fn insert_accepted_heartbeat(
        &self,
        pulse_id: i64,
        slot_id: &str,
        payload: &HeartbeatPayload,
    ) -> Result<Option<Heartbeat>, StoreError> {
        self.inner
            .insert_accepted_heartbeat(pulse_id, slot_id, payload)
            .await
    }

    async fn insert_late_heartbeat(
        &self,
        pulse_id: i64,
        slot_id: &str,
        payload: &HeartbeatPayload,
    ) -> Result<Heartbeat, StoreError> {
        self.inner.insert_late_heartbeat(pulse_id, slot_id, payload).await
    }

    async fn accepted_heartbeats(&self, pulse_id: i64) -> Result<Vec<Heartbeat>, StoreError> {
        self.inner.accepted_heartbeats(pulse_id).await
    }

    async fn heartbeats(&self, pulse_id: i64) -> Result<Vec<Heartbeat>, StoreError> {
        self.inner.heartbeats(pulse_id).await
    }

    async fn finalize(
        &self,
        pulse: &Pulse,
        metrics: &MetricVector,
        policy: &BaselinePolicy,
    ) -> Result<Option<Statistic>, StoreError> {
        let failing = self
            .finalize_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(injected());
        }
        self.inner.finalize(pulse, metrics, policy).await
    }

    async fn baseline(
        &self,
        target_id: i64,
        url_id: i64,
    ) -> Result<Option<Baseline>, StoreError> {
        self.inner.baseline(target_id, url_id).await
    }

    async fn statistic_for_pulse(&self, pulse_id: i64) -> Result<Option<Statistic>, StoreError> {
        self.inner.statistic_for_pulse(pulse_id).await
    }
}
