//! Memory-backed application state for router tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use perfpulse_core::{parse_playlists, BaselinePolicy, Pulse};
use perfpulse_engine::{
    BroadcastPublisher, CreatePulse, DispatchGateway, DispatchOutcome, DispatchPayload, Engine,
    EngineSettings, MembershipResolver, MemoryPulseStore, Notifier, StoreError, SystemClock,
    WorkerInvoker,
};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use super::AppState;

const PLAYLISTS: &str = r"
playlists:
  - id: pair
    slots:
      - { id: moto-g4-fra, device: moto-g4, location: eu-central-1 }
      - { id: desktop-iad, device: desktop, location: us-east-1 }
  - id: solo
    slots:
      - { id: only, device: desktop, location: us-east-1 }
";

struct AckInvoker;

#[async_trait]
impl WorkerInvoker for AckInvoker {
    async fn invoke(&self, _payload: &DispatchPayload) -> DispatchOutcome {
        DispatchOutcome::Dispatched
    }
}

struct NoMemberships;

#[async_trait]
impl MembershipResolver for NoMemberships {
    async fn account_for(&self, _user_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        Ok(None)
    }
}

/// A pool that never connects; routes that reach Postgres fail fast.
fn unreachable_pool() -> sqlx::PgPool {
    PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(250))
        .connect_lazy("postgres://perfpulse@127.0.0.1:1/perfpulse")
        .expect("lazy pool")
}

pub(crate) fn memory_state() -> AppState {
    let events = BroadcastPublisher::new(64);
    let notifier = Notifier::single(Arc::new(events.clone()));
    let playlists = Arc::new(parse_playlists(PLAYLISTS).expect("test playlists"));
    let gateway = DispatchGateway::new(Arc::new(AckInvoker), Arc::new(NoMemberships), 4);
    let settings = EngineSettings {
        slug_length: 12,
        slug_max_attempts: 5,
        dispatch_concurrency: 4,
        pulse_timeout: chrono::Duration::seconds(900),
        baseline: BaselinePolicy::default(),
    };
    let engine = Engine::new(
        Arc::new(MemoryPulseStore::new()),
        Arc::new(gateway),
        notifier,
        playlists,
        Arc::new(SystemClock),
        settings,
    );

    AppState {
        pool: unreachable_pool(),
        engine,
        events,
    }
}

pub(crate) async fn seed_pulse(state: &AppState, playlist_id: &str) -> Pulse {
    let (pulse, _dispatch) = state
        .engine
        .pulses
        .create_pulse(&CreatePulse {
            target_id: 1,
            target_slug: "shop".to_string(),
            url_id: 1,
            url: "https://shop.example.com".to_string(),
            playlist_id: playlist_id.to_string(),
            flags: Vec::new(),
            requested_by: None,
        })
        .await
        .expect("create pulse");
    pulse
}
