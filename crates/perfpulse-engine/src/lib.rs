//! Pulse orchestration: dispatch, heartbeat aggregation, baseline
//! finalization, event fan-out and reaping, written against the
//! [`PulseStore`] seam so the same engine runs on Postgres or in memory.

pub mod aggregator;
pub mod clock;
pub mod dispatch;
mod error;
pub mod finalize;
pub mod invoker;
pub mod notify;
pub mod reaper;
pub mod service;
pub mod store;

use std::sync::Arc;

use perfpulse_core::{AppConfig, BaselinePolicy, PlaylistsFile};
use sqlx::PgPool;

pub use aggregator::{Aggregator, IngestOutcome, Rejection};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatch::{
    DispatchGateway, DispatchOutcome, DispatchPayload, DispatchReport, DispatchRequest,
    MembershipResolver, PgMembershipResolver, SlotDispatch, WorkerInvoker,
};
pub use error::{EngineError, StoreError};
pub use finalize::{aggregate_heartbeats, finalize};
pub use invoker::HttpWorkerInvoker;
pub use notify::{BroadcastPublisher, EventPublisher, Notifier, PublishError};
pub use reaper::{ReapReport, Reaper};
pub use service::{CreatePulse, PulseService, SlugSource};
pub use store::{MemoryPulseStore, PgStore, PulseStore};

// chrono::Duration::seconds panics beyond i64::MAX milliseconds.
const MAX_TIMEOUT_SECS: i64 = i64::MAX / 1000;

/// Tunables the engine reads from [`AppConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub slug_length: usize,
    pub slug_max_attempts: u32,
    pub dispatch_concurrency: usize,
    pub pulse_timeout: chrono::Duration,
    pub baseline: BaselinePolicy,
}

impl EngineSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            slug_length: config.slug_length,
            slug_max_attempts: config.slug_max_attempts,
            dispatch_concurrency: config.dispatch_concurrency,
            pulse_timeout: chrono::Duration::seconds(
                i64::try_from(config.pulse_timeout_secs)
                    .unwrap_or(i64::MAX)
                    .min(MAX_TIMEOUT_SECS),
            ),
            baseline: config.baseline_policy(),
        }
    }
}

/// The wired-up engine: one store shared by creation, ingest and reaping.
#[derive(Clone)]
pub struct Engine {
    pub store: Arc<dyn PulseStore>,
    pub pulses: PulseService,
    pub aggregator: Aggregator,
    pub reaper: Reaper,
}

impl Engine {
    #[must_use]
    pub fn new(
        store: Arc<dyn PulseStore>,
        gateway: Arc<DispatchGateway>,
        notifier: Notifier,
        playlists: Arc<PlaylistsFile>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        let pulses = PulseService::new(
            Arc::clone(&store),
            gateway,
            notifier.clone(),
            playlists,
            settings.slug_length,
            settings.slug_max_attempts,
        );
        let aggregator = Aggregator::new(Arc::clone(&store), notifier.clone(), settings.baseline);
        let reaper = Reaper::new(
            Arc::clone(&store),
            notifier,
            clock,
            settings.pulse_timeout,
            settings.baseline,
        );
        Self {
            store,
            pulses,
            aggregator,
            reaper,
        }
    }

    /// Wire the engine against Postgres and the HTTP worker endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the worker HTTP client cannot be built.
    pub fn postgres(
        pool: PgPool,
        config: &AppConfig,
        playlists: Arc<PlaylistsFile>,
        notifier: Notifier,
    ) -> Result<Self, reqwest::Error> {
        let settings = EngineSettings::from_app_config(config);
        let invoker = HttpWorkerInvoker::new(
            config.worker_url.clone(),
            config.worker_token.clone(),
            config.worker_timeout_secs,
        )?;
        let memberships = PgMembershipResolver::new(pool.clone(), config.membership_policy);
        let gateway = DispatchGateway::new(
            Arc::new(invoker),
            Arc::new(memberships),
            settings.dispatch_concurrency,
        );
        Ok(Self::new(
            Arc::new(PgStore::new(pool)),
            Arc::new(gateway),
            notifier,
            playlists,
            Arc::new(SystemClock),
            settings,
        ))
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("pulses", &self.pulses)
            .field("reaper", &self.reaper)
            .finish_non_exhaustive()
    }
}
