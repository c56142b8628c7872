//! Pulse creation and dispatch.

use std::sync::Arc;

use chrono::Utc;
use perfpulse_core::{generate_slug, NewPulse, PlaylistsFile, Pulse, PulseEvent};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::dispatch::{DispatchGateway, DispatchReport, DispatchRequest};
use crate::notify::Notifier;
use crate::{EngineError, PulseStore, StoreError};

/// Produces a candidate slug of the requested length.
pub type SlugSource = Arc<dyn Fn(usize) -> String + Send + Sync>;

/// A request to assess one URL of a target with one playlist.
#[derive(Debug, Clone)]
pub struct CreatePulse {
    pub target_id: i64,
    pub target_slug: String,
    pub url_id: i64,
    /// Canonical URL handed to the workers.
    pub url: String,
    pub playlist_id: String,
    /// Added to the playlist's own flags.
    pub flags: Vec<String>,
    pub requested_by: Option<Uuid>,
}

#[derive(Clone)]
pub struct PulseService {
    store: Arc<dyn PulseStore>,
    gateway: Arc<DispatchGateway>,
    notifier: Notifier,
    playlists: Arc<PlaylistsFile>,
    slug_length: usize,
    slug_max_attempts: u32,
    slug_source: SlugSource,
}

impl PulseService {
    #[must_use]
    pub fn new(
        store: Arc<dyn PulseStore>,
        gateway: Arc<DispatchGateway>,
        notifier: Notifier,
        playlists: Arc<PlaylistsFile>,
        slug_length: usize,
        slug_max_attempts: u32,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            playlists,
            slug_length,
            slug_max_attempts: slug_max_attempts.max(1),
            slug_source: Arc::new(generate_slug),
        }
    }

    #[must_use]
    pub fn with_slug_source(mut self, source: SlugSource) -> Self {
        self.slug_source = source;
        self
    }

    #[must_use]
    pub fn playlists(&self) -> &PlaylistsFile {
        &self.playlists
    }

    /// Persist a new pending pulse under a fresh slug and announce it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownPlaylist`] if the playlist is not
    /// configured, [`EngineError::SlugExhausted`] if every slug attempt
    /// collided, or [`EngineError::Store`] if the store fails.
    pub async fn create_pulse(
        &self,
        request: &CreatePulse,
    ) -> Result<(Pulse, DispatchRequest), EngineError> {
        let playlist = self
            .playlists
            .find(&request.playlist_id)
            .ok_or_else(|| EngineError::UnknownPlaylist(request.playlist_id.clone()))?;

        let new = NewPulse {
            target_id: request.target_id,
            url_id: request.url_id,
            playlist_id: playlist.id.clone(),
            expected_slots: playlist.slot_ids(),
            requested_by: request.requested_by,
        };

        let pulse = self.insert_with_fresh_slug(&new).await?;
        tracing::info!(
            pulse = %pulse.slug,
            target = %request.target_slug,
            playlist = %pulse.playlist_id,
            slots = pulse.expected_count(),
            "pulse created"
        );

        self.notifier
            .emit(PulseEvent::PulseCreated {
                slug: pulse.slug.clone(),
                playlist_id: pulse.playlist_id.clone(),
                expected_slots: pulse.expected_count(),
                at: Utc::now(),
            })
            .await;

        let mut flags = playlist.flags.clone();
        for flag in &request.flags {
            if !flags.contains(flag) {
                flags.push(flag.clone());
            }
        }

        let dispatch = DispatchRequest {
            url: request.url.clone(),
            target_slug: request.target_slug.clone(),
            slots: playlist.slots.clone(),
            flags,
            requested_by: request.requested_by,
        };
        Ok((pulse, dispatch))
    }

    async fn insert_with_fresh_slug(&self, new: &NewPulse) -> Result<Pulse, EngineError> {
        for attempt in 1..=self.slug_max_attempts {
            let slug = (self.slug_source)(self.slug_length);
            match self.store.insert_pulse(new, &slug).await {
                Ok(pulse) => return Ok(pulse),
                Err(StoreError::SlugTaken) => {
                    tracing::debug!(attempt, "pulse slug collision; regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::SlugExhausted {
            attempts: self.slug_max_attempts,
        })
    }

    /// Create a pulse and start its dispatch in the background.
    ///
    /// Returns as soon as the pulse is stored; the handle resolves to the
    /// dispatch report once every slot has an outcome.
    ///
    /// # Errors
    ///
    /// See [`PulseService::create_pulse`].
    pub async fn launch(
        &self,
        request: &CreatePulse,
    ) -> Result<(Pulse, JoinHandle<DispatchReport>), EngineError> {
        let (pulse, dispatch) = self.create_pulse(request).await?;
        let gateway = Arc::clone(&self.gateway);
        let dispatched = pulse.clone();
        let handle = tokio::spawn(async move { gateway.dispatch(&dispatched, &dispatch).await });
        Ok((pulse, handle))
    }
}

impl std::fmt::Debug for PulseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PulseService")
            .field("slug_length", &self.slug_length)
            .field("slug_max_attempts", &self.slug_max_attempts)
            .finish_non_exhaustive()
    }
}
