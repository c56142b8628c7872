//! Heartbeat Aggregator: folds worker reports into their pulse and decides
//! when the pulse is done.

use std::sync::Arc;

use chrono::Utc;
use perfpulse_core::{
    BaselinePolicy, Classification, HeartbeatPayload, Pulse, PulseEvent, PulseStatus,
};

use crate::finalize::finalize;
use crate::notify::Notifier;
use crate::{PulseStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    PulseNotFound,
    /// The pulse had already reached this terminal status; the heartbeat was
    /// kept as `late`.
    PulseTerminal(PulseStatus),
    /// The slot is not one the pulse was dispatched to.
    UnknownSlot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Accepted {
        accepted: usize,
        expected: usize,
        /// Terminal status reached by this heartbeat, if it completed the pulse.
        terminal: Option<PulseStatus>,
        classification: Option<Classification>,
    },
    /// The slot had already reported; nothing changed.
    Duplicate,
    Rejected(Rejection),
}

#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn PulseStore>,
    notifier: Notifier,
    policy: BaselinePolicy,
}

impl Aggregator {
    #[must_use]
    pub fn new(store: Arc<dyn PulseStore>, notifier: Notifier, policy: BaselinePolicy) -> Self {
        Self {
            store,
            notifier,
            policy,
        }
    }

    /// Ingest one worker report.
    ///
    /// Duplicates and stragglers are absorbed without side effects on
    /// aggregate state. Only the caller whose heartbeat wins the completing
    /// transition finalizes the pulse.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store fails. A failed finalize is logged
    /// and does not fail the ingest; the reaper records the statistic later.
    pub async fn ingest(
        &self,
        pulse_slug: &str,
        slot_id: &str,
        payload: &HeartbeatPayload,
    ) -> Result<IngestOutcome, StoreError> {
        let Some(pulse) = self.store.get_pulse_by_slug(pulse_slug).await? else {
            return Ok(IngestOutcome::Rejected(Rejection::PulseNotFound));
        };

        if !pulse.expects_slot(slot_id) {
            tracing::warn!(pulse = %pulse.slug, slot = slot_id, "heartbeat for unknown slot");
            return Ok(IngestOutcome::Rejected(Rejection::UnknownSlot));
        }

        if pulse.status.is_terminal() {
            self.store
                .insert_late_heartbeat(pulse.id, slot_id, payload)
                .await?;
            tracing::info!(
                pulse = %pulse.slug,
                slot = slot_id,
                status = %pulse.status,
                "late heartbeat recorded"
            );
            return Ok(IngestOutcome::Rejected(Rejection::PulseTerminal(
                pulse.status,
            )));
        }

        if self
            .store
            .insert_accepted_heartbeat(pulse.id, slot_id, payload)
            .await?
            .is_none()
        {
            tracing::debug!(pulse = %pulse.slug, slot = slot_id, "duplicate heartbeat");
            return Ok(IngestOutcome::Duplicate);
        }

        self.store
            .transition(pulse.id, &[PulseStatus::Pending], PulseStatus::InProgress)
            .await?;

        let accepted_heartbeats = self.store.accepted_heartbeats(pulse.id).await?;
        let accepted = accepted_heartbeats.len();
        let expected = pulse.expected_count();

        self.notifier
            .emit(PulseEvent::HeartbeatReceived {
                slug: pulse.slug.clone(),
                slot_id: slot_id.to_owned(),
                accepted,
                expected,
                at: Utc::now(),
            })
            .await;

        if accepted < expected {
            return Ok(IngestOutcome::Accepted {
                accepted,
                expected,
                terminal: None,
                classification: None,
            });
        }

        let target = if accepted_heartbeats.iter().any(|h| h.payload.is_failure()) {
            PulseStatus::PartialFailure
        } else {
            PulseStatus::Completed
        };

        let won = self
            .store
            .transition(pulse.id, &[PulseStatus::InProgress], target)
            .await?;
        if !won {
            return Ok(IngestOutcome::Accepted {
                accepted,
                expected,
                terminal: None,
                classification: None,
            });
        }

        let classification = if target == PulseStatus::Completed {
            self.finalize_completed(&pulse).await
        } else {
            tracing::warn!(pulse = %pulse.slug, "pulse finished with failed slots");
            None
        };

        self.notifier
            .emit(PulseEvent::PulseCompleted {
                slug: pulse.slug.clone(),
                status: target,
                classification,
                at: Utc::now(),
            })
            .await;

        Ok(IngestOutcome::Accepted {
            accepted,
            expected,
            terminal: Some(target),
            classification,
        })
    }

    async fn finalize_completed(&self, pulse: &Pulse) -> Option<Classification> {
        match finalize(self.store.as_ref(), pulse, &self.policy).await {
            Ok(stat) => stat.map(|s| s.comparison.overall),
            Err(e) => {
                tracing::error!(pulse = %pulse.slug, error = %e, "finalize failed");
                None
            }
        }
    }
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
