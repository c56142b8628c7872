//! Dispatch Gateway: fans a pulse out into one worker invocation per slot.
//!
//! Dispatch never waits for a worker to finish. Each slot ends in one of
//! three outcomes and none of them fails the pulse; slots that never report
//! back are left for the reaper.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use perfpulse_core::{MembershipPolicy, Pulse, Slot};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::StoreError;

/// Body sent to a worker for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchPayload {
    pub pulse_slug: String,
    pub url: String,
    pub target_slug: String,
    pub slot: Slot,
    pub flags: Vec<String>,
    pub account_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The worker acknowledged the invocation.
    Dispatched,
    /// The invocation definitely did not start.
    Failed(String),
    /// Sent, but no acknowledgement arrived in time.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotDispatch {
    pub slot_id: String,
    pub outcome: DispatchOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub pulse_slug: String,
    pub slots: Vec<SlotDispatch>,
}

impl DispatchReport {
    fn count(&self, pred: impl Fn(&DispatchOutcome) -> bool) -> usize {
        self.slots.iter().filter(|s| pred(&s.outcome)).count()
    }

    #[must_use]
    pub fn dispatched(&self) -> usize {
        self.count(|o| matches!(o, DispatchOutcome::Dispatched))
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DispatchOutcome::Failed(_)))
    }

    #[must_use]
    pub fn unknown(&self) -> usize {
        self.count(|o| matches!(o, DispatchOutcome::Unknown))
    }
}

/// The capability that starts a worker for one slot.
#[async_trait]
pub trait WorkerInvoker: Send + Sync {
    async fn invoke(&self, payload: &DispatchPayload) -> DispatchOutcome;
}

/// Resolves which account a requester's pulses are attributed to.
#[async_trait]
pub trait MembershipResolver: Send + Sync {
    async fn account_for(&self, user_id: Uuid) -> Result<Option<Uuid>, StoreError>;
}

/// [`MembershipResolver`] reading the `memberships` table.
#[derive(Debug, Clone)]
pub struct PgMembershipResolver {
    pool: PgPool,
    policy: MembershipPolicy,
}

impl PgMembershipResolver {
    #[must_use]
    pub fn new(pool: PgPool, policy: MembershipPolicy) -> Self {
        Self { pool, policy }
    }
}

#[async_trait]
impl MembershipResolver for PgMembershipResolver {
    async fn account_for(&self, user_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        Ok(perfpulse_db::resolve_account_id(&self.pool, user_id, self.policy).await?)
    }
}

/// Everything a dispatch needs besides the pulse itself.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub url: String,
    pub target_slug: String,
    pub slots: Vec<Slot>,
    pub flags: Vec<String>,
    pub requested_by: Option<Uuid>,
}

pub struct DispatchGateway {
    invoker: Arc<dyn WorkerInvoker>,
    memberships: Arc<dyn MembershipResolver>,
    concurrency: usize,
}

impl DispatchGateway {
    #[must_use]
    pub fn new(
        invoker: Arc<dyn WorkerInvoker>,
        memberships: Arc<dyn MembershipResolver>,
        concurrency: usize,
    ) -> Self {
        Self {
            invoker,
            memberships,
            concurrency: concurrency.max(1),
        }
    }

    /// Invoke one worker per slot with bounded concurrency.
    ///
    /// Slot order in the report follows completion, not the playlist.
    pub async fn dispatch(&self, pulse: &Pulse, request: &DispatchRequest) -> DispatchReport {
        let account_id = match request.requested_by {
            Some(user_id) => match self.memberships.account_for(user_id).await {
                Ok(account) => account,
                Err(e) => {
                    tracing::warn!(
                        pulse = %pulse.slug,
                        %user_id,
                        error = %e,
                        "membership lookup failed; dispatching without account"
                    );
                    None
                }
            },
            None => None,
        };

        let payloads: Vec<DispatchPayload> = request
            .slots
            .iter()
            .map(|slot| DispatchPayload {
                pulse_slug: pulse.slug.clone(),
                url: request.url.clone(),
                target_slug: request.target_slug.clone(),
                slot: slot.clone(),
                flags: request.flags.clone(),
                account_id,
            })
            .collect();

        let slots: Vec<SlotDispatch> = stream::iter(payloads)
            .map(|payload| async move {
                let outcome = self.invoker.invoke(&payload).await;
                match &outcome {
                    DispatchOutcome::Dispatched => {
                        tracing::debug!(
                            pulse = %payload.pulse_slug,
                            slot = %payload.slot.id,
                            "slot dispatched"
                        );
                    }
                    DispatchOutcome::Failed(reason) => {
                        tracing::warn!(
                            pulse = %payload.pulse_slug,
                            slot = %payload.slot.id,
                            reason = %reason,
                            "slot dispatch failed"
                        );
                    }
                    DispatchOutcome::Unknown => {
                        tracing::warn!(
                            pulse = %payload.pulse_slug,
                            slot = %payload.slot.id,
                            "slot dispatch unacknowledged"
                        );
                    }
                }
                SlotDispatch {
                    slot_id: payload.slot.id,
                    outcome,
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let report = DispatchReport {
            pulse_slug: pulse.slug.clone(),
            slots,
        };
        tracing::info!(
            pulse = %pulse.slug,
            dispatched = report.dispatched(),
            failed = report.failed(),
            unknown = report.unknown(),
            "dispatch finished"
        );
        report
    }
}

impl std::fmt::Debug for DispatchGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchGateway")
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}
