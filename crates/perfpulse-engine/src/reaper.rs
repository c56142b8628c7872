//! Reaper: times out pulses that stopped making progress and finalizes
//! completed pulses whose statistic was never recorded.
//!
//! The reaper and the aggregator race through the same conditional
//! transition, so whichever moves a pulse first wins and the other is a
//! no-op. Finalize is idempotent per pulse, so a repair that overlaps a
//! late in-flight finalize records one statistic.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use perfpulse_core::{BaselinePolicy, PulseEvent, PulseStatus};

use crate::clock::Clock;
use crate::finalize::finalize;
use crate::notify::Notifier;
use crate::{PulseStore, StoreError};

const BATCH_SIZE: i64 = 500;

// Completed pulses younger than this are left to the heartbeat that
// completed them.
const REPAIR_GRACE_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub scanned: usize,
    pub timed_out: usize,
    /// Pulses that finished on their own between the scan and the transition.
    pub lost_races: usize,
    /// Completed pulses whose missing statistic this sweep recorded.
    pub repaired: usize,
    /// Pulses the store failed on; retried on the next sweep.
    pub failed: usize,
}

#[derive(Clone)]
pub struct Reaper {
    store: Arc<dyn PulseStore>,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
    timeout: chrono::Duration,
    policy: BaselinePolicy,
}

impl Reaper {
    #[must_use]
    pub fn new(
        store: Arc<dyn PulseStore>,
        notifier: Notifier,
        clock: Arc<dyn Clock>,
        timeout: chrono::Duration,
        policy: BaselinePolicy,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            timeout,
            policy,
        }
    }

    /// Sweep using the reaper's clock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a scan fails.
    pub async fn run_once(&self) -> Result<ReapReport, StoreError> {
        self.sweep(self.clock.now()).await
    }

    /// Time out every non-terminal pulse created more than the timeout
    /// before `now`, then finalize completed pulses left without a
    /// statistic, up to one batch each.
    ///
    /// A store failure on one pulse is logged and counted in
    /// [`ReapReport::failed`]; the rest of the batch is still swept.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a scan fails.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<ReapReport, StoreError> {
        let stale = self.store.list_stale(now - self.timeout, BATCH_SIZE).await?;
        let unfinalized = self
            .store
            .list_unfinalized(now - chrono::Duration::seconds(REPAIR_GRACE_SECS), BATCH_SIZE)
            .await?;

        let mut report = ReapReport {
            scanned: stale.len() + unfinalized.len(),
            ..ReapReport::default()
        };

        for pulse in stale {
            let won = match self
                .store
                .transition(
                    pulse.id,
                    &[PulseStatus::Pending, PulseStatus::InProgress],
                    PulseStatus::TimedOut,
                )
                .await
            {
                Ok(won) => won,
                Err(e) => {
                    tracing::error!(pulse = %pulse.slug, error = %e, "failed to time out pulse");
                    report.failed += 1;
                    continue;
                }
            };
            if !won {
                report.lost_races += 1;
                continue;
            }

            report.timed_out += 1;
            tracing::info!(pulse = %pulse.slug, created_at = %pulse.created_at, "pulse timed out");
            self.notifier
                .emit(PulseEvent::PulseTimedOut {
                    slug: pulse.slug,
                    at: now,
                })
                .await;
        }

        for pulse in unfinalized {
            match finalize(self.store.as_ref(), &pulse, &self.policy).await {
                Ok(Some(stat)) => {
                    report.repaired += 1;
                    tracing::warn!(pulse = %pulse.slug, "recorded missing statistic");
                    self.notifier
                        .emit(PulseEvent::PulseCompleted {
                            slug: pulse.slug,
                            status: PulseStatus::Completed,
                            classification: Some(stat.comparison.overall),
                            at: now,
                        })
                        .await;
                }
                Ok(None) => report.lost_races += 1,
                Err(e) => {
                    tracing::error!(pulse = %pulse.slug, error = %e, "failed to finalize pulse");
                    report.failed += 1;
                }
            }
        }

        if report.scanned > 0 {
            tracing::info!(
                scanned = report.scanned,
                timed_out = report.timed_out,
                repaired = report.repaired,
                lost_races = report.lost_races,
                failed = report.failed,
                "reaper sweep finished"
            );
        }
        Ok(report)
    }
}

impl std::fmt::Debug for Reaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaper")
            .field("timeout", &self.timeout)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
