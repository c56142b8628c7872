use perfpulse_core::{
    BaselinePolicy, Heartbeat, HeartbeatDisposition, MetricVector, Pulse, Statistic,
};

use crate::{PulseStore, StoreError};

/// Per-metric median across the accepted heartbeats of a pulse.
#[must_use]
pub fn aggregate_heartbeats(heartbeats: &[Heartbeat]) -> MetricVector {
    MetricVector::median_of(
        heartbeats
            .iter()
            .filter(|h| h.disposition == HeartbeatDisposition::Accepted)
            .map(|h| &h.payload.metrics),
    )
}

/// Compute the pulse's aggregate, fold it into the baseline and record the
/// statistic.
///
/// Must only be called by the caller that won the `InProgress -> Completed`
/// transition. Returns `None` when another finalize already recorded this
/// pulse.
///
/// # Errors
///
/// Returns [`StoreError`] if the store fails; nothing is written in that case.
pub async fn finalize(
    store: &dyn PulseStore,
    pulse: &Pulse,
    policy: &BaselinePolicy,
) -> Result<Option<Statistic>, StoreError> {
    let heartbeats = store.accepted_heartbeats(pulse.id).await?;
    let metrics = aggregate_heartbeats(&heartbeats);

    let statistic = store.finalize(pulse, &metrics, policy).await?;
    match &statistic {
        Some(stat) => tracing::info!(
            pulse = %pulse.slug,
            classification = %stat.comparison.overall,
            seeded = stat.seeded_baseline,
            "pulse finalized"
        ),
        None => tracing::debug!(pulse = %pulse.slug, "pulse already finalized"),
    }
    Ok(statistic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use perfpulse_core::{HeartbeatPayload, Metric};

    fn heartbeat(slot: &str, lcp: f64, disposition: HeartbeatDisposition) -> Heartbeat {
        Heartbeat {
            id: 0,
            pulse_id: 1,
            slot_id: slot.to_string(),
            payload: HeartbeatPayload {
                metrics: MetricVector::new().with(Metric::Lcp, lcp),
                ..HeartbeatPayload::default()
            },
            disposition,
            received_at: Utc::now(),
        }
    }

    #[test]
    fn aggregate_is_the_median_of_accepted_slots() {
        let beats = vec![
            heartbeat("a", 1000.0, HeartbeatDisposition::Accepted),
            heartbeat("b", 3000.0, HeartbeatDisposition::Accepted),
            heartbeat("c", 2000.0, HeartbeatDisposition::Accepted),
            heartbeat("a", 90_000.0, HeartbeatDisposition::Late),
        ];
        assert_eq!(aggregate_heartbeats(&beats).get(Metric::Lcp), Some(2000.0));
    }
}
