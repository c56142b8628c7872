//! Pulse and heartbeat domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metrics::MetricVector;
use crate::CoreError;

/// Lifecycle status of a pulse.
///
/// Legal moves: `Pending -> InProgress`, `InProgress -> {Completed,
/// PartialFailure, TimedOut}` and `Pending -> TimedOut`. Terminal states
/// never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PulseStatus {
    Pending,
    InProgress,
    Completed,
    PartialFailure,
    TimedOut,
}

impl PulseStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PulseStatus::Pending => "pending",
            PulseStatus::InProgress => "in_progress",
            PulseStatus::Completed => "completed",
            PulseStatus::PartialFailure => "partial_failure",
            PulseStatus::TimedOut => "timed_out",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PulseStatus::Completed | PulseStatus::PartialFailure | PulseStatus::TimedOut
        )
    }

    #[must_use]
    pub fn can_transition_to(self, next: PulseStatus) -> bool {
        matches!(
            (self, next),
            (PulseStatus::Pending, PulseStatus::InProgress | PulseStatus::TimedOut)
                | (
                    PulseStatus::InProgress,
                    PulseStatus::Completed | PulseStatus::PartialFailure | PulseStatus::TimedOut
                )
        )
    }
}

impl std::fmt::Display for PulseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PulseStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PulseStatus::Pending),
            "in_progress" => Ok(PulseStatus::InProgress),
            "completed" => Ok(PulseStatus::Completed),
            "partial_failure" => Ok(PulseStatus::PartialFailure),
            "timed_out" => Ok(PulseStatus::TimedOut),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pulse {
    pub id: i64,
    pub slug: String,
    pub target_id: i64,
    pub url_id: i64,
    pub playlist_id: String,
    /// Slot ids that must each report once. Fixed at creation.
    pub expected_slots: Vec<String>,
    pub status: PulseStatus,
    pub requested_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Pulse {
    #[must_use]
    pub fn expected_count(&self) -> usize {
        self.expected_slots.len()
    }

    #[must_use]
    pub fn expects_slot(&self, slot_id: &str) -> bool {
        self.expected_slots.iter().any(|s| s == slot_id)
    }
}

/// Fields supplied when a pulse is created; the store assigns id and slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPulse {
    pub target_id: i64,
    pub url_id: i64,
    pub playlist_id: String,
    pub expected_slots: Vec<String>,
    pub requested_by: Option<Uuid>,
}

pub const DEFAULT_PULSE_PAGE_SIZE: i64 = 50;
pub const MAX_PULSE_PAGE_SIZE: i64 = 200;

/// Newest-first pulse listing. `cursor` is the id of the last pulse seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulseFilter {
    pub target_id: Option<i64>,
    pub status: Option<PulseStatus>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub cursor: Option<i64>,
    pub limit: i64,
}

impl Default for PulseFilter {
    fn default() -> Self {
        Self {
            target_id: None,
            status: None,
            created_from: None,
            created_to: None,
            cursor: None,
            limit: DEFAULT_PULSE_PAGE_SIZE,
        }
    }
}

impl PulseFilter {
    /// Limit clamped to `1..=MAX_PULSE_PAGE_SIZE`.
    #[must_use]
    pub fn effective_limit(&self) -> i64 {
        self.limit.clamp(1, MAX_PULSE_PAGE_SIZE)
    }

    #[must_use]
    pub fn matches(&self, pulse: &Pulse) -> bool {
        self.target_id.is_none_or(|t| pulse.target_id == t)
            && self.status.is_none_or(|s| pulse.status == s)
            && self.created_from.is_none_or(|from| pulse.created_at >= from)
            && self.created_to.is_none_or(|to| pulse.created_at <= to)
            && self.cursor.is_none_or(|c| pulse.id < c)
    }
}

/// What one worker reported for its slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "WorkerReport")]
pub struct HeartbeatPayload {
    #[serde(default)]
    pub metrics: MetricVector,
    /// Set when the worker ran but could not produce a measurement.
    #[serde(default)]
    pub error: Option<String>,
    /// Untouched worker output, retained for audit.
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Wire shape of a worker report before its readings are typed.
#[derive(Deserialize)]
struct WorkerReport {
    #[serde(default)]
    metrics: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    raw: serde_json::Value,
}

impl From<WorkerReport> for HeartbeatPayload {
    /// Readings the metric set cannot hold are kept under `raw.metrics` when
    /// the worker sent no `raw` of its own.
    fn from(report: WorkerReport) -> Self {
        let metrics = MetricVector::from_readings(&report.metrics);
        let raw = if report.raw.is_null() && !metrics.covers(&report.metrics) {
            let mut raw = serde_json::Map::new();
            raw.insert(
                "metrics".to_owned(),
                serde_json::Value::Object(report.metrics),
            );
            serde_json::Value::Object(raw)
        } else {
            report.raw
        };
        Self {
            metrics,
            error: report.error,
            raw,
        }
    }
}

impl HeartbeatPayload {
    /// A slot failed when the worker reported an error or produced nothing usable.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.error.is_some() || self.metrics.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatDisposition {
    /// Counted toward completion.
    Accepted,
    /// Arrived after the pulse reached a terminal state; audit only.
    Late,
}

impl HeartbeatDisposition {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            HeartbeatDisposition::Accepted => "accepted",
            HeartbeatDisposition::Late => "late",
        }
    }
}

impl std::str::FromStr for HeartbeatDisposition {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(HeartbeatDisposition::Accepted),
            "late" => Ok(HeartbeatDisposition::Late),
            other => Err(CoreError::UnknownDisposition(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub id: i64,
    pub pulse_id: i64,
    pub slot_id: String,
    pub payload: HeartbeatPayload,
    pub disposition: HeartbeatDisposition,
    pub received_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metric;

    const ALL: [PulseStatus; 5] = [
        PulseStatus::Pending,
        PulseStatus::InProgress,
        PulseStatus::Completed,
        PulseStatus::PartialFailure,
        PulseStatus::TimedOut,
    ];

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        for from in ALL.iter().copied().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(
                    !from.can_transition_to(to),
                    "{from} must not transition to {to}"
                );
            }
        }
    }

    #[test]
    fn filter_limit_is_clamped() {
        let mut filter = PulseFilter {
            limit: 0,
            ..PulseFilter::default()
        };
        assert_eq!(filter.effective_limit(), 1);
        filter.limit = 10_000;
        assert_eq!(filter.effective_limit(), MAX_PULSE_PAGE_SIZE);
    }

    #[test]
    fn pending_cannot_skip_to_completed() {
        assert!(!PulseStatus::Pending.can_transition_to(PulseStatus::Completed));
        assert!(!PulseStatus::Pending.can_transition_to(PulseStatus::PartialFailure));
        assert!(PulseStatus::Pending.can_transition_to(PulseStatus::InProgress));
        assert!(PulseStatus::Pending.can_transition_to(PulseStatus::TimedOut));
    }

    #[test]
    fn status_string_form_round_trips() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<PulseStatus>().unwrap(), status);
        }
        assert!("done".parse::<PulseStatus>().is_err());
    }

    #[test]
    fn payload_without_metrics_is_a_failure() {
        let empty = HeartbeatPayload::default();
        assert!(empty.is_failure());

        let measured = HeartbeatPayload {
            metrics: MetricVector::new().with(Metric::Lcp, 1800.0),
            ..HeartbeatPayload::default()
        };
        assert!(!measured.is_failure());

        let errored = HeartbeatPayload {
            error: Some("chrome crashed".to_string()),
            ..measured
        };
        assert!(errored.is_failure());
    }

    #[test]
    fn payload_deserializes_with_defaults() {
        let payload: HeartbeatPayload =
            serde_json::from_str(r#"{"metrics":{"lcp":2100.5,"cls":0.02}}"#).expect("parse");
        assert_eq!(payload.metrics.get(Metric::Lcp), Some(2100.5));
        assert!(payload.error.is_none());
        assert!(payload.raw.is_null());
    }

    #[test]
    fn payload_keeps_unreadable_metrics_in_raw() {
        let payload: HeartbeatPayload =
            serde_json::from_str(r#"{"metrics":{"lcp":2100.5,"inp":null,"fid":12.0}}"#)
                .expect("parse");
        assert_eq!(payload.metrics.len(), 1);
        assert_eq!(payload.metrics.get(Metric::Lcp), Some(2100.5));
        assert!(!payload.is_failure());
        assert_eq!(payload.raw["metrics"]["fid"], 12.0);
        assert!(payload.raw["metrics"]["inp"].is_null());
    }

    #[test]
    fn payload_prefers_the_workers_own_raw() {
        let payload: HeartbeatPayload = serde_json::from_str(
            r#"{"metrics":{"lcp":1900.0,"tti":4100.0},"raw":{"lighthouse":"12.1"}}"#,
        )
        .expect("parse");
        assert_eq!(payload.raw["lighthouse"], "12.1");
        assert!(payload.raw.get("metrics").is_none());
    }

    #[test]
    fn payload_survives_a_storage_round_trip() {
        let payload: HeartbeatPayload =
            serde_json::from_str(r#"{"metrics":{"cls":0.02,"fid":9.0},"error":null}"#)
                .expect("parse");
        let stored = serde_json::to_value(&payload).expect("serialize");
        let back: HeartbeatPayload = serde_json::from_value(stored).expect("deserialize");
        assert_eq!(back, payload);
    }
}
