//! Lifecycle events published for real-time consumers.
//!
//! Events are change signals, not an ordered log: consumers are expected to
//! re-fetch the pulse by slug when one arrives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::baseline::Classification;
use crate::pulse::PulseStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PulseEvent {
    PulseCreated {
        slug: String,
        playlist_id: String,
        expected_slots: usize,
        at: DateTime<Utc>,
    },
    HeartbeatReceived {
        slug: String,
        slot_id: String,
        accepted: usize,
        expected: usize,
        at: DateTime<Utc>,
    },
    PulseCompleted {
        slug: String,
        status: PulseStatus,
        classification: Option<Classification>,
        at: DateTime<Utc>,
    },
    PulseTimedOut {
        slug: String,
        at: DateTime<Utc>,
    },
}

impl PulseEvent {
    #[must_use]
    pub fn slug(&self) -> &str {
        match self {
            PulseEvent::PulseCreated { slug, .. }
            | PulseEvent::HeartbeatReceived { slug, .. }
            | PulseEvent::PulseCompleted { slug, .. }
            | PulseEvent::PulseTimedOut { slug, .. } => slug,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            PulseEvent::PulseCreated { .. } => "pulse_created",
            PulseEvent::HeartbeatReceived { .. } => "heartbeat_received",
            PulseEvent::PulseCompleted { .. } => "pulse_completed",
            PulseEvent::PulseTimedOut { .. } => "pulse_timed_out",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_type_tag() {
        let event = PulseEvent::PulseCompleted {
            slug: "abc123xyz789".to_string(),
            status: PulseStatus::Completed,
            classification: Some(Classification::Regression),
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], event.kind());
        assert_eq!(json["slug"], "abc123xyz789");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["classification"], "regression");
    }
}
