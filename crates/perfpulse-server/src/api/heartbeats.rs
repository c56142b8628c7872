//! `POST /api/v1/pulses/{slug}/heartbeats` : one worker report.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use perfpulse_core::{Classification, HeartbeatPayload, PulseStatus};
use perfpulse_engine::{IngestOutcome, Rejection};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_store_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct HeartbeatRequest {
    pub slot_id: String,
    #[serde(flatten)]
    pub payload: HeartbeatPayload,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(super) enum HeartbeatAck {
    Accepted {
        accepted: usize,
        expected: usize,
        terminal: Option<PulseStatus>,
        classification: Option<Classification>,
    },
    Duplicate,
}

pub(super) async fn post_heartbeat(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(slug): Path<String>,
    Json(body): Json<HeartbeatRequest>,
) -> Result<Json<ApiResponse<HeartbeatAck>>, ApiError> {
    let rid = &req_id.0;

    if body.slot_id.trim().is_empty() {
        return Err(ApiError::new(rid, "validation_error", "slot_id is required"));
    }

    let outcome = state
        .engine
        .aggregator
        .ingest(&slug, &body.slot_id, &body.payload)
        .await
        .map_err(|e| map_store_error(rid.clone(), &e))?;

    let ack = match outcome {
        IngestOutcome::Accepted {
            accepted,
            expected,
            terminal,
            classification,
        } => HeartbeatAck::Accepted {
            accepted,
            expected,
            terminal,
            classification,
        },
        IngestOutcome::Duplicate => HeartbeatAck::Duplicate,
        IngestOutcome::Rejected(Rejection::PulseNotFound) => {
            return Err(ApiError::new(
                rid,
                "not_found",
                format!("pulse '{slug}' not found"),
            ));
        }
        IngestOutcome::Rejected(Rejection::PulseTerminal(status)) => {
            return Err(ApiError::new(
                rid,
                "conflict",
                format!("pulse '{slug}' is already {status}; heartbeat recorded as late"),
            ));
        }
        IngestOutcome::Rejected(Rejection::UnknownSlot) => {
            return Err(ApiError::new(
                rid,
                "unprocessable",
                format!("slot '{}' is not expected by pulse '{slug}'", body.slot_id),
            ));
        }
    };

    Ok(ApiResponse::new(ack, req_id.0))
}
