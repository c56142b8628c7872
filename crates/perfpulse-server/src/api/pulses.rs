//! Pulse handlers.
//!
//! - `POST /api/v1/pulses`         create and dispatch (202)
//! - `GET  /api/v1/pulses`         cursor-paginated listing, newest first
//! - `GET  /api/v1/pulses/{slug}`  status, heartbeats and statistic

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use perfpulse_core::{Heartbeat, HeartbeatDisposition, Pulse, PulseFilter, PulseStatus, Statistic};
use perfpulse_engine::CreatePulse;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::targets::{canonical_url_or_validation_error, resolve_target};
use super::{
    map_db_error, map_engine_error, map_store_error, normalize_limit, ApiError, ApiResponse,
    AppState,
};

#[derive(Debug, Deserialize)]
pub(super) struct CreatePulseRequest {
    /// Target slug.
    pub target: String,
    pub url: String,
    pub playlist_id: String,
    #[serde(default)]
    pub flags: Vec<String>,
    pub requested_by: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ListPulsesQuery {
    pub target: Option<String>,
    pub status: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub cursor: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct PaginatedPulses {
    pub items: Vec<Pulse>,
    pub next_cursor: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct PulseDetail {
    #[serde(flatten)]
    pub pulse: Pulse,
    pub accepted: usize,
    pub expected: usize,
    /// Every heartbeat in arrival order, `late` ones included.
    pub heartbeats: Vec<Heartbeat>,
    pub statistic: Option<Statistic>,
}

/// POST /api/v1/pulses
///
/// Responds once the pulse is stored; workers are invoked in the background.
pub(super) async fn create_pulse(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreatePulseRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Pulse>>), ApiError> {
    let rid = &req_id.0;

    if state.engine.pulses.playlists().find(&body.playlist_id).is_none() {
        return Err(ApiError::new(
            rid,
            "unprocessable",
            format!("unknown playlist '{}'", body.playlist_id),
        ));
    }
    let canonical = canonical_url_or_validation_error(rid, &body.url)?;

    let target = resolve_target(&state.pool, &body.target, rid).await?;
    let url = perfpulse_db::get_target_url(&state.pool, target.id, &canonical)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| {
            ApiError::new(
                rid,
                "unprocessable",
                format!("url '{canonical}' is not registered for target '{}'", target.slug),
            )
        })?;

    let request = CreatePulse {
        target_id: target.id,
        target_slug: target.slug,
        url_id: url.id,
        url: url.url,
        playlist_id: body.playlist_id,
        flags: body.flags,
        requested_by: body.requested_by,
    };

    let (pulse, dispatch) = state
        .engine
        .pulses
        .launch(&request)
        .await
        .map_err(|e| map_engine_error(rid.clone(), &e))?;

    let slug = pulse.slug.clone();
    tokio::spawn(async move {
        if let Err(e) = dispatch.await {
            tracing::error!(pulse = %slug, error = %e, "dispatch task aborted");
        }
    });

    Ok((StatusCode::ACCEPTED, ApiResponse::new(pulse, req_id.0)))
}

/// GET /api/v1/pulses
pub(super) async fn list_pulses(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(params): Query<ListPulsesQuery>,
) -> Result<Json<ApiResponse<PaginatedPulses>>, ApiError> {
    let rid = &req_id.0;

    let status = params
        .status
        .as_deref()
        .map(str::parse::<PulseStatus>)
        .transpose()
        .map_err(|e| ApiError::new(rid, "validation_error", e.to_string()))?;

    let target_id = match params.target.as_deref() {
        Some(slug) => Some(resolve_target(&state.pool, slug, rid).await?.id),
        None => None,
    };

    let limit = normalize_limit(params.limit);
    let filter = PulseFilter {
        target_id,
        status,
        created_from: params.from,
        created_to: params.to,
        cursor: params.cursor,
        limit,
    };

    let items = state
        .engine
        .store
        .list_pulses(&filter)
        .await
        .map_err(|e| map_store_error(rid.clone(), &e))?;

    let next_cursor = if i64::try_from(items.len()).unwrap_or(i64::MAX) >= limit {
        items.last().map(|p| p.id)
    } else {
        None
    };

    Ok(ApiResponse::new(
        PaginatedPulses { items, next_cursor },
        req_id.0,
    ))
}

/// GET /api/v1/pulses/{slug}
pub(super) async fn get_pulse(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<PulseDetail>>, ApiError> {
    let rid = &req_id.0;
    let store = &state.engine.store;

    let pulse = store
        .get_pulse_by_slug(&slug)
        .await
        .map_err(|e| map_store_error(rid.clone(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", format!("pulse '{slug}' not found")))?;

    let heartbeats = store
        .heartbeats(pulse.id)
        .await
        .map_err(|e| map_store_error(rid.clone(), &e))?;
    let statistic = store
        .statistic_for_pulse(pulse.id)
        .await
        .map_err(|e| map_store_error(rid.clone(), &e))?;

    let accepted = heartbeats
        .iter()
        .filter(|h| h.disposition == HeartbeatDisposition::Accepted)
        .count();

    Ok(ApiResponse::new(
        PulseDetail {
            expected: pulse.expected_count(),
            pulse,
            accepted,
            heartbeats,
            statistic,
        },
        req_id.0,
    ))
}
