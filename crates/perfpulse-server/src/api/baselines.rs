//! `GET /api/v1/baselines/{target_slug}?url=` : current baseline for one
//! target url plus its most recent statistics.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use perfpulse_core::{Baseline, Statistic};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::targets::{canonical_url_or_validation_error, resolve_target};
use super::{map_db_error, map_store_error, ApiError, ApiResponse, AppState};

const DEFAULT_HISTORY: i64 = 10;
const MAX_HISTORY: i64 = 100;

#[derive(Debug, Deserialize)]
pub(super) struct BaselineQuery {
    pub url: String,
    pub history: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct BaselineView {
    pub target: String,
    pub url: String,
    pub baseline: Baseline,
    /// Newest first.
    pub recent: Vec<Statistic>,
}

pub(super) async fn get_baseline(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(target_slug): Path<String>,
    Query(params): Query<BaselineQuery>,
) -> Result<Json<ApiResponse<BaselineView>>, ApiError> {
    let rid = &req_id.0;
    let canonical = canonical_url_or_validation_error(rid, &params.url)?;
    let target = resolve_target(&state.pool, &target_slug, rid).await?;

    let url = perfpulse_db::get_target_url(&state.pool, target.id, &canonical)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| {
            ApiError::new(
                rid,
                "not_found",
                format!("url '{canonical}' is not registered for target '{target_slug}'"),
            )
        })?;

    let baseline = state
        .engine
        .store
        .baseline(target.id, url.id)
        .await
        .map_err(|e| map_store_error(rid.clone(), &e))?
        .ok_or_else(|| {
            ApiError::new(
                rid,
                "not_found",
                format!("no baseline yet for '{canonical}'"),
            )
        })?;

    let history = params.history.unwrap_or(DEFAULT_HISTORY).clamp(1, MAX_HISTORY);
    let recent = perfpulse_db::list_recent_statistics(&state.pool, target.id, url.id, history)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(ApiResponse::new(
        BaselineView {
            target: target.slug,
            url: url.url,
            baseline,
            recent,
        },
        req_id.0,
    ))
}
