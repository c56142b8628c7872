//! Target handlers.
//!
//! - `POST   /api/v1/targets`              create a target, optionally with urls
//! - `GET    /api/v1/targets/{slug}`       target with its urls
//! - `DELETE /api/v1/targets/{slug}`       soft delete
//! - `POST   /api/v1/targets/{slug}/urls`  attach a url (canonicalized)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use perfpulse_db::{DbError, TargetRow, UrlRow};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState};

const MAX_NAME_LEN: usize = 200;

#[derive(Debug, Deserialize)]
pub(super) struct CreateTargetRequest {
    pub name: String,
    /// Derived from `name` when absent.
    pub slug: Option<String>,
    pub stage: String,
    pub provider: String,
    #[serde(default)]
    pub urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct AttachUrlRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub(super) struct TargetItem {
    pub public_id: Uuid,
    pub slug: String,
    pub name: String,
    pub stage: String,
    pub provider: String,
    pub created_at: DateTime<Utc>,
    pub urls: Vec<UrlItem>,
}

#[derive(Debug, Serialize)]
pub(super) struct UrlItem {
    pub id: i64,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl From<UrlRow> for UrlItem {
    fn from(row: UrlRow) -> Self {
        Self {
            id: row.id,
            url: row.url,
            created_at: row.created_at,
        }
    }
}

impl TargetItem {
    fn new(row: TargetRow, urls: Vec<UrlRow>) -> Self {
        Self {
            public_id: row.public_id,
            slug: row.slug,
            name: row.name,
            stage: row.stage,
            provider: row.provider,
            created_at: row.created_at,
            urls: urls.into_iter().map(UrlItem::from).collect(),
        }
    }
}

/// Resolve a live target slug, returning 404 if missing or soft-deleted.
pub(super) async fn resolve_target(
    pool: &sqlx::PgPool,
    slug: &str,
    request_id: &str,
) -> Result<TargetRow, ApiError> {
    perfpulse_db::get_target_by_slug(pool, slug)
        .await
        .map_err(|e| map_db_error(request_id.to_owned(), &e))?
        .ok_or_else(|| {
            ApiError::new(request_id, "not_found", format!("target '{slug}' not found"))
        })
}

pub(super) fn canonical_url_or_validation_error(
    request_id: &str,
    raw: &str,
) -> Result<String, ApiError> {
    perfpulse_core::canonicalize_url(raw)
        .map_err(|e| ApiError::new(request_id, "validation_error", e.to_string()))
}

fn require_field(request_id: &str, field: &str, value: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_NAME_LEN {
        return Err(ApiError::new(
            request_id,
            "validation_error",
            format!("{field} must be 1-{MAX_NAME_LEN} characters"),
        ));
    }
    Ok(trimmed.to_owned())
}

fn map_create_error(request_id: &str, e: &DbError) -> ApiError {
    if matches!(e, DbError::UniqueViolation { .. }) {
        return ApiError::new(request_id, "conflict", "a target with that slug already exists");
    }
    map_db_error(request_id.to_owned(), e)
}

/// POST /api/v1/targets
pub(super) async fn create_target(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreateTargetRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TargetItem>>), ApiError> {
    let rid = &req_id.0;

    let name = require_field(rid, "name", &body.name)?;
    let stage = require_field(rid, "stage", &body.stage)?;
    let provider = require_field(rid, "provider", &body.provider)?;
    let slug = perfpulse_core::slugify(body.slug.as_deref().unwrap_or(&name));
    if slug.is_empty() {
        return Err(ApiError::new(
            rid,
            "validation_error",
            "slug must contain at least one letter or digit",
        ));
    }
    let canonical: Vec<String> = body
        .urls
        .iter()
        .map(|u| canonical_url_or_validation_error(rid, u))
        .collect::<Result<_, _>>()?;

    let target = perfpulse_db::create_target(&state.pool, &slug, &name, &stage, &provider)
        .await
        .map_err(|e| map_create_error(rid, &e))?;

    let mut urls = Vec::with_capacity(canonical.len());
    for url in &canonical {
        let row = perfpulse_db::attach_url(&state.pool, target.id, url)
            .await
            .map_err(|e| map_db_error(rid.clone(), &e))?;
        urls.push(row);
    }

    tracing::info!(target = %target.slug, urls = urls.len(), "target created");

    Ok((
        StatusCode::CREATED,
        ApiResponse::new(TargetItem::new(target, urls), req_id.0),
    ))
}

/// GET /api/v1/targets/{slug}
pub(super) async fn get_target(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<TargetItem>>, ApiError> {
    let target = resolve_target(&state.pool, &slug, &req_id.0).await?;
    let urls = perfpulse_db::list_target_urls(&state.pool, target.id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(TargetItem::new(target, urls), req_id.0))
}

/// DELETE /api/v1/targets/{slug}
///
/// Hides the target and its history; nothing is removed.
pub(super) async fn delete_target(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(slug): Path<String>,
) -> Result<StatusCode, ApiError> {
    let deleted = perfpulse_db::soft_delete_target(&state.pool, &slug)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    if !deleted {
        return Err(ApiError::new(
            req_id.0,
            "not_found",
            format!("target '{slug}' not found"),
        ));
    }
    tracing::info!(target = %slug, "target soft-deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/targets/{slug}/urls
pub(super) async fn attach_url(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(slug): Path<String>,
    Json(body): Json<AttachUrlRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UrlItem>>), ApiError> {
    let rid = &req_id.0;
    let canonical = canonical_url_or_validation_error(rid, &body.url)?;
    let target = resolve_target(&state.pool, &slug, rid).await?;
    let row = perfpulse_db::attach_url(&state.pool, target.id, &canonical)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    Ok((StatusCode::CREATED, ApiResponse::new(UrlItem::from(row), req_id.0)))
}
