//! Database operations for `targets`, `urls` and `target_urls`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `targets` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TargetRow {
    pub id: i64,
    pub public_id: Uuid,
    pub slug: String,
    pub name: String,
    pub stage: String,
    pub provider: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A row from the `urls` table. `url` is always in canonical form.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UrlRow {
    pub id: i64,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Creates a target. Slug uniqueness is enforced by `targets_slug_key`.
///
/// # Errors
///
/// Returns [`DbError::UniqueViolation`] if the slug is taken, or
/// [`DbError::Sqlx`] if the insert fails.
pub async fn create_target(
    pool: &PgPool,
    slug: &str,
    name: &str,
    stage: &str,
    provider: &str,
) -> Result<TargetRow, DbError> {
    sqlx::query_as::<_, TargetRow>(
        "INSERT INTO targets (public_id, slug, name, stage, provider) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING id, public_id, slug, name, stage, provider, created_at, deleted_at",
    )
    .bind(Uuid::new_v4())
    .bind(slug)
    .bind(name)
    .bind(stage)
    .bind(provider)
    .fetch_one(pool)
    .await
    .map_err(DbError::from_insert)
}

/// Returns the target with the given slug, if it exists and is not soft-deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_target_by_slug(pool: &PgPool, slug: &str) -> Result<Option<TargetRow>, DbError> {
    let row = sqlx::query_as::<_, TargetRow>(
        "SELECT id, public_id, slug, name, stage, provider, created_at, deleted_at \
         FROM targets \
         WHERE slug = $1 AND deleted_at IS NULL",
    )
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Soft-deletes a target. Its pulses, baselines and statistics are kept.
///
/// Returns `false` if no live target has this slug.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn soft_delete_target(pool: &PgPool, slug: &str) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE targets SET deleted_at = NOW() \
         WHERE slug = $1 AND deleted_at IS NULL",
    )
    .bind(slug)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Attaches a canonical URL to a target, creating the `urls` row if needed.
///
/// Idempotent: attaching the same URL twice returns the existing row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails.
pub async fn attach_url(
    pool: &PgPool,
    target_id: i64,
    canonical_url: &str,
) -> Result<UrlRow, DbError> {
    let mut tx = pool.begin().await?;

    // DO UPDATE with a no-op assignment so RETURNING yields the existing row.
    let url = sqlx::query_as::<_, UrlRow>(
        "INSERT INTO urls (url) VALUES ($1) \
         ON CONFLICT (url) DO UPDATE SET url = EXCLUDED.url \
         RETURNING id, url, created_at",
    )
    .bind(canonical_url)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO target_urls (target_id, url_id) VALUES ($1, $2) \
         ON CONFLICT (target_id, url_id) DO NOTHING",
    )
    .bind(target_id)
    .bind(url.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(url)
}

/// Returns the URL row if `canonical_url` is attached to the target.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_target_url(
    pool: &PgPool,
    target_id: i64,
    canonical_url: &str,
) -> Result<Option<UrlRow>, DbError> {
    let row = sqlx::query_as::<_, UrlRow>(
        "SELECT u.id, u.url, u.created_at \
         FROM urls u \
         JOIN target_urls tu ON tu.url_id = u.id \
         WHERE tu.target_id = $1 AND u.url = $2",
    )
    .bind(target_id)
    .bind(canonical_url)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Lists every URL attached to a target, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_target_urls(pool: &PgPool, target_id: i64) -> Result<Vec<UrlRow>, DbError> {
    let rows = sqlx::query_as::<_, UrlRow>(
        "SELECT u.id, u.url, u.created_at \
         FROM urls u \
         JOIN target_urls tu ON tu.url_id = u.id \
         WHERE tu.target_id = $1 \
         ORDER BY tu.created_at, u.id",
    )
    .bind(target_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
