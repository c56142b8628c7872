//! Read-only membership lookups used to attribute a dispatch to an account.

use perfpulse_core::MembershipPolicy;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// Resolves the account a user's pulses are attributed to.
///
/// `Primary` prefers the membership flagged primary and falls back to the
/// oldest active one; `First` always takes the oldest active membership.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn resolve_account_id(
    pool: &PgPool,
    user_id: Uuid,
    policy: MembershipPolicy,
) -> Result<Option<Uuid>, DbError> {
    let sql = match policy {
        MembershipPolicy::Primary => {
            "SELECT account_id FROM memberships \
             WHERE user_id = $1 AND is_active \
             ORDER BY is_primary DESC, created_at, id \
             LIMIT 1"
        }
        MembershipPolicy::First => {
            "SELECT account_id FROM memberships \
             WHERE user_id = $1 AND is_active \
             ORDER BY created_at, id \
             LIMIT 1"
        }
    };

    let account_id = sqlx::query_scalar::<_, Uuid>(sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(account_id)
}
