//! Store-backed session management
//!
//! Sessions are opaque bearer tokens tracked in the `sessions` table.
//! Validity (expiry, revocation) is a property of the row and is checked in
//! SQL against the database clock, so an impersonation session becomes
//! unusable the moment its fixed lifetime elapses, regardless of what the
//! client believes.

use rand::RngCore;
use sqlx::{FromRow, PgPool};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::ApiResult;

/// Lifetime of an ordinary session.
const SESSION_TTL: Duration = Duration::days(30);

/// Hard lifetime of an impersonation session. Enforced by the session
/// row's `expires_at`, not by client-side logic.
pub const IMPERSONATION_TTL: Duration = Duration::hours(1);

/// A resolved, currently-valid session.
#[derive(Debug, Clone, FromRow)]
pub struct SessionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Admin who initiated impersonation; `None` for ordinary sessions.
    pub impersonated_by: Option<Uuid>,
    pub expires_at: OffsetDateTime,
}

/// Generate an unguessable session or invitation token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Create an ordinary session for a user. Returns the bearer token.
pub async fn create_session(pool: &PgPool, user_id: Uuid) -> ApiResult<String> {
    let token = generate_token();
    let expires_at = OffsetDateTime::now_utc() + SESSION_TTL;

    sqlx::query(
        r#"
        INSERT INTO sessions (user_id, token, expires_at)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(user_id)
    .bind(&token)
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(token)
}

/// Create an impersonation session bound to `target_user_id` and tagged
/// with the initiating admin. The admin's own session is not touched.
pub async fn create_impersonation_session(
    pool: &PgPool,
    admin_id: Uuid,
    target_user_id: Uuid,
) -> ApiResult<String> {
    let token = generate_token();
    let expires_at = OffsetDateTime::now_utc() + IMPERSONATION_TTL;

    sqlx::query(
        r#"
        INSERT INTO sessions (user_id, token, impersonated_by, expires_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(target_user_id)
    .bind(&token)
    .bind(admin_id)
    .bind(expires_at)
    .execute(pool)
    .await?;

    tracing::info!(
        admin_id = %admin_id,
        target_user_id = %target_user_id,
        "impersonation session created"
    );

    Ok(token)
}

/// Resolve a bearer token into a valid session, if one exists.
///
/// Expiry and revocation are evaluated against the database clock.
pub async fn resolve_session(pool: &PgPool, token: &str) -> ApiResult<Option<SessionRecord>> {
    let session: Option<SessionRecord> = sqlx::query_as(
        r#"
        SELECT id, user_id, impersonated_by, expires_at
        FROM sessions
        WHERE token = $1
          AND revoked_at IS NULL
          AND expires_at > NOW()
        "#,
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(session)
}

/// Revoke a session by id. Returns whether a live session was revoked.
pub async fn revoke_session(pool: &PgPool, session_id: Uuid) -> ApiResult<bool> {
    let rows_affected = sqlx::query(
        r#"
        UPDATE sessions
        SET revoked_at = NOW()
        WHERE id = $1
          AND revoked_at IS NULL
        "#,
    )
    .bind(session_id)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(rows_affected > 0)
}

/// Revoke every live session for a user.
///
/// Called when an account is suspended or soft-deleted so stale tokens
/// cannot keep acting for a disabled account.
pub async fn revoke_all_sessions(pool: &PgPool, user_id: Uuid) -> ApiResult<u64> {
    let rows_affected = sqlx::query(
        r#"
        UPDATE sessions
        SET revoked_at = NOW()
        WHERE user_id = $1
          AND revoked_at IS NULL
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(rows_affected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_long_and_unique() {
        let a = generate_token();
        let b = generate_token();
        // 32 random bytes, hex-encoded
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn impersonation_lifetime_is_one_hour() {
        assert_eq!(IMPERSONATION_TTL, Duration::seconds(3600));
    }
}
