//! Admin impersonation
//!
//! An admin can assume another user's identity for support work. The
//! impersonated session is a real session row bound to the target user and
//! tagged with the admin's id, with a hard one-hour lifetime. The admin's
//! own session is never touched; stopping impersonation revokes only the
//! assumed session and the client resumes with its original token.

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::middleware::{require_admin, AuthUser};
use super::sessions;
use crate::error::{ApiError, ApiResult};
use crate::models::UserStatus;

/// Result of starting impersonation.
#[derive(Debug, Serialize)]
pub struct ImpersonationStarted {
    /// Bearer token for the impersonated session.
    pub token: String,
    pub target_user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
struct TargetRow {
    id: Uuid,
    status: String,
}

/// Pure preconditions on the impersonation target.
///
/// Self-impersonation and suspended targets are conflicts; a deleted
/// target reads as missing, same as a nonexistent id.
fn guard_target(admin_id: Uuid, target_id: Uuid, target_status: UserStatus) -> ApiResult<()> {
    if target_id == admin_id {
        return Err(ApiError::Conflict("cannot impersonate yourself".to_string()));
    }
    match target_status {
        UserStatus::Active => Ok(()),
        UserStatus::Suspended => Err(ApiError::Conflict(
            "cannot impersonate a suspended user".to_string(),
        )),
        UserStatus::Deleted => Err(ApiError::NotFound),
    }
}

/// Start impersonating `target_user_id`.
///
/// Fails if the caller is not an admin, the target does not exist, the
/// target is not ACTIVE, or the target is the caller.
pub async fn start_impersonation(
    pool: &PgPool,
    auth_user: &AuthUser,
    target_user_id: Uuid,
) -> ApiResult<ImpersonationStarted> {
    let admin_id = require_admin(pool, auth_user).await?;

    let target: Option<TargetRow> = sqlx::query_as("SELECT id, status FROM users WHERE id = $1")
        .bind(target_user_id)
        .fetch_optional(pool)
        .await?;
    let target = target.ok_or(ApiError::NotFound)?;

    guard_target(admin_id, target.id, UserStatus::parse(&target.status)?)?;

    let token = sessions::create_impersonation_session(pool, admin_id, target.id).await?;

    Ok(ImpersonationStarted {
        token,
        target_user_id: target.id,
        expires_at: OffsetDateTime::now_utc() + sessions::IMPERSONATION_TTL,
    })
}

/// Stop impersonating.
///
/// Fails unless the current session carries an impersonation tag. Revokes
/// the impersonated session; the admin's original session was never
/// revoked and keeps working as-is.
pub async fn stop_impersonation(pool: &PgPool, auth_user: &AuthUser) -> ApiResult<()> {
    let Some(admin_id) = auth_user.impersonated_by else {
        return Err(ApiError::Conflict(
            "current session is not an impersonation session".to_string(),
        ));
    };

    sessions::revoke_session(pool, auth_user.session_id).await?;

    tracing::info!(
        admin_id = %admin_id,
        target_user_id = %auth_user.user_id,
        "impersonation session ended"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_impersonation_is_rejected() {
        let admin = Uuid::new_v4();
        let err = guard_target(admin, admin, UserStatus::Active).unwrap_err();
        match err {
            ApiError::Conflict(msg) => assert_eq!(msg, "cannot impersonate yourself"),
            other => panic!("expected Conflict, got {:?}", other),
        }
    }

    #[test]
    fn suspended_target_is_a_conflict() {
        let err = guard_target(Uuid::new_v4(), Uuid::new_v4(), UserStatus::Suspended).unwrap_err();
        match err {
            ApiError::Conflict(msg) => assert_eq!(msg, "cannot impersonate a suspended user"),
            other => panic!("expected Conflict, got {:?}", other),
        }
    }

    #[test]
    fn deleted_target_reads_as_missing() {
        let err = guard_target(Uuid::new_v4(), Uuid::new_v4(), UserStatus::Deleted).unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }

    #[test]
    fn active_target_passes() {
        assert!(guard_target(Uuid::new_v4(), Uuid::new_v4(), UserStatus::Active).is_ok());
    }
}
