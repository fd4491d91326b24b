//! Invitation lifecycle
//!
//! PENDING → ACCEPTED | CANCELED | EXPIRED, all terminal. Acceptance marks
//! the invitation consumed and upserts the membership in one transaction,
//! guarded by a conditional update on `status = 'PENDING'` so a replayed
//! token fails cleanly instead of minting a second membership.

use serde::Serialize;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::members::require_manager;
use crate::auth::{sessions, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::models::{Invitation, InvitationRow, InvitationStatus, WorkspaceRole};

/// Default invitation validity.
const INVITATION_TTL: Duration = Duration::days(7);

/// Result of accepting an invitation.
///
/// Membership changes are not visible to already-issued sessions, so the
/// caller must re-establish its session after acceptance. That is a
/// post-condition of this operation, not a client nicety.
#[derive(Debug, Serialize)]
pub struct AcceptedInvitation {
    pub workspace_id: Uuid,
    pub role: WorkspaceRole,
    pub session_refresh_required: bool,
}

/// Issue an invitation. Requires a managing role in the workspace.
///
/// Earlier PENDING invitations for the same (workspace, email) pair are
/// canceled in the same transaction: only the newest token is accepted.
/// Returns the invitation and its token. The token is handed out exactly
/// once, at creation, for delivery to the invitee; it is never readable
/// from any list or fetch afterwards.
pub async fn invite(
    pool: &PgPool,
    auth_user: &AuthUser,
    workspace_id: Uuid,
    email: &str,
    role: WorkspaceRole,
) -> ApiResult<(Invitation, String)> {
    let email = email.trim().to_ascii_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::Validation("a valid email address is required".to_string()));
    }

    require_manager(pool, workspace_id, auth_user).await?;

    let token = sessions::generate_token();
    let expires_at = OffsetDateTime::now_utc() + INVITATION_TTL;

    let mut tx = pool.begin().await?;

    // Supersede earlier pending invitations for this address.
    let superseded = sqlx::query(
        r#"
        UPDATE invitations
        SET status = 'CANCELED'
        WHERE workspace_id = $1 AND email = $2 AND status = 'PENDING'
        "#,
    )
    .bind(workspace_id)
    .bind(&email)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let row: InvitationRow = sqlx::query_as(
        r#"
        INSERT INTO invitations (workspace_id, email, role, token, invited_by, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, workspace_id, email, role, status, invited_by, expires_at, created_at
        "#,
    )
    .bind(workspace_id)
    .bind(&email)
    .bind(role.as_str())
    .bind(&token)
    .bind(auth_user.user_id)
    .bind(expires_at)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        workspace_id = %workspace_id,
        invited_by = %auth_user.user_id,
        superseded = superseded,
        "invitation issued"
    );

    Ok((row.into_invitation()?, token))
}

/// Accept an invitation by token for the current user.
///
/// Mark-consumed and create-membership are one atomic unit; re-running
/// acceptance on a consumed invitation fails cleanly.
pub async fn accept(
    pool: &PgPool,
    auth_user: &AuthUser,
    token: &str,
) -> ApiResult<AcceptedInvitation> {
    let mut tx = pool.begin().await?;

    let row: Option<InvitationRow> = sqlx::query_as(
        r#"
        SELECT id, workspace_id, email, role, status, invited_by, expires_at, created_at
        FROM invitations
        WHERE token = $1
        FOR UPDATE
        "#,
    )
    .bind(token)
    .fetch_optional(&mut *tx)
    .await?;

    let invitation = row.ok_or(ApiError::NotFound)?.into_invitation()?;

    match invitation.status {
        InvitationStatus::Pending => {}
        InvitationStatus::Accepted => {
            return Err(ApiError::Conflict("invitation has already been used".to_string()));
        }
        InvitationStatus::Canceled => {
            return Err(ApiError::Conflict("invitation has been canceled".to_string()));
        }
        InvitationStatus::Expired => {
            return Err(ApiError::Conflict("invitation has expired".to_string()));
        }
    }

    if let Some(expires_at) = invitation.expires_at {
        if expires_at <= OffsetDateTime::now_utc() {
            sqlx::query("UPDATE invitations SET status = 'EXPIRED' WHERE id = $1")
                .bind(invitation.id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            return Err(ApiError::Conflict("invitation has expired".to_string()));
        }
    }

    // Conditional consume: a concurrent accept of the same token loses here.
    let consumed = sqlx::query(
        r#"
        UPDATE invitations
        SET status = 'ACCEPTED'
        WHERE id = $1 AND status = 'PENDING'
        "#,
    )
    .bind(invitation.id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if consumed == 0 {
        return Err(ApiError::Conflict("invitation has already been used".to_string()));
    }

    // Create or adjust the membership at the invited role.
    sqlx::query(
        r#"
        INSERT INTO workspace_members (workspace_id, user_id, role)
        VALUES ($1, $2, $3)
        ON CONFLICT (workspace_id, user_id) DO UPDATE SET role = EXCLUDED.role
        "#,
    )
    .bind(invitation.workspace_id)
    .bind(auth_user.user_id)
    .bind(invitation.role.as_str())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        workspace_id = %invitation.workspace_id,
        user_id = %auth_user.user_id,
        role = invitation.role.as_str(),
        "invitation accepted"
    );

    Ok(AcceptedInvitation {
        workspace_id: invitation.workspace_id,
        role: invitation.role,
        session_refresh_required: true,
    })
}

/// Cancel a pending invitation. Requires a managing role in its workspace.
pub async fn cancel(
    pool: &PgPool,
    auth_user: &AuthUser,
    workspace_id: Uuid,
    invitation_id: Uuid,
) -> ApiResult<()> {
    let row: Option<InvitationRow> = sqlx::query_as(
        r#"
        SELECT id, workspace_id, email, role, status, invited_by, expires_at, created_at
        FROM invitations
        WHERE id = $1
        "#,
    )
    .bind(invitation_id)
    .fetch_optional(pool)
    .await?;

    let invitation = row.ok_or(ApiError::NotFound)?.into_invitation()?;
    if invitation.workspace_id != workspace_id {
        return Err(ApiError::NotFound);
    }
    require_manager(pool, invitation.workspace_id, auth_user).await?;

    let canceled = sqlx::query(
        r#"
        UPDATE invitations
        SET status = 'CANCELED'
        WHERE id = $1 AND status = 'PENDING'
        "#,
    )
    .bind(invitation_id)
    .execute(pool)
    .await?
    .rows_affected();

    if canceled == 0 {
        return Err(ApiError::Conflict("invitation is no longer pending".to_string()));
    }

    tracing::info!(
        invitation_id = %invitation_id,
        actor_id = %auth_user.user_id,
        "invitation canceled"
    );

    Ok(())
}

/// List invitations for a workspace, newest first.
pub async fn list_for_workspace(pool: &PgPool, workspace_id: Uuid) -> ApiResult<Vec<Invitation>> {
    let rows: Vec<InvitationRow> = sqlx::query_as(
        r#"
        SELECT id, workspace_id, email, role, status, invited_by, expires_at, created_at
        FROM invitations
        WHERE workspace_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(workspace_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(InvitationRow::into_invitation).collect()
}
