//! Workspace membership operations
//!
//! Role changes and removals run the pure guards from `roles.rs` inside the
//! same transaction as the write. The workspace's OWNER rows are locked
//! with `FOR UPDATE` before counting, so two concurrent demotions cannot
//! both observe "two owners" and strand a workspace with none.

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::roles::{self, RoleGuardError};
use crate::auth::AuthUser;
use crate::error::{conflict_on_unique, ApiError, ApiResult};
use crate::models::{MemberRow, Workspace, WorkspaceMember, WorkspaceRole, WorkspaceRow};

impl From<RoleGuardError> for ApiError {
    fn from(err: RoleGuardError) -> Self {
        ApiError::Conflict(err.to_string())
    }
}

/// Load a user's membership in a workspace, if any.
pub async fn get_membership(
    pool: &PgPool,
    workspace_id: Uuid,
    user_id: Uuid,
) -> ApiResult<Option<WorkspaceMember>> {
    let row: Option<MemberRow> = sqlx::query_as(
        r#"
        SELECT id, workspace_id, user_id, role, created_at
        FROM workspace_members
        WHERE workspace_id = $1 AND user_id = $2
        "#,
    )
    .bind(workspace_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.map(MemberRow::into_member).transpose()
}

/// Require that the actor is a managing member (ADMIN or OWNER) of the
/// workspace. Non-members get `NotFound` rather than `Forbidden` so the
/// existence of a workspace is not leaked across tenants.
pub async fn require_manager(
    pool: &PgPool,
    workspace_id: Uuid,
    auth_user: &AuthUser,
) -> ApiResult<WorkspaceMember> {
    let membership = get_membership(pool, workspace_id, auth_user.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    if !roles::can_manage(membership.role) {
        return Err(ApiError::Forbidden);
    }
    Ok(membership)
}

/// Locks a workspace's OWNER rows. Rows are taken in a fixed order, and
/// the owner-set lock is always acquired before any member-row lock, so
/// two concurrent demotions serialize instead of deadlocking.
const OWNER_LOCK_SQL: &str = r#"
        SELECT id FROM workspace_members
        WHERE workspace_id = $1 AND role = 'OWNER'
        ORDER BY id
        FOR UPDATE
        "#;

/// Lock the workspace's OWNER rows and return their count.
///
/// The lock serializes concurrent owner demotions/removals for one
/// workspace; cross-workspace operations never contend.
async fn lock_owner_count(
    tx: &mut Transaction<'_, Postgres>,
    workspace_id: Uuid,
) -> ApiResult<i64> {
    let owner_ids: Vec<(Uuid,)> = sqlx::query_as(OWNER_LOCK_SQL)
        .bind(workspace_id)
        .fetch_all(&mut **tx)
        .await?;

    Ok(owner_ids.len() as i64)
}

async fn fetch_member_for_update(
    tx: &mut Transaction<'_, Postgres>,
    member_id: Uuid,
) -> ApiResult<WorkspaceMember> {
    let row: Option<MemberRow> = sqlx::query_as(
        r#"
        SELECT id, workspace_id, user_id, role, created_at
        FROM workspace_members
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(member_id)
    .fetch_optional(&mut **tx)
    .await?;

    row.ok_or(ApiError::NotFound)?.into_member()
}

/// Change a member's role, holding the last-owner invariant.
pub async fn update_member_role(
    pool: &PgPool,
    auth_user: &AuthUser,
    workspace_id: Uuid,
    member_id: Uuid,
    new_role: WorkspaceRole,
) -> ApiResult<WorkspaceMember> {
    let mut tx = pool.begin().await?;

    // Owner-set lock comes first; taking the member row first would let
    // two demotions acquire their locks in opposite orders.
    let owner_count = lock_owner_count(&mut tx, workspace_id).await?;

    let member = fetch_member_for_update(&mut tx, member_id).await?;
    if member.workspace_id != workspace_id {
        return Err(ApiError::NotFound);
    }
    // Guard with the actor's role inside the same transaction.
    let actor = get_membership_tx(&mut tx, member.workspace_id, auth_user.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if !roles::can_manage(actor.role) {
        return Err(ApiError::Forbidden);
    }

    roles::guard_role_change(auth_user.user_id, &member, new_role, owner_count)?;

    sqlx::query("UPDATE workspace_members SET role = $1 WHERE id = $2")
        .bind(new_role.as_str())
        .bind(member_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        actor_id = %auth_user.user_id,
        member_id = %member_id,
        new_role = new_role.as_str(),
        "member role updated"
    );

    Ok(WorkspaceMember {
        role: new_role,
        ..member
    })
}

/// Remove a member, holding the last-owner invariant.
pub async fn remove_member(
    pool: &PgPool,
    auth_user: &AuthUser,
    workspace_id: Uuid,
    member_id: Uuid,
) -> ApiResult<()> {
    let mut tx = pool.begin().await?;

    // Same lock order as update_member_role: owner set, then member row.
    let owner_count = lock_owner_count(&mut tx, workspace_id).await?;

    let member = fetch_member_for_update(&mut tx, member_id).await?;
    if member.workspace_id != workspace_id {
        return Err(ApiError::NotFound);
    }
    let actor = get_membership_tx(&mut tx, member.workspace_id, auth_user.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if !roles::can_manage(actor.role) {
        return Err(ApiError::Forbidden);
    }

    roles::guard_removal(auth_user.user_id, &member, owner_count)?;

    sqlx::query("DELETE FROM workspace_members WHERE id = $1")
        .bind(member_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        actor_id = %auth_user.user_id,
        member_id = %member_id,
        removed_user_id = %member.user_id,
        "member removed from workspace"
    );

    Ok(())
}

async fn get_membership_tx(
    tx: &mut Transaction<'_, Postgres>,
    workspace_id: Uuid,
    user_id: Uuid,
) -> ApiResult<Option<WorkspaceMember>> {
    let row: Option<MemberRow> = sqlx::query_as(
        r#"
        SELECT id, workspace_id, user_id, role, created_at
        FROM workspace_members
        WHERE workspace_id = $1 AND user_id = $2
        "#,
    )
    .bind(workspace_id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?;

    row.map(MemberRow::into_member).transpose()
}

/// Create a workspace with exactly one initial OWNER member.
pub async fn create_workspace(
    pool: &PgPool,
    owner_user_id: Uuid,
    name: &str,
    slug: &str,
    image_url: Option<&str>,
) -> ApiResult<Workspace> {
    if name.trim().is_empty() {
        return Err(ApiError::Validation("workspace name is required".to_string()));
    }
    if slug.trim().is_empty() {
        return Err(ApiError::Validation("workspace slug is required".to_string()));
    }

    let mut tx = pool.begin().await?;

    let workspace: WorkspaceRow = sqlx::query_as(
        r#"
        INSERT INTO workspaces (name, slug, image_url)
        VALUES ($1, $2, $3)
        RETURNING id, name, slug, image_url, created_at, updated_at
        "#,
    )
    .bind(name)
    .bind(slug)
    .bind(image_url)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| conflict_on_unique(e, "a workspace with this slug already exists"))?;

    sqlx::query(
        r#"
        INSERT INTO workspace_members (workspace_id, user_id, role)
        VALUES ($1, $2, 'OWNER')
        "#,
    )
    .bind(workspace.id)
    .bind(owner_user_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(workspace_id = %workspace.id, owner_user_id = %owner_user_id, "workspace created");

    Ok(workspace.into_workspace())
}

/// Update workspace name/slug/image.
pub async fn update_workspace(
    pool: &PgPool,
    workspace_id: Uuid,
    name: Option<&str>,
    slug: Option<&str>,
    image_url: Option<&str>,
) -> ApiResult<Workspace> {
    if let Some(name) = name {
        if name.trim().is_empty() {
            return Err(ApiError::Validation("workspace name cannot be empty".to_string()));
        }
    }
    if let Some(slug) = slug {
        if slug.trim().is_empty() {
            return Err(ApiError::Validation("workspace slug cannot be empty".to_string()));
        }
    }

    let row: Option<WorkspaceRow> = sqlx::query_as(
        r#"
        UPDATE workspaces
        SET name = COALESCE($2, name),
            slug = COALESCE($3, slug),
            image_url = COALESCE($4, image_url),
            updated_at = NOW()
        WHERE id = $1
        RETURNING id, name, slug, image_url, created_at, updated_at
        "#,
    )
    .bind(workspace_id)
    .bind(name)
    .bind(slug)
    .bind(image_url)
    .fetch_optional(pool)
    .await
    .map_err(|e| conflict_on_unique(e, "a workspace with this slug already exists"))?;

    Ok(row.ok_or(ApiError::NotFound)?.into_workspace())
}

/// Delete a workspace. Memberships and invitations cascade in the schema.
pub async fn delete_workspace(pool: &PgPool, workspace_id: Uuid) -> ApiResult<()> {
    let rows_affected = sqlx::query("DELETE FROM workspaces WHERE id = $1")
        .bind(workspace_id)
        .execute(pool)
        .await?
        .rows_affected();

    if rows_affected == 0 {
        return Err(ApiError::NotFound);
    }

    tracing::info!(workspace_id = %workspace_id, "workspace deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_lock_acquires_rows_in_a_fixed_order() {
        // Unordered multi-row FOR UPDATE lets two transactions take the
        // same rows in opposite orders and abort on a lock cycle.
        let order_by = OWNER_LOCK_SQL.find("ORDER BY id");
        let for_update = OWNER_LOCK_SQL.find("FOR UPDATE");
        assert!(order_by.is_some());
        assert!(for_update.is_some());
        assert!(order_by < for_update);
    }

    #[test]
    fn guard_violations_surface_as_conflicts() {
        let err: ApiError = RoleGuardError::LastOwnerViolation.into();
        match err {
            ApiError::Conflict(msg) => {
                assert_eq!(msg, "a workspace must have at least one owner");
            }
            other => panic!("expected Conflict, got {:?}", other),
        }
    }
}
