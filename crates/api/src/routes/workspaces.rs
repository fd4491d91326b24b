//! Self-service workspace routes
//!
//! Authorization is per-workspace: handlers resolve the actor's membership
//! fresh from the store and let the guard functions decide. Non-members see
//! `NotFound` for workspaces they do not belong to.

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    models::{Invitation, Workspace, WorkspaceMember, WorkspaceRole},
    routes::{ok, Envelope},
    state::AppState,
    workspace::{invitations, members},
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateWorkspaceRequest {
    pub name: String,
    pub slug: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWorkspaceRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WorkspaceWithRole {
    #[serde(flatten)]
    pub workspace: Workspace,
    pub role: WorkspaceRole,
}

#[derive(Debug, FromRow)]
struct WorkspaceWithRoleRow {
    id: Uuid,
    name: String,
    slug: String,
    image_url: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    role: String,
}

/// Member row joined with the user's profile for display.
#[derive(Debug, FromRow)]
struct MemberDetailRow {
    id: Uuid,
    workspace_id: Uuid,
    user_id: Uuid,
    role: String,
    created_at: OffsetDateTime,
    email: String,
    name: String,
}

#[derive(Debug, Serialize)]
pub struct MemberDetail {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub role: WorkspaceRole,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRoleRequest {
    pub role: WorkspaceRole,
}

#[derive(Debug, Deserialize)]
pub struct InviteMemberRequest {
    pub email: String,
    pub role: WorkspaceRole,
}

/// The token appears here and nowhere else; listing invitations never
/// returns it.
#[derive(Debug, Serialize)]
pub struct InviteMemberResponse {
    #[serde(flatten)]
    pub invitation: Invitation,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct AcceptInvitationRequest {
    pub token: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// List the workspaces the current user belongs to, with their role in each.
pub async fn list_my_workspaces(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Envelope<Vec<WorkspaceWithRole>>>> {
    let rows: Vec<WorkspaceWithRoleRow> = sqlx::query_as(
        r#"
        SELECT w.id, w.name, w.slug, w.image_url, w.created_at, w.updated_at,
               m.role
        FROM workspaces w
        JOIN workspace_members m ON m.workspace_id = w.id
        WHERE m.user_id = $1
        ORDER BY w.created_at DESC
        "#,
    )
    .bind(auth_user.user_id)
    .fetch_all(&state.pool)
    .await?;

    let workspaces = rows
        .into_iter()
        .map(|row| {
            Ok(WorkspaceWithRole {
                role: WorkspaceRole::parse(&row.role)?,
                workspace: Workspace {
                    id: row.id,
                    name: row.name,
                    slug: row.slug,
                    image_url: row.image_url,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                },
            })
        })
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(ok(workspaces))
}

/// Create a workspace; the creator becomes its first OWNER.
pub async fn create_workspace(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(request): Json<CreateWorkspaceRequest>,
) -> ApiResult<Json<Envelope<Workspace>>> {
    let workspace = members::create_workspace(
        &state.pool,
        auth_user.user_id,
        &request.name,
        &request.slug,
        request.image_url.as_deref(),
    )
    .await?;

    Ok(ok(workspace))
}

/// Update a workspace. Requires a managing role.
pub async fn update_workspace(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(workspace_id): Path<Uuid>,
    Json(request): Json<UpdateWorkspaceRequest>,
) -> ApiResult<Json<Envelope<Workspace>>> {
    members::require_manager(&state.pool, workspace_id, &auth_user).await?;

    let workspace = members::update_workspace(
        &state.pool,
        workspace_id,
        request.name.as_deref(),
        request.slug.as_deref(),
        request.image_url.as_deref(),
    )
    .await?;

    Ok(ok(workspace))
}

/// Delete a workspace. Owners only; a workspace ADMIN cannot destroy it.
pub async fn delete_workspace(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(workspace_id): Path<Uuid>,
) -> ApiResult<Json<Envelope<serde_json::Value>>> {
    let membership = members::get_membership(&state.pool, workspace_id, auth_user.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if membership.role != WorkspaceRole::Owner {
        return Err(ApiError::Forbidden);
    }

    members::delete_workspace(&state.pool, workspace_id).await?;

    Ok(ok(serde_json::json!({ "deleted": true })))
}

/// List a workspace's members. Any member may view the roster.
pub async fn list_members(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(workspace_id): Path<Uuid>,
) -> ApiResult<Json<Envelope<Vec<MemberDetail>>>> {
    members::get_membership(&state.pool, workspace_id, auth_user.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let rows: Vec<MemberDetailRow> = sqlx::query_as(
        r#"
        SELECT m.id, m.workspace_id, m.user_id, m.role, m.created_at,
               u.email, u.name
        FROM workspace_members m
        JOIN users u ON u.id = m.user_id
        WHERE m.workspace_id = $1
        ORDER BY m.created_at ASC
        "#,
    )
    .bind(workspace_id)
    .fetch_all(&state.pool)
    .await?;

    let members = rows
        .into_iter()
        .map(|row| {
            Ok(MemberDetail {
                id: row.id,
                workspace_id: row.workspace_id,
                user_id: row.user_id,
                role: WorkspaceRole::parse(&row.role)?,
                created_at: row.created_at,
                email: row.email,
                name: row.name,
            })
        })
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(ok(members))
}

/// Change a member's role.
pub async fn update_member_role(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((workspace_id, member_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateMemberRoleRequest>,
) -> ApiResult<Json<Envelope<WorkspaceMember>>> {
    let member = members::update_member_role(
        &state.pool,
        &auth_user,
        workspace_id,
        member_id,
        request.role,
    )
    .await?;

    Ok(ok(member))
}

/// Remove a member from a workspace.
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((workspace_id, member_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Envelope<serde_json::Value>>> {
    members::remove_member(&state.pool, &auth_user, workspace_id, member_id).await?;
    Ok(ok(serde_json::json!({ "removed": true })))
}

/// List a workspace's invitations. Requires a managing role.
pub async fn list_invitations(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(workspace_id): Path<Uuid>,
) -> ApiResult<Json<Envelope<Vec<Invitation>>>> {
    members::require_manager(&state.pool, workspace_id, &auth_user).await?;

    let invitations = invitations::list_for_workspace(&state.pool, workspace_id).await?;
    Ok(ok(invitations))
}

/// Invite someone to a workspace by email.
pub async fn invite_member(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(workspace_id): Path<Uuid>,
    Json(request): Json<InviteMemberRequest>,
) -> ApiResult<Json<Envelope<InviteMemberResponse>>> {
    let (invitation, token) = invitations::invite(
        &state.pool,
        &auth_user,
        workspace_id,
        &request.email,
        request.role,
    )
    .await?;

    Ok(ok(InviteMemberResponse { invitation, token }))
}

/// Cancel a pending invitation.
pub async fn cancel_invitation(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((workspace_id, invitation_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Envelope<serde_json::Value>>> {
    invitations::cancel(&state.pool, &auth_user, workspace_id, invitation_id).await?;
    Ok(ok(serde_json::json!({ "canceled": true })))
}

/// Accept an invitation by token as the current user.
pub async fn accept_invitation(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(request): Json<AcceptInvitationRequest>,
) -> ApiResult<Json<Envelope<invitations::AcceptedInvitation>>> {
    let accepted = invitations::accept(&state.pool, &auth_user, &request.token).await?;
    Ok(ok(accepted))
}
