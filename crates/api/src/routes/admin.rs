//! Platform admin routes
//!
//! Every handler re-checks the admin role from the store before touching
//! anything. User deletion is a status flip; the row stays.

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use opshq_shared::{clamp_limit, clamp_page};

use crate::{
    auth::{self, require_admin, AuthUser},
    error::{conflict_on_unique, ApiError, ApiResult},
    models::{PlatformRole, User, UserRow, UserStatus, Workspace},
    routes::{ok, Envelope},
    state::AppState,
    workspace::members,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    /// Substring match on email or name.
    pub search: Option<String>,
    /// Filter by account status (ACTIVE, SUSPENDED, DELETED).
    pub status: Option<String>,
    /// Sort key: created_at (default), email, last_login_at.
    pub sort: Option<String>,
    /// Sort direction: desc (default) or asc.
    pub order: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<User>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub page_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: Option<String>,
    pub role: Option<PlatformRole>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub role: Option<PlatformRole>,
    pub status: Option<UserStatus>,
    pub email_verified: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AdminCreateWorkspaceRequest {
    pub name: String,
    pub slug: String,
    pub image_url: Option<String>,
    /// Initial OWNER; defaults to the acting admin.
    pub owner_user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AdminUpdateWorkspaceRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub image_url: Option<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// List users with filters, pagination, and sorting.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<ListUsersQuery>,
) -> ApiResult<Json<Envelope<UserListResponse>>> {
    require_admin(&state.pool, &auth_user).await?;

    let page = clamp_page(query.page);
    let limit = clamp_limit(query.limit);
    let offset = (page - 1) * limit;

    // Sort key and direction come from an allowlist; never interpolate
    // caller input into SQL.
    let sort = match query.sort.as_deref() {
        None | Some("created_at") => "created_at",
        Some("email") => "email",
        Some("last_login_at") => "last_login_at",
        Some(other) => {
            return Err(ApiError::Validation(format!("unknown sort key: {}", other)));
        }
    };
    let order = match query.order.as_deref() {
        None | Some("desc") => "DESC",
        Some("asc") => "ASC",
        Some(other) => {
            return Err(ApiError::Validation(format!("unknown sort order: {}", other)));
        }
    };

    let status = query
        .status
        .as_deref()
        .map(UserStatus::parse)
        .transpose()?;
    let search = query.search.as_deref().filter(|s| !s.trim().is_empty());

    let mut sql = String::from(
        r#"
        SELECT id, email, name, role, status, email_verified,
               last_login_at, created_at, updated_at
        FROM users
        WHERE 1=1
        "#,
    );
    let mut count_sql = String::from("SELECT COUNT(*) FROM users WHERE 1=1");

    let mut bind_idx = 0;
    if search.is_some() {
        bind_idx += 1;
        let clause = format!(" AND (email ILIKE '%' || ${} || '%' OR name ILIKE '%' || ${} || '%')", bind_idx, bind_idx);
        sql.push_str(&clause);
        count_sql.push_str(&clause);
    }
    if status.is_some() {
        bind_idx += 1;
        let clause = format!(" AND status = ${}", bind_idx);
        sql.push_str(&clause);
        count_sql.push_str(&clause);
    }
    sql.push_str(&format!(
        " ORDER BY {} {} NULLS LAST LIMIT ${} OFFSET ${}",
        sort,
        order,
        bind_idx + 1,
        bind_idx + 2
    ));

    let mut rows_query = sqlx::query_as::<_, UserRow>(&sql);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(search) = search {
        rows_query = rows_query.bind(search.to_string());
        count_query = count_query.bind(search.to_string());
    }
    if let Some(status) = status {
        rows_query = rows_query.bind(status.as_str());
        count_query = count_query.bind(status.as_str());
    }
    let rows = rows_query.bind(limit).bind(offset).fetch_all(&state.pool).await?;
    let total = count_query.fetch_one(&state.pool).await?;

    let users = rows
        .into_iter()
        .map(UserRow::into_user)
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(ok(UserListResponse {
        users,
        total,
        page,
        limit,
        page_count: (total + limit - 1) / limit,
    }))
}

/// Create a user account.
pub async fn create_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<Json<Envelope<User>>> {
    let admin_id = require_admin(&state.pool, &auth_user).await?;

    let email = request.email.trim().to_ascii_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::Validation("a valid email address is required".to_string()));
    }
    let role = request.role.unwrap_or(PlatformRole::User);

    let row: UserRow = sqlx::query_as(
        r#"
        INSERT INTO users (email, name, role)
        VALUES ($1, $2, $3)
        RETURNING id, email, name, role, status, email_verified,
                  last_login_at, created_at, updated_at
        "#,
    )
    .bind(&email)
    .bind(request.name.as_deref().unwrap_or(""))
    .bind(role.as_str())
    .fetch_one(&state.pool)
    .await
    .map_err(|e| conflict_on_unique(e, "a user with this email already exists"))?;

    tracing::info!(admin_id = %admin_id, created_user_email = %email, "user created by admin");

    Ok(ok(row.into_user()?))
}

/// Update a user's profile, role, status, or verification flag.
pub async fn update_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<UpdateUserRequest>,
) -> ApiResult<Json<Envelope<User>>> {
    let admin_id = require_admin(&state.pool, &auth_user).await?;

    let row: Option<UserRow> = sqlx::query_as(
        r#"
        UPDATE users
        SET name = COALESCE($2, name),
            role = COALESCE($3, role),
            status = COALESCE($4, status),
            email_verified = COALESCE($5, email_verified),
            updated_at = NOW()
        WHERE id = $1
        RETURNING id, email, name, role, status, email_verified,
                  last_login_at, created_at, updated_at
        "#,
    )
    .bind(user_id)
    .bind(request.name.as_deref())
    .bind(request.role.map(|r| r.as_str()))
    .bind(request.status.map(|s| s.as_str()))
    .bind(request.email_verified)
    .fetch_optional(&state.pool)
    .await?;

    let user = row.ok_or(ApiError::NotFound)?.into_user()?;

    // A disabled account must not keep acting through stale tokens.
    match user.status {
        UserStatus::Suspended | UserStatus::Deleted => {
            let revoked = auth::sessions::revoke_all_sessions(&state.pool, user_id).await?;
            tracing::info!(
                admin_id = %admin_id,
                user_id = %user_id,
                status = user.status.as_str(),
                revoked_sessions = revoked,
                "user disabled by admin"
            );
        }
        UserStatus::Active => {
            tracing::info!(admin_id = %admin_id, user_id = %user_id, "user updated by admin");
        }
    }

    Ok(ok(user))
}

/// An admin must not be able to lock themselves out by deleting the
/// account their own session is bound to.
fn guard_self_delete(admin_id: Uuid, target_id: Uuid) -> ApiResult<()> {
    if target_id == admin_id {
        return Err(ApiError::Conflict("cannot delete your own account".to_string()));
    }
    Ok(())
}

/// Soft-delete a user. Refuses self-deletion.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<Envelope<User>>> {
    let admin_id = require_admin(&state.pool, &auth_user).await?;

    guard_self_delete(admin_id, user_id)?;

    let row: Option<UserRow> = sqlx::query_as(
        r#"
        UPDATE users
        SET status = 'DELETED', updated_at = NOW()
        WHERE id = $1 AND status != 'DELETED'
        RETURNING id, email, name, role, status, email_verified,
                  last_login_at, created_at, updated_at
        "#,
    )
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?;

    let user = row.ok_or(ApiError::NotFound)?.into_user()?;
    auth::sessions::revoke_all_sessions(&state.pool, user_id).await?;

    tracing::info!(admin_id = %admin_id, user_id = %user_id, "user soft-deleted");

    Ok(ok(user))
}

/// Start impersonating a user.
pub async fn impersonate_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<Envelope<auth::impersonation::ImpersonationStarted>>> {
    let started = auth::start_impersonation(&state.pool, &auth_user, user_id).await?;
    Ok(ok(started))
}

/// Stop impersonating and return to the admin's own session.
pub async fn stop_impersonating(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Envelope<serde_json::Value>>> {
    auth::stop_impersonation(&state.pool, &auth_user).await?;
    Ok(ok(serde_json::json!({ "stopped": true })))
}

/// Create a workspace on behalf of a user (platform admin surface).
pub async fn create_workspace(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(request): Json<AdminCreateWorkspaceRequest>,
) -> ApiResult<Json<Envelope<Workspace>>> {
    let admin_id = require_admin(&state.pool, &auth_user).await?;
    let owner = request.owner_user_id.unwrap_or(admin_id);

    let workspace = members::create_workspace(
        &state.pool,
        owner,
        &request.name,
        &request.slug,
        request.image_url.as_deref(),
    )
    .await?;

    Ok(ok(workspace))
}

/// Update any workspace (platform admin surface).
pub async fn update_workspace(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(workspace_id): Path<Uuid>,
    Json(request): Json<AdminUpdateWorkspaceRequest>,
) -> ApiResult<Json<Envelope<Workspace>>> {
    require_admin(&state.pool, &auth_user).await?;

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

/// Delete any workspace (platform admin surface).
pub async fn delete_workspace(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(workspace_id): Path<Uuid>,
) -> ApiResult<Json<Envelope<serde_json::Value>>> {
    let admin_id = require_admin(&state.pool, &auth_user).await?;

    members::delete_workspace(&state.pool, workspace_id).await?;
    tracing::info!(admin_id = %admin_id, workspace_id = %workspace_id, "workspace deleted by admin");

    Ok(ok(serde_json::json!({ "deleted": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deleting_your_own_account_is_a_conflict() {
        let admin = Uuid::new_v4();
        let err = guard_self_delete(admin, admin).unwrap_err();
        match err {
            ApiError::Conflict(msg) => assert_eq!(msg, "cannot delete your own account"),
            other => panic!("expected Conflict, got {:?}", other),
        }
    }

    #[test]
    fn deleting_another_user_passes_the_guard() {
        assert!(guard_self_delete(Uuid::new_v4(), Uuid::new_v4()).is_ok());
    }
}
