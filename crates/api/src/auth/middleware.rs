//! Authentication middleware
//!
//! Resolves the bearer token into a session row and re-reads the user row
//! from the store on every request. Nothing embedded in the token is
//! trusted: role and status always come from the database, so a session
//! issued before a role change or suspension immediately reflects the new
//! state, and an impersonated session authorizes as the target user, never
//! as the initiating admin.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use uuid::Uuid;

use super::sessions;
use crate::error::{ApiError, ApiResult};
use crate::models::{PlatformRole, UserStatus};

/// State needed for authentication.
#[derive(Clone)]
pub struct AuthState {
    pub pool: PgPool,
}

/// The effective actor for this request.
///
/// While impersonating, `user_id`/`role` describe the target user and
/// `impersonated_by` carries the admin's identity for audit display. All
/// authorization decisions use the target's role.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: PlatformRole,
    pub status: UserStatus,
    pub session_id: Uuid,
    pub impersonated_by: Option<Uuid>,
}

impl AuthUser {
    pub fn is_impersonating(&self) -> bool {
        self.impersonated_by.is_some()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ActorRow {
    email: String,
    role: String,
    status: String,
}

fn extract_bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(String::from)
}

/// Middleware that requires a valid session.
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let Some(token) = extract_bearer_token(&request) else {
        tracing::warn!(path = %path, "require_auth: no bearer token");
        return ApiError::Unauthorized.into_response();
    };

    match authenticate(&auth_state.pool, &token).await {
        Ok(auth_user) => {
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(err) => {
            tracing::warn!(path = %path, error = %err, "require_auth: authentication failed");
            err.into_response()
        }
    }
}

async fn authenticate(pool: &PgPool, token: &str) -> ApiResult<AuthUser> {
    let session = sessions::resolve_session(pool, token)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    // Role and status come from the store, never from a cached claim.
    let actor: Option<ActorRow> =
        sqlx::query_as("SELECT email, role, status FROM users WHERE id = $1")
            .bind(session.user_id)
            .fetch_optional(pool)
            .await?;

    let actor = actor.ok_or(ApiError::Unauthorized)?;
    let role = PlatformRole::parse(&actor.role).map_err(|_| ApiError::Unauthorized)?;
    let status = UserStatus::parse(&actor.status).map_err(|_| ApiError::Unauthorized)?;

    match status {
        UserStatus::Active => {}
        UserStatus::Suspended | UserStatus::Deleted => {
            tracing::warn!(user_id = %session.user_id, status = status.as_str(), "inactive account attempted access");
            return Err(ApiError::Unauthorized);
        }
    }

    Ok(AuthUser {
        user_id: session.user_id,
        email: actor.email,
        role,
        status,
        session_id: session.id,
        impersonated_by: session.impersonated_by,
    })
}

/// Require platform admin privileges for the effective actor.
///
/// The role is re-read from the store on every privileged check. An
/// impersonated session carries the target's role here, so impersonating a
/// regular user does not open the admin surface.
pub async fn require_admin(pool: &PgPool, auth_user: &AuthUser) -> ApiResult<Uuid> {
    let role: Option<String> = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
        .bind(auth_user.user_id)
        .fetch_optional(pool)
        .await?;

    let role = role.ok_or(ApiError::Unauthorized)?;
    match PlatformRole::parse(&role).map_err(|_| ApiError::Unauthorized)? {
        PlatformRole::Admin => Ok(auth_user.user_id),
        PlatformRole::User => {
            tracing::warn!(
                user_id = %auth_user.user_id,
                impersonated_by = ?auth_user.impersonated_by,
                "unauthorized admin access attempt"
            );
            Err(ApiError::Forbidden)
        }
    }
}
