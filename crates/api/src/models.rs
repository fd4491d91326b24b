//! Core domain types
//!
//! Role and status columns are stored as TEXT and parsed into these closed
//! enums at the fetch boundary. Every guard matches exhaustively, so adding
//! a variant forces each call site to be revisited.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// Platform-level role, distinct from per-workspace roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformRole {
    User,
    Admin,
}

impl PlatformRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformRole::User => "user",
            PlatformRole::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> ApiResult<Self> {
        match raw {
            "user" => Ok(PlatformRole::User),
            "admin" => Ok(PlatformRole::Admin),
            other => Err(ApiError::Validation(format!("unknown platform role: {}", other))),
        }
    }
}

/// Account status. Deletion is a status flip, never row removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Suspended,
    Deleted,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "ACTIVE",
            UserStatus::Suspended => "SUSPENDED",
            UserStatus::Deleted => "DELETED",
        }
    }

    pub fn parse(raw: &str) -> ApiResult<Self> {
        match raw {
            "ACTIVE" => Ok(UserStatus::Active),
            "SUSPENDED" => Ok(UserStatus::Suspended),
            "DELETED" => Ok(UserStatus::Deleted),
            other => Err(ApiError::Validation(format!("unknown user status: {}", other))),
        }
    }
}

/// Per-workspace role, ordered by privilege.
///
/// Derived `Ord` follows declaration order: VIEWER < MEMBER < ADMIN < OWNER.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkspaceRole {
    Viewer,
    Member,
    Admin,
    Owner,
}

impl WorkspaceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspaceRole::Viewer => "VIEWER",
            WorkspaceRole::Member => "MEMBER",
            WorkspaceRole::Admin => "ADMIN",
            WorkspaceRole::Owner => "OWNER",
        }
    }

    pub fn parse(raw: &str) -> ApiResult<Self> {
        match raw {
            "VIEWER" => Ok(WorkspaceRole::Viewer),
            "MEMBER" => Ok(WorkspaceRole::Member),
            "ADMIN" => Ok(WorkspaceRole::Admin),
            "OWNER" => Ok(WorkspaceRole::Owner),
            other => Err(ApiError::Validation(format!("unknown workspace role: {}", other))),
        }
    }
}

/// Invitation lifecycle. PENDING is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Canceled,
    Expired,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "PENDING",
            InvitationStatus::Accepted => "ACCEPTED",
            InvitationStatus::Canceled => "CANCELED",
            InvitationStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(raw: &str) -> ApiResult<Self> {
        match raw {
            "PENDING" => Ok(InvitationStatus::Pending),
            "ACCEPTED" => Ok(InvitationStatus::Accepted),
            "CANCELED" => Ok(InvitationStatus::Canceled),
            "EXPIRED" => Ok(InvitationStatus::Expired),
            other => Err(ApiError::Validation(format!(
                "unknown invitation status: {}",
                other
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            InvitationStatus::Pending => false,
            InvitationStatus::Accepted | InvitationStatus::Canceled | InvitationStatus::Expired => {
                true
            }
        }
    }
}

// =============================================================================
// Database row types
// =============================================================================

#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
    pub status: String,
    pub email_verified: bool,
    pub last_login_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Parsed user record.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: PlatformRole,
    pub status: UserStatus,
    pub email_verified: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl UserRow {
    pub fn into_user(self) -> ApiResult<User> {
        Ok(User {
            id: self.id,
            email: self.email,
            name: self.name,
            role: PlatformRole::parse(&self.role)?,
            status: UserStatus::parse(&self.status)?,
            email_verified: self.email_verified,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct WorkspaceRow {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub image_url: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl WorkspaceRow {
    pub fn into_workspace(self) -> Workspace {
        Workspace {
            id: self.id,
            name: self.name,
            slug: self.slug,
            image_url: self.image_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct MemberRow {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceMember {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub role: WorkspaceRole,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl MemberRow {
    pub fn into_member(self) -> ApiResult<WorkspaceMember> {
        Ok(WorkspaceMember {
            id: self.id,
            workspace_id: self.workspace_id,
            user_id: self.user_id,
            role: WorkspaceRole::parse(&self.role)?,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct InvitationRow {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub email: String,
    pub role: String,
    pub status: String,
    pub invited_by: Uuid,
    pub expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

/// Invitation as surfaced to callers. The token is deliberately absent:
/// it is handed out once at creation and never readable afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Invitation {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub email: String,
    pub role: WorkspaceRole,
    pub status: InvitationStatus,
    pub invited_by: Uuid,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl InvitationRow {
    pub fn into_invitation(self) -> ApiResult<Invitation> {
        Ok(Invitation {
            id: self.id,
            workspace_id: self.workspace_id,
            email: self.email,
            role: WorkspaceRole::parse(&self.role)?,
            status: InvitationStatus::parse(&self.status)?,
            invited_by: self.invited_by,
            expires_at: self.expires_at,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_roles_are_ordered_by_privilege() {
        assert!(WorkspaceRole::Viewer < WorkspaceRole::Member);
        assert!(WorkspaceRole::Member < WorkspaceRole::Admin);
        assert!(WorkspaceRole::Admin < WorkspaceRole::Owner);
    }

    #[test]
    fn role_strings_round_trip() {
        for role in [
            WorkspaceRole::Viewer,
            WorkspaceRole::Member,
            WorkspaceRole::Admin,
            WorkspaceRole::Owner,
        ] {
            assert_eq!(WorkspaceRole::parse(role.as_str()).unwrap(), role);
        }
        assert!(WorkspaceRole::parse("SUPERUSER").is_err());
    }

    #[test]
    fn pending_is_the_only_non_terminal_state() {
        assert!(!InvitationStatus::Pending.is_terminal());
        assert!(InvitationStatus::Accepted.is_terminal());
        assert!(InvitationStatus::Canceled.is_terminal());
        assert!(InvitationStatus::Expired.is_terminal());
    }

    #[test]
    fn user_status_round_trips() {
        for status in [UserStatus::Active, UserStatus::Suspended, UserStatus::Deleted] {
            assert_eq!(UserStatus::parse(status.as_str()).unwrap(), status);
        }
    }
}
