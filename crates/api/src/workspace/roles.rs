//! Workspace role model
//!
//! Pure invariant checks over membership state; no I/O. The transactional
//! wrappers in `members.rs` call these with an owner count read under the
//! same transaction as the write, so the count a guard sees is the count
//! the mutation commits against.

use thiserror::Error;
use uuid::Uuid;

use crate::models::{WorkspaceMember, WorkspaceRole};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoleGuardError {
    #[error("you cannot change your own role")]
    SelfRoleChange,

    #[error("you cannot remove yourself from a workspace")]
    SelfRemoval,

    /// Every workspace must retain at least one OWNER at all times.
    #[error("a workspace must have at least one owner")]
    LastOwnerViolation,
}

/// Whether a member may manage other members (invite, change roles, remove).
pub fn can_manage(actor_role: WorkspaceRole) -> bool {
    match actor_role {
        WorkspaceRole::Admin | WorkspaceRole::Owner => true,
        WorkspaceRole::Viewer | WorkspaceRole::Member => false,
    }
}

/// Guard a role change against self-action and the last-owner invariant.
///
/// `owner_count` is the number of OWNER members in the target's workspace,
/// read consistently with the write that follows.
pub fn guard_role_change(
    actor_id: Uuid,
    member: &WorkspaceMember,
    new_role: WorkspaceRole,
    owner_count: i64,
) -> Result<(), RoleGuardError> {
    if member.user_id == actor_id {
        return Err(RoleGuardError::SelfRoleChange);
    }
    if member.role == WorkspaceRole::Owner
        && new_role != WorkspaceRole::Owner
        && owner_count <= 1
    {
        return Err(RoleGuardError::LastOwnerViolation);
    }
    Ok(())
}

/// Guard a removal against self-action and the last-owner invariant.
pub fn guard_removal(
    actor_id: Uuid,
    member: &WorkspaceMember,
    owner_count: i64,
) -> Result<(), RoleGuardError> {
    if member.user_id == actor_id {
        return Err(RoleGuardError::SelfRemoval);
    }
    if member.role == WorkspaceRole::Owner && owner_count <= 1 {
        return Err(RoleGuardError::LastOwnerViolation);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn member(user_id: Uuid, role: WorkspaceRole) -> WorkspaceMember {
        WorkspaceMember {
            id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            user_id,
            role,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn only_admins_and_owners_manage() {
        assert!(!can_manage(WorkspaceRole::Viewer));
        assert!(!can_manage(WorkspaceRole::Member));
        assert!(can_manage(WorkspaceRole::Admin));
        assert!(can_manage(WorkspaceRole::Owner));
    }

    #[test]
    fn self_role_change_is_rejected() {
        let actor = Uuid::new_v4();
        let target = member(actor, WorkspaceRole::Admin);
        assert_eq!(
            guard_role_change(actor, &target, WorkspaceRole::Member, 2),
            Err(RoleGuardError::SelfRoleChange)
        );
    }

    #[test]
    fn self_removal_is_rejected() {
        let actor = Uuid::new_v4();
        let target = member(actor, WorkspaceRole::Member);
        assert_eq!(
            guard_removal(actor, &target, 2),
            Err(RoleGuardError::SelfRemoval)
        );
    }

    // Workspace has two owners: demoting one succeeds, demoting the last fails.
    #[test]
    fn demoting_one_of_two_owners_succeeds() {
        let actor = Uuid::new_v4();
        let target = member(Uuid::new_v4(), WorkspaceRole::Owner);
        assert_eq!(
            guard_role_change(actor, &target, WorkspaceRole::Member, 2),
            Ok(())
        );
    }

    #[test]
    fn demoting_the_last_owner_fails() {
        let actor = Uuid::new_v4();
        let target = member(Uuid::new_v4(), WorkspaceRole::Owner);
        assert_eq!(
            guard_role_change(actor, &target, WorkspaceRole::Member, 1),
            Err(RoleGuardError::LastOwnerViolation)
        );
    }

    #[test]
    fn owner_to_owner_change_is_not_a_demotion() {
        let actor = Uuid::new_v4();
        let target = member(Uuid::new_v4(), WorkspaceRole::Owner);
        assert_eq!(
            guard_role_change(actor, &target, WorkspaceRole::Owner, 1),
            Ok(())
        );
    }

    #[test]
    fn removing_the_last_owner_fails() {
        let actor = Uuid::new_v4();
        let target = member(Uuid::new_v4(), WorkspaceRole::Owner);
        assert_eq!(
            guard_removal(actor, &target, 1),
            Err(RoleGuardError::LastOwnerViolation)
        );
    }

    #[test]
    fn removing_a_non_owner_ignores_owner_count() {
        let actor = Uuid::new_v4();
        let target = member(Uuid::new_v4(), WorkspaceRole::Viewer);
        assert_eq!(guard_removal(actor, &target, 1), Ok(()));
    }
}
