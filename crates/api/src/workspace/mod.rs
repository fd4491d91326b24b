//! Workspace domain: role model, membership, invitations

pub mod invitations;
pub mod members;
pub mod roles;

pub use roles::{can_manage, guard_removal, guard_role_change, RoleGuardError};
