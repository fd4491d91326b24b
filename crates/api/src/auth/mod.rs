//! Authentication, sessions, and impersonation

pub mod impersonation;
pub mod middleware;
pub mod sessions;

pub use impersonation::{start_impersonation, stop_impersonation};
pub use middleware::{require_admin, require_auth, AuthState, AuthUser};
pub use sessions::{SessionRecord, IMPERSONATION_TTL};
