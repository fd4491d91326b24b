#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! opshq API server library
//!
//! Back-office core for a multi-tenant SaaS: workspace membership and
//! invitations, platform admin operations with impersonation, and a
//! provider-agnostic billing surface.

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod state;
pub mod workspace;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
