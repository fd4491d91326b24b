//! Shared infrastructure for the opshq workspace
//!
//! Database pool construction, embedded migrations, and pagination
//! clamping used by the API server.

pub mod db;
pub mod pagination;

pub use db::{create_migration_pool, create_pool, run_migrations};
pub use pagination::{clamp_page, clamp_limit, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
