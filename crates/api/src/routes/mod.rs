//! HTTP routes
//!
//! Handlers are thin orchestration: resolve the actor, run the guard, run
//! the mutation, map to the uniform response envelope. Nothing below the
//! handler layer knows about HTTP.

pub mod admin;
pub mod billing;
pub mod workspaces;

use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;

use crate::auth::require_auth;
use crate::state::AppState;

/// Uniform success envelope; errors use the mirror shape via `ApiError`.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
    })
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    let authed = Router::new()
        // Platform admin surface
        .route("/admin/users", get(admin::list_users).post(admin::create_user))
        .route(
            "/admin/users/{id}",
            patch(admin::update_user).delete(admin::delete_user),
        )
        .route("/admin/users/{id}/impersonate", post(admin::impersonate_user))
        .route("/admin/stop-impersonating", post(admin::stop_impersonating))
        .route("/admin/workspaces", post(admin::create_workspace))
        .route(
            "/admin/workspaces/{id}",
            patch(admin::update_workspace).delete(admin::delete_workspace),
        )
        // Self-service workspace surface
        .route(
            "/workspaces",
            get(workspaces::list_my_workspaces).post(workspaces::create_workspace),
        )
        .route(
            "/workspaces/{id}",
            patch(workspaces::update_workspace).delete(workspaces::delete_workspace),
        )
        .route("/workspaces/{id}/members", get(workspaces::list_members))
        .route(
            "/workspaces/{id}/members/{member_id}/role",
            patch(workspaces::update_member_role),
        )
        .route(
            "/workspaces/{id}/members/{member_id}",
            delete(workspaces::remove_member),
        )
        .route(
            "/workspaces/{id}/invitations",
            get(workspaces::list_invitations).post(workspaces::invite_member),
        )
        .route(
            "/workspaces/{id}/invitations/{invitation_id}",
            delete(workspaces::cancel_invitation),
        )
        .route("/invitations/accept", post(workspaces::accept_invitation))
        // Billing surface
        .route("/billing/checkout", post(billing::checkout))
        .route("/billing/portal", post(billing::portal))
        .route("/billing/subscriptions", get(billing::list_subscriptions))
        .route(
            "/billing/subscriptions/{id}/cancel",
            post(billing::cancel_subscription),
        )
        .layer(middleware::from_fn_with_state(auth_state, require_auth));

    Router::new()
        .route("/health", get(health))
        // Billing status is client-safe: presence flags only, no secrets.
        .route("/billing/status", get(billing::billing_status))
        .merge(authed)
        .with_state(state)
}
