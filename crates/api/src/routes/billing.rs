//! Billing routes
//!
//! Handlers call the injected provider through its trait; which backend is
//! active never matters here. Every provider call runs under a hard
//! deadline so a slow payment backend cannot pin a request handler.

use std::time::Duration;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde::Deserialize;

use opshq_billing::{
    BillingError, BillingStatus, CheckoutParams, CheckoutRedirect, PortalRedirect, Subscription,
};

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    routes::{ok, Envelope},
    state::AppState,
};

/// Hard deadline for any single provider call, over and above the HTTP
/// client's own timeout.
const PROVIDER_DEADLINE: Duration = Duration::from_secs(20);

async fn with_deadline<T, F>(fut: F) -> ApiResult<T>
where
    F: std::future::Future<Output = Result<T, BillingError>>,
{
    match tokio::time::timeout(PROVIDER_DEADLINE, fut).await {
        Ok(result) => result.map_err(ApiError::Provider),
        Err(_) => Err(ApiError::Provider(BillingError::Timeout)),
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub product_id: String,
    pub success_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelSubscriptionRequest {
    /// Cancel now rather than at period end. Defaults to period end.
    #[serde(default)]
    pub immediate: bool,
}

/// Public billing status: presence flags and mode only, no secret values.
pub async fn billing_status(
    State(state): State<AppState>,
) -> ApiResult<Json<Envelope<BillingStatus>>> {
    Ok(ok(state.config.billing.status()))
}

/// Create a hosted checkout session for the current user.
pub async fn checkout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(request): Json<CheckoutRequest>,
) -> ApiResult<Json<Envelope<CheckoutRedirect>>> {
    if request.product_id.trim().is_empty() {
        return Err(ApiError::Validation("product_id is required".to_string()));
    }

    let params = CheckoutParams {
        product_id: request.product_id,
        success_url: request.success_url,
        customer_email: Some(auth_user.email.clone()),
    };

    let redirect = with_deadline(state.billing.checkout(params)).await?;

    tracing::info!(user_id = %auth_user.user_id, "checkout session created");
    Ok(ok(redirect))
}

/// Create a customer portal session.
pub async fn portal(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Envelope<PortalRedirect>>> {
    let redirect = with_deadline(state.billing.portal()).await?;

    tracing::info!(user_id = %auth_user.user_id, "portal session created");
    Ok(ok(redirect))
}

/// List subscriptions from the active provider.
///
/// With billing disabled this is an empty list, not an error; the
/// subscription page renders the same either way.
pub async fn list_subscriptions(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Envelope<Vec<Subscription>>>> {
    let subscriptions = with_deadline(state.billing.list_subscriptions()).await?;
    Ok(ok(subscriptions))
}

/// Cancel a subscription, at period end unless `immediate` is set.
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(subscription_id): Path<String>,
    Json(request): Json<CancelSubscriptionRequest>,
) -> ApiResult<Json<Envelope<serde_json::Value>>> {
    if subscription_id.trim().is_empty() {
        return Err(ApiError::Validation("subscription id is required".to_string()));
    }

    with_deadline(state.billing.cancel_subscription(&subscription_id, request.immediate)).await?;

    tracing::info!(
        user_id = %auth_user.user_id,
        immediate = request.immediate,
        "subscription canceled"
    );
    Ok(ok(serde_json::json!({ "canceled": true })))
}
