//! Billing provider capability interface
//!
//! Exactly one implementation is active per process, selected once at
//! startup from the validated config and injected into application state.
//! Callers never branch on which backend is behind the trait object.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{BillingConfig, BillingProviderKind};
use crate::disabled::DisabledBilling;
use crate::error::BillingResult;
use crate::polar::PolarBilling;
use crate::stripe::StripeBilling;
use crate::subscription::Subscription;

/// Parameters for creating a checkout session.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutParams {
    /// Provider-side product or price identifier.
    pub product_id: String,
    /// Where the backend should send the customer after payment.
    pub success_url: String,
    /// Email to prefill on the hosted page.
    pub customer_email: Option<String>,
}

/// Result of creating a checkout session.
///
/// The URL is best-effort metadata: in practice the caller redirects
/// immediately, so nothing guarantees it is ever fetched.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRedirect {
    pub url: String,
}

/// Result of creating a customer portal session.
#[derive(Debug, Clone, Serialize)]
pub struct PortalRedirect {
    pub url: String,
}

/// Capability set every payment backend (or its absence) must provide.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Whether real billing operations are available.
    fn is_enabled(&self) -> bool;

    /// Create a hosted checkout session and return its redirect URL.
    async fn checkout(&self, params: CheckoutParams) -> BillingResult<CheckoutRedirect>;

    /// Create a customer portal session and return its redirect URL.
    async fn portal(&self) -> BillingResult<PortalRedirect>;

    /// List subscriptions, normalized into [`Subscription`] records.
    ///
    /// Authentication failures must surface as
    /// [`BillingError::InvalidCredentials`](crate::BillingError::InvalidCredentials),
    /// never as a generic failure.
    async fn list_subscriptions(&self) -> BillingResult<Vec<Subscription>>;

    /// Cancel a subscription, immediately or at period end.
    ///
    /// Providers that only cancel through their hosted portal fail with
    /// [`BillingError::CancelNotSupported`](crate::BillingError::CancelNotSupported).
    async fn cancel_subscription(&self, subscription_id: &str, immediate: bool)
        -> BillingResult<()>;
}

/// Select the active provider from a validated config.
///
/// Disabled or invalid configs both degrade to [`DisabledBilling`]; the
/// invalidity has already been logged by
/// [`BillingConfig::log_startup`](crate::BillingConfig::log_startup).
pub fn select_provider(config: &BillingConfig) -> Arc<dyn BillingProvider> {
    let check = config.validate();
    if !config.enabled || !check.valid {
        return Arc::new(DisabledBilling);
    }

    match config.provider {
        BillingProviderKind::None => Arc::new(DisabledBilling),
        BillingProviderKind::Polar => match PolarBilling::from_config(config) {
            Ok(provider) => Arc::new(provider),
            Err(e) => {
                tracing::warn!(error = %e, "failed to construct polar provider, billing disabled");
                Arc::new(DisabledBilling)
            }
        },
        BillingProviderKind::Stripe => match StripeBilling::from_config(config) {
            Ok(provider) => Arc::new(provider),
            Err(e) => {
                tracing::warn!(error = %e, "failed to construct stripe provider, billing disabled");
                Arc::new(DisabledBilling)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BillingMode;

    #[test]
    fn disabled_config_selects_disabled_provider() {
        let provider = select_provider(&BillingConfig::disabled());
        assert!(!provider.is_enabled());
    }

    #[test]
    fn invalid_config_degrades_to_disabled() {
        // Enabled with provider selected but mandatory secret missing.
        let config = BillingConfig {
            enabled: true,
            provider: BillingProviderKind::Polar,
            ..BillingConfig::disabled()
        };
        let provider = select_provider(&config);
        assert!(!provider.is_enabled());
    }

    #[test]
    fn valid_polar_config_selects_enabled_provider() {
        let config = BillingConfig {
            enabled: true,
            provider: BillingProviderKind::Polar,
            mode: BillingMode::Sandbox,
            polar_access_token: Some("polar_at_test".into()),
            ..BillingConfig::disabled()
        };
        let provider = select_provider(&config);
        assert!(provider.is_enabled());
    }

    #[test]
    fn valid_stripe_config_selects_enabled_provider() {
        let config = BillingConfig {
            enabled: true,
            provider: BillingProviderKind::Stripe,
            stripe_secret_key: Some("sk_test_x".into()),
            ..BillingConfig::disabled()
        };
        let provider = select_provider(&config);
        assert!(provider.is_enabled());
    }
}
