//! Disabled billing provider
//!
//! Active when billing is turned off or the configuration failed
//! validation. Mutating calls fail with `NotEnabled`; listing returns an
//! empty set so the UI renders an empty state without special-casing.

use async_trait::async_trait;

use crate::error::{BillingError, BillingResult};
use crate::provider::{BillingProvider, CheckoutParams, CheckoutRedirect, PortalRedirect};
use crate::subscription::Subscription;

pub struct DisabledBilling;

#[async_trait]
impl BillingProvider for DisabledBilling {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn checkout(&self, _params: CheckoutParams) -> BillingResult<CheckoutRedirect> {
        Err(BillingError::NotEnabled)
    }

    async fn portal(&self) -> BillingResult<PortalRedirect> {
        Err(BillingError::NotEnabled)
    }

    async fn list_subscriptions(&self) -> BillingResult<Vec<Subscription>> {
        Ok(Vec::new())
    }

    async fn cancel_subscription(
        &self,
        _subscription_id: &str,
        _immediate: bool,
    ) -> BillingResult<()> {
        Err(BillingError::NotEnabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listing_returns_empty_instead_of_failing() {
        let provider = DisabledBilling;
        let subs = provider.list_subscriptions().await.unwrap();
        assert!(subs.is_empty());
    }

    #[tokio::test]
    async fn mutating_calls_fail_with_not_enabled() {
        let provider = DisabledBilling;

        let checkout = provider
            .checkout(CheckoutParams {
                product_id: "prod_x".into(),
                success_url: "https://app.example.com/done".into(),
                customer_email: None,
            })
            .await;
        assert!(matches!(checkout, Err(BillingError::NotEnabled)));

        let portal = provider.portal().await;
        assert!(matches!(portal, Err(BillingError::NotEnabled)));

        let cancel = provider.cancel_subscription("sub_x", true).await;
        assert!(matches!(cancel, Err(BillingError::NotEnabled)));
    }
}
