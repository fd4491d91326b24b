//! Billing error taxonomy
//!
//! Every provider failure is classified into one of these variants so the
//! API layer can surface a stable machine code to the caller instead of a
//! raw backend message.

use thiserror::Error;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, Error)]
pub enum BillingError {
    /// Billing is disabled or the configuration is invalid; every mutating
    /// call on the disabled provider fails with this.
    #[error("billing is not enabled")]
    NotEnabled,

    /// The payment backend rejected our credentials (expired, revoked, or
    /// invalid secret). Distinct from generic failures so operators can
    /// tell a rotation problem from an outage.
    #[error("payment provider rejected credentials: {0}")]
    InvalidCredentials(String),

    /// Creating a checkout session failed.
    #[error("checkout failed: {0}")]
    CheckoutFailed(String),

    /// Creating a customer portal session failed.
    #[error("portal session failed: {0}")]
    PortalFailed(String),

    /// Listing subscriptions failed for a non-credential reason.
    #[error("listing subscriptions failed: {0}")]
    ListSubscriptionsFailed(String),

    /// The active provider delegates cancellation to its hosted portal and
    /// has no direct cancel API. Valid terminal behavior, not an outage.
    #[error("subscription cancellation is not supported by this provider")]
    CancelNotSupported,

    /// The backend call exceeded its time bound.
    #[error("payment provider timed out")]
    Timeout,

    /// Configuration problem detected after startup validation.
    #[error("billing configuration error: {0}")]
    Config(String),

    /// Anything else the backend returned that we could not classify.
    #[error("payment provider error: {0}")]
    Provider(String),
}

impl BillingError {
    /// Stable machine code surfaced in API error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::NotEnabled => "BILLING_NOT_ENABLED",
            BillingError::InvalidCredentials(_) => "INVALID_CREDENTIALS",
            BillingError::CheckoutFailed(_) => "CHECKOUT_FAILED",
            BillingError::PortalFailed(_) => "PORTAL_FAILED",
            BillingError::ListSubscriptionsFailed(_) => "LIST_SUBSCRIPTIONS_FAILED",
            BillingError::CancelNotSupported => "CANCEL_NOT_SUPPORTED",
            BillingError::Timeout => "PROVIDER_TIMEOUT",
            BillingError::Config(_) => "BILLING_CONFIG_ERROR",
            BillingError::Provider(_) => "PROVIDER_ERROR",
        }
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BillingError::Timeout
        } else {
            BillingError::Provider(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(BillingError::NotEnabled.code(), "BILLING_NOT_ENABLED");
        assert_eq!(
            BillingError::InvalidCredentials("expired".into()).code(),
            "INVALID_CREDENTIALS"
        );
        assert_eq!(BillingError::CancelNotSupported.code(), "CANCEL_NOT_SUPPORTED");
        assert_eq!(BillingError::Timeout.code(), "PROVIDER_TIMEOUT");
    }
}
