#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! opshq billing
//!
//! Provider-agnostic billing for the back office. The surface is a single
//! capability trait ([`BillingProvider`]) with one implementation active per
//! process: Disabled (billing off or config invalid), Polar, or Stripe.
//! Selection happens once at startup from the validated environment config;
//! the rest of the system holds the provider behind `Arc<dyn BillingProvider>`
//! and behaves identically whichever implementation is live.

pub mod config;
pub mod disabled;
pub mod error;
pub mod polar;
pub mod provider;
pub mod stripe;
pub mod subscription;

pub use config::{BillingConfig, BillingMode, BillingProviderKind, BillingStatus, ConfigCheck};
pub use disabled::DisabledBilling;
pub use error::{BillingError, BillingResult};
pub use polar::PolarBilling;
pub use provider::{
    select_provider, BillingProvider, CheckoutParams, CheckoutRedirect, PortalRedirect,
};
pub use stripe::StripeBilling;
pub use subscription::{Subscription, SubscriptionStatus};
