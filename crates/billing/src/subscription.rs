//! Normalized subscription model
//!
//! Payment backends each have their own subscription shape; providers
//! normalize into this record so the rest of the system never branches on
//! which backend is active. The provider owns the data; we only read it.

use serde::Serialize;
use time::OffsetDateTime;

/// Lifecycle status of a subscription, normalized across backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    Incomplete,
    IncompleteExpired,
    PastDue,
    Trialing,
    Unpaid,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Unpaid => "unpaid",
        }
    }

    /// Parse a backend status string. Unknown values map to `Unpaid` rather
    /// than failing the whole listing; the raw value is logged by callers.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "active" => SubscriptionStatus::Active,
            "canceled" | "cancelled" => SubscriptionStatus::Canceled,
            "incomplete" => SubscriptionStatus::Incomplete,
            "incomplete_expired" => SubscriptionStatus::IncompleteExpired,
            "past_due" => SubscriptionStatus::PastDue,
            "trialing" => SubscriptionStatus::Trialing,
            "unpaid" => SubscriptionStatus::Unpaid,
            other => {
                tracing::warn!(status = other, "unknown subscription status from provider");
                SubscriptionStatus::Unpaid
            }
        }
    }
}

/// A subscription as surfaced to the API layer.
#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    /// Provider-side subscription id.
    pub id: String,
    pub status: SubscriptionStatus,
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub current_period_start: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub current_period_end: Option<OffsetDateTime>,
    pub cancel_at_period_end: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub canceled_at: Option<OffsetDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_known_values() {
        for raw in [
            "active",
            "canceled",
            "incomplete",
            "incomplete_expired",
            "past_due",
            "trialing",
            "unpaid",
        ] {
            assert_eq!(SubscriptionStatus::parse(raw).as_str(), raw);
        }
    }

    #[test]
    fn british_spelling_normalizes() {
        assert_eq!(
            SubscriptionStatus::parse("cancelled"),
            SubscriptionStatus::Canceled
        );
    }

    #[test]
    fn unknown_status_degrades_to_unpaid() {
        assert_eq!(
            SubscriptionStatus::parse("paused"),
            SubscriptionStatus::Unpaid
        );
    }
}
