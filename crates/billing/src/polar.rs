//! Polar billing provider
//!
//! Talks to Polar's REST API with a bearer access token. Sandbox and
//! production differ only by base URL. Cancellation is portal-only on this
//! provider: customers cancel through the hosted portal, so
//! `cancel_subscription` fails with the distinct `CancelNotSupported` code.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use time::OffsetDateTime;

use crate::config::{BillingConfig, BillingMode};
use crate::error::{BillingError, BillingResult};
use crate::provider::{BillingProvider, CheckoutParams, CheckoutRedirect, PortalRedirect};
use crate::subscription::{Subscription, SubscriptionStatus};

const POLAR_PRODUCTION_URL: &str = "https://api.polar.sh";
const POLAR_SANDBOX_URL: &str = "https://sandbox-api.polar.sh";

/// Per-call time bound for backend requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct PolarBilling {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
    organization_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PolarCheckoutResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct PolarCustomerSessionResponse {
    customer_portal_url: String,
}

#[derive(Debug, Deserialize)]
struct PolarProduct {
    id: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PolarSubscription {
    id: String,
    status: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    current_period_start: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    current_period_end: Option<OffsetDateTime>,
    #[serde(default)]
    cancel_at_period_end: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    canceled_at: Option<OffsetDateTime>,
    product: Option<PolarProduct>,
}

#[derive(Debug, Deserialize)]
struct PolarListResponse {
    items: Vec<PolarSubscription>,
}

impl PolarBilling {
    pub fn from_config(config: &BillingConfig) -> BillingResult<Self> {
        let access_token = config
            .polar_access_token
            .clone()
            .ok_or_else(|| BillingError::Config("POLAR_ACCESS_TOKEN is not set".to_string()))?;

        let base_url = match config.mode {
            BillingMode::Production => POLAR_PRODUCTION_URL,
            BillingMode::Sandbox => POLAR_SANDBOX_URL,
        };

        Self::new(base_url.to_string(), access_token, config.polar_organization_id.clone())
    }

    pub fn new(
        base_url: String,
        access_token: String,
        organization_id: Option<String>,
    ) -> BillingResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BillingError::Config(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            access_token,
            organization_id,
        })
    }

    /// Classify an error response from Polar.
    ///
    /// 401/403 mean the access token is expired, revoked, or wrong; that is
    /// an operator problem, not a backend outage, and gets its own code.
    fn classify_failure(status: StatusCode, body: &str) -> Option<BillingError> {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Some(BillingError::InvalidCredentials(format!(
                "polar returned {}: {}",
                status.as_u16(),
                truncate(body)
            )));
        }
        if body.contains("invalid_token") || body.contains("token_expired") {
            return Some(BillingError::InvalidCredentials(truncate(body).to_string()));
        }
        None
    }
}

fn truncate(body: &str) -> &str {
    // Error bodies can embed request echoes; keep logs bounded.
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

fn normalize(sub: PolarSubscription) -> Subscription {
    Subscription {
        id: sub.id,
        status: SubscriptionStatus::parse(&sub.status),
        product_id: sub.product.as_ref().map(|p| p.id.clone()),
        product_name: sub.product.and_then(|p| p.name),
        current_period_start: sub.current_period_start,
        current_period_end: sub.current_period_end,
        cancel_at_period_end: sub.cancel_at_period_end,
        canceled_at: sub.canceled_at,
    }
}

#[async_trait]
impl BillingProvider for PolarBilling {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn checkout(&self, params: CheckoutParams) -> BillingResult<CheckoutRedirect> {
        let url = format!("{}/v1/checkouts/", self.base_url);
        let mut body = serde_json::json!({
            "products": [params.product_id],
            "success_url": params.success_url,
        });
        if let Some(email) = &params.customer_email {
            body["customer_email"] = serde_json::json!(email);
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if let Some(err) = Self::classify_failure(status, &text) {
                return Err(err);
            }
            return Err(BillingError::CheckoutFailed(format!(
                "polar returned {}: {}",
                status.as_u16(),
                truncate(&text)
            )));
        }

        let checkout: PolarCheckoutResponse = response
            .json()
            .await
            .map_err(|e| BillingError::CheckoutFailed(e.to_string()))?;

        Ok(CheckoutRedirect { url: checkout.url })
    }

    async fn portal(&self) -> BillingResult<PortalRedirect> {
        let url = format!("{}/v1/customer-sessions/", self.base_url);
        let mut body = serde_json::json!({});
        if let Some(org_id) = &self.organization_id {
            body["organization_id"] = serde_json::json!(org_id);
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if let Some(err) = Self::classify_failure(status, &text) {
                return Err(err);
            }
            return Err(BillingError::PortalFailed(format!(
                "polar returned {}: {}",
                status.as_u16(),
                truncate(&text)
            )));
        }

        let session: PolarCustomerSessionResponse = response
            .json()
            .await
            .map_err(|e| BillingError::PortalFailed(e.to_string()))?;

        Ok(PortalRedirect {
            url: session.customer_portal_url,
        })
    }

    async fn list_subscriptions(&self) -> BillingResult<Vec<Subscription>> {
        let mut url = format!("{}/v1/subscriptions/?active=true", self.base_url);
        if let Some(org_id) = &self.organization_id {
            url.push_str(&format!("&organization_id={}", org_id));
        }

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if let Some(err) = Self::classify_failure(status, &text) {
                return Err(err);
            }
            return Err(BillingError::ListSubscriptionsFailed(format!(
                "polar returned {}: {}",
                status.as_u16(),
                truncate(&text)
            )));
        }

        let list: PolarListResponse = response
            .json()
            .await
            .map_err(|e| BillingError::ListSubscriptionsFailed(e.to_string()))?;

        Ok(list.items.into_iter().map(normalize).collect())
    }

    async fn cancel_subscription(
        &self,
        _subscription_id: &str,
        _immediate: bool,
    ) -> BillingResult<()> {
        // Polar cancellations go through the hosted customer portal.
        Err(BillingError::CancelNotSupported)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn provider(server: &mockito::ServerGuard) -> PolarBilling {
        PolarBilling::new(server.url(), "polar_at_test".to_string(), Some("org_1".into())).unwrap()
    }

    #[tokio::test]
    async fn expired_token_classified_as_invalid_credentials() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Regex(r"^/v1/subscriptions/.*$".to_string()))
            .with_status(401)
            .with_body(r#"{"error":"invalid_token","error_description":"token expired"}"#)
            .create_async()
            .await;

        let err = provider(&server).list_subscriptions().await.unwrap_err();
        assert_eq!(err.code(), "INVALID_CREDENTIALS");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_is_a_generic_list_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex(r"^/v1/subscriptions/.*$".to_string()))
            .with_status(500)
            .with_body("internal error")
            .create_async()
            .await;

        let err = provider(&server).list_subscriptions().await.unwrap_err();
        assert_eq!(err.code(), "LIST_SUBSCRIPTIONS_FAILED");
    }

    #[tokio::test]
    async fn subscriptions_normalize_into_canonical_records() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex(r"^/v1/subscriptions/.*$".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                  "items": [{
                    "id": "sub_123",
                    "status": "active",
                    "current_period_start": "2026-08-01T00:00:00Z",
                    "current_period_end": "2026-09-01T00:00:00Z",
                    "cancel_at_period_end": false,
                    "canceled_at": null,
                    "product": {"id": "prod_9", "name": "Team Plan"}
                  }]
                }"#,
            )
            .create_async()
            .await;

        let subs = provider(&server).list_subscriptions().await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].id, "sub_123");
        assert_eq!(subs[0].status, SubscriptionStatus::Active);
        assert_eq!(subs[0].product_name.as_deref(), Some("Team Plan"));
        assert!(!subs[0].cancel_at_period_end);
    }

    #[tokio::test]
    async fn checkout_surfaces_redirect_url() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/checkouts/")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"url": "https://polar.sh/checkout/cs_test"}"#)
            .create_async()
            .await;

        let redirect = provider(&server)
            .checkout(CheckoutParams {
                product_id: "prod_9".into(),
                success_url: "https://app.example.com/billing/done".into(),
                customer_email: Some("owner@example.com".into()),
            })
            .await
            .unwrap();
        assert_eq!(redirect.url, "https://polar.sh/checkout/cs_test");
    }

    #[tokio::test]
    async fn cancel_is_portal_only() {
        let server = mockito::Server::new_async().await;
        let err = provider(&server)
            .cancel_subscription("sub_123", true)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CANCEL_NOT_SUPPORTED");
    }
}
