//! Stripe billing provider
//!
//! Talks to Stripe's REST API with the secret key. Unlike Polar, Stripe
//! supports direct cancellation: immediately via DELETE, or at period end
//! via `cancel_at_period_end`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use time::OffsetDateTime;

use crate::config::BillingConfig;
use crate::error::{BillingError, BillingResult};
use crate::provider::{BillingProvider, CheckoutParams, CheckoutRedirect, PortalRedirect};
use crate::subscription::{Subscription, SubscriptionStatus};

const STRIPE_API_URL: &str = "https://api.stripe.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct StripeBilling {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct StripeSessionResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct StripePrice {
    product: Option<String>,
    nickname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeSubscriptionItem {
    price: Option<StripePrice>,
}

#[derive(Debug, Deserialize)]
struct StripeSubscriptionItems {
    #[serde(default)]
    data: Vec<StripeSubscriptionItem>,
}

#[derive(Debug, Deserialize)]
struct StripeSubscription {
    id: String,
    status: String,
    current_period_start: Option<i64>,
    current_period_end: Option<i64>,
    #[serde(default)]
    cancel_at_period_end: bool,
    canceled_at: Option<i64>,
    #[serde(default)]
    items: Option<StripeSubscriptionItems>,
}

#[derive(Debug, Deserialize)]
struct StripeListResponse {
    #[serde(default)]
    data: Vec<StripeSubscription>,
}

impl StripeBilling {
    pub fn from_config(config: &BillingConfig) -> BillingResult<Self> {
        let secret_key = config
            .stripe_secret_key
            .clone()
            .ok_or_else(|| BillingError::Config("STRIPE_SECRET_KEY is not set".to_string()))?;
        Self::new(STRIPE_API_URL.to_string(), secret_key)
    }

    pub fn new(base_url: String, secret_key: String) -> BillingResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BillingError::Config(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            secret_key,
        })
    }

    fn classify_failure(status: StatusCode, body: &str) -> Option<BillingError> {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Some(BillingError::InvalidCredentials(format!(
                "stripe returned {}: {}",
                status.as_u16(),
                truncate(body)
            )));
        }
        if body.contains("api_key_expired") || body.contains("Invalid API Key") {
            return Some(BillingError::InvalidCredentials(truncate(body).to_string()));
        }
        None
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

fn epoch(ts: Option<i64>) -> Option<OffsetDateTime> {
    ts.and_then(|t| OffsetDateTime::from_unix_timestamp(t).ok())
}

fn normalize(sub: StripeSubscription) -> Subscription {
    let price = sub
        .items
        .and_then(|items| items.data.into_iter().next())
        .and_then(|item| item.price);

    Subscription {
        id: sub.id,
        status: SubscriptionStatus::parse(&sub.status),
        product_id: price.as_ref().and_then(|p| p.product.clone()),
        product_name: price.and_then(|p| p.nickname),
        current_period_start: epoch(sub.current_period_start),
        current_period_end: epoch(sub.current_period_end),
        cancel_at_period_end: sub.cancel_at_period_end,
        canceled_at: epoch(sub.canceled_at),
    }
}

#[async_trait]
impl BillingProvider for StripeBilling {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn checkout(&self, params: CheckoutParams) -> BillingResult<CheckoutRedirect> {
        let url = format!("{}/v1/checkout/sessions", self.base_url);
        let mut form = vec![
            ("mode".to_string(), "subscription".to_string()),
            ("line_items[0][price]".to_string(), params.product_id),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), params.success_url),
        ];
        if let Some(email) = params.customer_email {
            form.push(("customer_email".to_string(), email));
        }

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.secret_key, Option::<&str>::None)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if let Some(err) = Self::classify_failure(status, &text) {
                return Err(err);
            }
            return Err(BillingError::CheckoutFailed(format!(
                "stripe returned {}: {}",
                status.as_u16(),
                truncate(&text)
            )));
        }

        let session: StripeSessionResponse = response
            .json()
            .await
            .map_err(|e| BillingError::CheckoutFailed(e.to_string()))?;

        Ok(CheckoutRedirect { url: session.url })
    }

    async fn portal(&self) -> BillingResult<PortalRedirect> {
        let url = format!("{}/v1/billing_portal/sessions", self.base_url);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.secret_key, Option::<&str>::None)
            .form(&Vec::<(String, String)>::new())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if let Some(err) = Self::classify_failure(status, &text) {
                return Err(err);
            }
            return Err(BillingError::PortalFailed(format!(
                "stripe returned {}: {}",
                status.as_u16(),
                truncate(&text)
            )));
        }

        let session: StripeSessionResponse = response
            .json()
            .await
            .map_err(|e| BillingError::PortalFailed(e.to_string()))?;

        Ok(PortalRedirect { url: session.url })
    }

    async fn list_subscriptions(&self) -> BillingResult<Vec<Subscription>> {
        let url = format!("{}/v1/subscriptions?limit=100", self.base_url);

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.secret_key, Option::<&str>::None)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if let Some(err) = Self::classify_failure(status, &text) {
                return Err(err);
            }
            return Err(BillingError::ListSubscriptionsFailed(format!(
                "stripe returned {}: {}",
                status.as_u16(),
                truncate(&text)
            )));
        }

        let list: StripeListResponse = response
            .json()
            .await
            .map_err(|e| BillingError::ListSubscriptionsFailed(e.to_string()))?;

        Ok(list.data.into_iter().map(normalize).collect())
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        immediate: bool,
    ) -> BillingResult<()> {
        let response = if immediate {
            let url = format!("{}/v1/subscriptions/{}", self.base_url, subscription_id);
            self.client
                .delete(&url)
                .basic_auth(&self.secret_key, Option::<&str>::None)
                .send()
                .await?
        } else {
            let url = format!("{}/v1/subscriptions/{}", self.base_url, subscription_id);
            self.client
                .post(&url)
                .basic_auth(&self.secret_key, Option::<&str>::None)
                .form(&[("cancel_at_period_end", "true")])
                .send()
                .await?
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if let Some(err) = Self::classify_failure(status, &text) {
                return Err(err);
            }
            if status == StatusCode::NOT_FOUND {
                return Err(BillingError::Provider(format!(
                    "subscription {} not found",
                    subscription_id
                )));
            }
            return Err(BillingError::Provider(format!(
                "stripe returned {}: {}",
                status.as_u16(),
                truncate(&text)
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn provider(server: &mockito::ServerGuard) -> StripeBilling {
        StripeBilling::new(server.url(), "sk_test_key".to_string()).unwrap()
    }

    #[tokio::test]
    async fn revoked_key_classified_as_invalid_credentials() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/subscriptions?limit=100")
            .with_status(401)
            .with_body(r#"{"error":{"message":"Invalid API Key provided"}}"#)
            .create_async()
            .await;

        let err = provider(&server).list_subscriptions().await.unwrap_err();
        assert_eq!(err.code(), "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn epoch_timestamps_normalize() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/subscriptions?limit=100")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                  "data": [{
                    "id": "sub_abc",
                    "status": "trialing",
                    "current_period_start": 1756684800,
                    "current_period_end": 1759276800,
                    "cancel_at_period_end": true,
                    "canceled_at": null,
                    "items": {"data": [{"price": {"product": "prod_1", "nickname": "Pro"}}]}
                  }]
                }"#,
            )
            .create_async()
            .await;

        let subs = provider(&server).list_subscriptions().await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].status, SubscriptionStatus::Trialing);
        assert!(subs[0].cancel_at_period_end);
        assert!(subs[0].current_period_start.is_some());
        assert_eq!(subs[0].product_id.as_deref(), Some("prod_1"));
    }

    #[tokio::test]
    async fn immediate_cancel_uses_delete() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/v1/subscriptions/sub_abc")
            .with_status(200)
            .with_body(r#"{"id":"sub_abc","status":"canceled"}"#)
            .create_async()
            .await;

        provider(&server)
            .cancel_subscription("sub_abc", true)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn period_end_cancel_flags_instead_of_deleting() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/subscriptions/sub_abc")
            .with_status(200)
            .with_body(r#"{"id":"sub_abc","cancel_at_period_end":true}"#)
            .create_async()
            .await;

        provider(&server)
            .cancel_subscription("sub_abc", false)
            .await
            .unwrap();
        mock.assert_async().await;
    }
}
