//! Stripe Checkout client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{BillingError, BillingResult};
use crate::{CheckoutProvider, CheckoutSession};

const SESSIONS_PATH: &str = "/v1/checkout/sessions";

/// Configuration for the Stripe Checkout client.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Secret API key (`sk_...`)
    pub secret_key: String,
    /// Recurring price the checkout subscribes to
    pub price_id: String,
    /// Redirect after a completed checkout
    pub success_url: String,
    /// Redirect after an abandoned checkout
    pub cancel_url: String,
    /// API base URL; overridable for tests
    pub api_base: String,
    /// Request timeout
    pub timeout: Duration,
}

impl StripeConfig {
    pub fn new(secret_key: impl Into<String>, price_id: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            price_id: price_id.into(),
            success_url: "http://localhost:8080/billing/success".to_string(),
            cancel_url: "http://localhost:8080/billing/cancel".to_string(),
            api_base: "https://api.stripe.com".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Create config from environment variables.
    ///
    /// Returns `NotConfigured` when `STRIPE_SECRET_KEY` is unset, so
    /// callers can fall back to another provider.
    pub fn from_env() -> BillingResult<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| BillingError::not_configured("STRIPE_SECRET_KEY not set"))?;
        let price_id = std::env::var("STRIPE_PRICE_ID")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| BillingError::not_configured("STRIPE_PRICE_ID not set"))?;

        let defaults = Self::new(secret_key, price_id);
        let config = Self {
            success_url: std::env::var("CHECKOUT_SUCCESS_URL").unwrap_or(defaults.success_url.clone()),
            cancel_url: std::env::var("CHECKOUT_CANCEL_URL").unwrap_or(defaults.cancel_url.clone()),
            api_base: std::env::var("STRIPE_API_BASE").unwrap_or(defaults.api_base.clone()),
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that every URL is absolute.
    pub fn validate(&self) -> BillingResult<()> {
        Url::parse(&self.success_url)?;
        Url::parse(&self.cancel_url)?;
        Url::parse(&self.api_base)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Creates hosted subscription checkouts through the Stripe API.
pub struct StripeCheckoutClient {
    http: Client,
    config: StripeConfig,
}

impl StripeCheckoutClient {
    pub fn new(config: StripeConfig) -> BillingResult<Self> {
        config.validate()?;
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> BillingResult<Self> {
        Self::new(StripeConfig::from_env()?)
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    fn form<'a>(&'a self, user_id: &'a str) -> Vec<(&'static str, &'a str)> {
        vec![
            ("mode", "subscription"),
            ("line_items[0][price]", self.config.price_id.as_str()),
            ("line_items[0][quantity]", "1"),
            ("client_reference_id", user_id),
            ("metadata[user_id]", user_id),
            ("success_url", self.config.success_url.as_str()),
            ("cancel_url", self.config.cancel_url.as_str()),
        ]
    }
}

#[async_trait]
impl CheckoutProvider for StripeCheckoutClient {
    async fn create_checkout_session(&self, user_id: &str) -> BillingResult<CheckoutSession> {
        let url = format!("{}{}", self.config.api_base.trim_end_matches('/'), SESSIONS_PATH);
        debug!(user_id = %user_id, "Creating checkout session");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .form(&self.form(user_id))
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorEnvelope>(&body)
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned());
            warn!(status = status.as_u16(), user_id = %user_id, "Checkout session request failed");
            return Err(BillingError::provider(status.as_u16(), message));
        }

        let session: SessionResponse = serde_json::from_slice(&body)?;
        let session_url = session
            .url
            .ok_or_else(|| BillingError::InvalidResponse(format!("session {} has no url", session.id)))?;
        Url::parse(&session_url)?;

        info!(user_id = %user_id, session_id = %session.id, "Created checkout session");
        Ok(CheckoutSession {
            id: session.id,
            url: session_url,
        })
    }
}
