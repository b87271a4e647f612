//! Static payment link checkout.
//!
//! Hosted payment links need no API call: the user is sent to the link
//! with their ID attached as `client_reference_id`, which the provider
//! echoes back on the completed payment.

use async_trait::async_trait;
use url::Url;

use crate::error::{BillingError, BillingResult};
use crate::{CheckoutProvider, CheckoutSession};

/// `CheckoutProvider` backed by a fixed payment link.
#[derive(Debug, Clone)]
pub struct PaymentLinkCheckout {
    link: Url,
}

impl PaymentLinkCheckout {
    pub fn new(link: &str) -> BillingResult<Self> {
        Ok(Self {
            link: Url::parse(link)?,
        })
    }
}

#[async_trait]
impl CheckoutProvider for PaymentLinkCheckout {
    async fn create_checkout_session(&self, user_id: &str) -> BillingResult<CheckoutSession> {
        let mut url = self.link.clone();
        url.query_pairs_mut().append_pair("client_reference_id", user_id);

        Ok(CheckoutSession {
            id: format!("link:{}", user_id),
            url: url.to_string(),
        })
    }
}

/// Provider used when no checkout backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledCheckout;

#[async_trait]
impl CheckoutProvider for DisabledCheckout {
    async fn create_checkout_session(&self, user_id: &str) -> BillingResult<CheckoutSession> {
        Err(BillingError::not_configured(format!(
            "cannot create checkout for {}: set STRIPE_SECRET_KEY or PAYMENT_LINK_URL",
            user_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_link_carries_user() {
        let provider = PaymentLinkCheckout::new("https://buy.stripe.com/test_abc").unwrap();
        let session = provider.create_checkout_session("user 1").await.unwrap();
        assert_eq!(
            session.url,
            "https://buy.stripe.com/test_abc?client_reference_id=user+1"
        );
    }

    #[tokio::test]
    async fn test_disabled_checkout() {
        let err = DisabledCheckout.create_checkout_session("u1").await.unwrap_err();
        assert!(matches!(err, BillingError::NotConfigured(_)));
    }

    #[test]
    fn test_rejects_relative_link() {
        assert!(PaymentLinkCheckout::new("/pricing").is_err());
    }
}
