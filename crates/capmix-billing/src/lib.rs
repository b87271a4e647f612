//! Checkout session providers.
//!
//! When a user has neither a subscription nor free credits, the access
//! gate asks a `CheckoutProvider` for a URL the client can be redirected
//! to in order to subscribe.

pub mod error;
pub mod payment_link;
pub mod stripe;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::{BillingError, BillingResult};
pub use payment_link::{DisabledCheckout, PaymentLinkCheckout};
pub use stripe::{StripeCheckoutClient, StripeConfig};

/// A created checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Provider-side session identifier
    pub id: String,
    /// Where to send the user
    pub url: String,
}

/// Creates external payment checkout sessions.
#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    /// Start a subscription checkout for `user_id`.
    async fn create_checkout_session(&self, user_id: &str) -> BillingResult<CheckoutSession>;
}
