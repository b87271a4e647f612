//! Access ledger entries and admission outcomes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Per-user credit and subscription record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LedgerEntry {
    /// User identifier
    pub user_id: String,
    /// Remaining free composition jobs
    #[serde(default)]
    pub free_credits: u32,
    /// Active subscription (unlimited jobs)
    #[serde(default)]
    pub subscribed: bool,
}

impl LedgerEntry {
    pub fn new(user_id: impl Into<String>, free_credits: u32, subscribed: bool) -> Self {
        Self {
            user_id: user_id.into(),
            free_credits,
            subscribed,
        }
    }
}

/// Why a job was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "basis", rename_all = "snake_case")]
pub enum AdmissionBasis {
    /// Subscribed user; no credit consumed
    Subscription,
    /// One free credit consumed
    Credit { remaining: u32 },
}

/// Outcome of the access gate.
///
/// `PaymentRequired` is a regular outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    Admitted(AdmissionBasis),
    PaymentRequired { checkout_url: String },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted(_))
    }

    /// Checkout URL for denied jobs.
    pub fn checkout_url(&self) -> Option<&str> {
        match self {
            Admission::PaymentRequired { checkout_url } => Some(checkout_url),
            Admission::Admitted(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_helpers() {
        let admitted = Admission::Admitted(AdmissionBasis::Credit { remaining: 2 });
        assert!(admitted.is_admitted());
        assert!(admitted.checkout_url().is_none());

        let denied = Admission::PaymentRequired {
            checkout_url: "https://checkout.example/s/1".to_string(),
        };
        assert!(!denied.is_admitted());
        assert_eq!(denied.checkout_url(), Some("https://checkout.example/s/1"));
    }

    #[test]
    fn test_ledger_entry_deserialize_defaults() {
        let entry: LedgerEntry = serde_json::from_str(r#"{"user_id":"u1"}"#).unwrap();
        assert_eq!(entry, LedgerEntry::new("u1", 0, false));
    }
}
