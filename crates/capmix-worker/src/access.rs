//! Access gate.
//!
//! Admission and the credit decrement are one ledger operation: a
//! `CreditLedger` decides and writes atomically, so concurrent jobs for
//! the same user can never spend the last credit twice. A checkout
//! session is only requested once the ledger reports exhaustion.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use capmix_billing::CheckoutProvider;
use capmix_firestore::{ConsumeOutcome, FirestoreError, LedgerRepository};
use capmix_models::{Admission, AdmissionBasis, LedgerEntry};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics::record_admission;

/// Result of one atomic admit-and-decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumption {
    /// Subscribed; balance untouched
    Subscribed,
    /// One credit taken
    Consumed { remaining: u32 },
    /// No credits; balance untouched
    Exhausted,
}

/// Per-user credit store.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Decide admission and take a credit if one is needed, atomically.
    ///
    /// Fails with `UnknownUser` when the user has no entry.
    async fn try_consume(&self, user_id: &str) -> WorkerResult<Consumption>;

    /// Current entry for a user.
    async fn entry(&self, user_id: &str) -> WorkerResult<Option<LedgerEntry>>;
}

/// Process-local ledger behind a single mutex.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    entries: Mutex<HashMap<String, LedgerEntry>>,
}

impl InMemoryLedger {
    pub fn new(entries: impl IntoIterator<Item = LedgerEntry>) -> Self {
        Self {
            entries: Mutex::new(entries.into_iter().map(|e| (e.user_id.clone(), e)).collect()),
        }
    }

    /// Seed from a JSON array of ledger entries.
    pub fn from_json(json: &str) -> WorkerResult<Self> {
        let entries: Vec<LedgerEntry> = serde_json::from_str(json)
            .map_err(|e| WorkerError::config_error(format!("invalid ledger seed: {}", e)))?;
        Ok(Self::new(entries))
    }

    pub async fn from_file(path: &Path) -> WorkerResult<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        let ledger = Self::from_json(&json)?;
        info!(path = %path.display(), "Loaded ledger seed");
        Ok(ledger)
    }
}

#[async_trait]
impl CreditLedger for InMemoryLedger {
    async fn try_consume(&self, user_id: &str) -> WorkerResult<Consumption> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(user_id)
            .ok_or_else(|| WorkerError::unknown_user(user_id))?;

        if entry.subscribed {
            return Ok(Consumption::Subscribed);
        }
        if entry.free_credits == 0 {
            return Ok(Consumption::Exhausted);
        }
        entry.free_credits -= 1;
        Ok(Consumption::Consumed {
            remaining: entry.free_credits,
        })
    }

    async fn entry(&self, user_id: &str) -> WorkerResult<Option<LedgerEntry>> {
        Ok(self.entries.lock().await.get(user_id).cloned())
    }
}

/// Ledger stored in Firestore, consumed with an `updateTime` precondition.
#[derive(Clone)]
pub struct FirestoreLedger {
    repo: LedgerRepository,
}

impl FirestoreLedger {
    pub fn new(repo: LedgerRepository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl CreditLedger for FirestoreLedger {
    async fn try_consume(&self, user_id: &str) -> WorkerResult<Consumption> {
        match self.repo.consume_credit(user_id).await {
            Ok(ConsumeOutcome::Subscribed) => Ok(Consumption::Subscribed),
            Ok(ConsumeOutcome::Consumed { remaining }) => Ok(Consumption::Consumed { remaining }),
            Ok(ConsumeOutcome::Exhausted) => Ok(Consumption::Exhausted),
            Err(FirestoreError::NotFound(_)) => Err(WorkerError::unknown_user(user_id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn entry(&self, user_id: &str) -> WorkerResult<Option<LedgerEntry>> {
        Ok(self.repo.get_entry(user_id).await?)
    }
}

/// Decides whether a user may run a job.
#[derive(Clone)]
pub struct AccessGate {
    ledger: Arc<dyn CreditLedger>,
    checkout: Arc<dyn CheckoutProvider>,
}

impl AccessGate {
    pub fn new(ledger: Arc<dyn CreditLedger>, checkout: Arc<dyn CheckoutProvider>) -> Self {
        Self { ledger, checkout }
    }

    pub fn ledger(&self) -> &Arc<dyn CreditLedger> {
        &self.ledger
    }

    /// Admit `user_id`, consuming one credit unless subscribed.
    ///
    /// Exactly one ledger write per credit-admitted job and none otherwise.
    pub async fn admit(&self, user_id: &str) -> WorkerResult<Admission> {
        match self.ledger.try_consume(user_id).await? {
            Consumption::Subscribed => {
                debug!(user_id = %user_id, "Admitted by subscription");
                record_admission("subscription");
                Ok(Admission::Admitted(AdmissionBasis::Subscription))
            }
            Consumption::Consumed { remaining } => {
                info!(user_id = %user_id, remaining = remaining, "Admitted on free credit");
                record_admission("credit");
                Ok(Admission::Admitted(AdmissionBasis::Credit { remaining }))
            }
            Consumption::Exhausted => {
                let session = self.checkout.create_checkout_session(user_id).await?;
                info!(user_id = %user_id, session_id = %session.id, "Payment required");
                record_admission("payment_required");
                Ok(Admission::PaymentRequired {
                    checkout_url: session.url,
                })
            }
        }
    }
}
