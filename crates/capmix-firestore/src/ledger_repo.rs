//! Access ledger repository.
//!
//! One document per user in the ledger collection:
//!
//! ```text
//! users/{user_id} { free_credits: int, subscribed: bool, updated_at: timestamp }
//! ```
//!
//! Credit consumption is a read-modify-write guarded by the document's
//! `updateTime`, so two concurrent consumers of the last credit cannot
//! both succeed: the loser sees a precondition failure, re-reads, and
//! finds the balance exhausted.

use std::collections::HashMap;
use std::time::Duration;

use capmix_models::LedgerEntry;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_ledger_conflict;
use crate::retry::gave_up;
use crate::types::{Document, ToFirestoreValue};

/// Default collection holding ledger entries.
pub const DEFAULT_LEDGER_COLLECTION: &str = "users";

/// Maximum attempts for one optimistic-lock consumption.
const MAX_CONSUME_RETRIES: u32 = 5;

/// Base delay for backoff after a lost race (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 50;

const FIELD_FREE_CREDITS: &str = "free_credits";
const FIELD_SUBSCRIBED: &str = "subscribed";
const FIELD_UPDATED_AT: &str = "updated_at";

/// Result of trying to consume one credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// User is subscribed; nothing was written
    Subscribed,
    /// One credit was taken
    Consumed { remaining: u32 },
    /// No credits left; nothing was written
    Exhausted,
}

/// Repository for ledger entries.
#[derive(Clone)]
pub struct LedgerRepository {
    client: FirestoreClient,
    collection: String,
}

impl LedgerRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self::with_collection(client, DEFAULT_LEDGER_COLLECTION)
    }

    pub fn with_collection(client: FirestoreClient, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }

    /// Fetch a user's ledger entry.
    pub async fn get_entry(&self, user_id: &str) -> FirestoreResult<Option<LedgerEntry>> {
        let doc = self.fetch(user_id).await?;
        Ok(doc.map(|d| entry_from_document(user_id, &d)))
    }

    /// Create a ledger entry; fails with `AlreadyExists` if one exists.
    pub async fn create_entry(&self, entry: &LedgerEntry) -> FirestoreResult<()> {
        self.client
            .create_document(&self.collection, &entry.user_id, entry_fields(entry))
            .await?;
        info!(
            user_id = %entry.user_id,
            free_credits = entry.free_credits,
            subscribed = entry.subscribed,
            "Created ledger entry"
        );
        Ok(())
    }

    /// Atomically decide admission and take a credit if one is needed.
    ///
    /// Subscribed users and users without credits are never written.
    /// Fails with `NotFound` when the user has no ledger entry.
    pub async fn consume_credit(&self, user_id: &str) -> FirestoreResult<ConsumeOutcome> {
        for attempt in 0..MAX_CONSUME_RETRIES {
            let doc = self
                .fetch(user_id)
                .await?
                .ok_or_else(|| FirestoreError::not_found(format!("ledger entry for {}", user_id)))?;
            let entry = entry_from_document(user_id, &doc);

            if entry.subscribed {
                return Ok(ConsumeOutcome::Subscribed);
            }
            if entry.free_credits == 0 {
                return Ok(ConsumeOutcome::Exhausted);
            }

            // Never write without a precondition
            let update_time = doc.update_time.as_deref().ok_or_else(|| {
                FirestoreError::invalid_response(format!("ledger entry for {} has no updateTime", user_id))
            })?;

            let remaining = entry.free_credits - 1;
            let mut fields = HashMap::new();
            fields.insert(FIELD_FREE_CREDITS.to_string(), remaining.to_firestore_value());
            fields.insert(FIELD_UPDATED_AT.to_string(), Utc::now().to_firestore_value());

            match self
                .client
                .update_document_with_precondition(
                    &self.collection,
                    user_id,
                    fields,
                    &[FIELD_FREE_CREDITS, FIELD_UPDATED_AT],
                    update_time,
                )
                .await
            {
                Ok(_) => {
                    info!(user_id = %user_id, remaining = remaining, "Consumed credit");
                    return Ok(ConsumeOutcome::Consumed { remaining });
                }
                Err(e) if e.is_precondition_failed() => {
                    debug!(
                        user_id = %user_id,
                        attempt = attempt + 1,
                        "Ledger entry changed underneath us, retrying"
                    );
                    record_ledger_conflict();
                    let delay = Duration::from_millis(RETRY_BASE_DELAY_MS * (attempt as u64 + 1));
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Failed to consume credit");
                    return Err(e);
                }
            }
        }

        warn!(
            user_id = %user_id,
            retries = MAX_CONSUME_RETRIES,
            "Credit consumption kept losing races"
        );
        Err(gave_up("consume_credit"))
    }

    async fn fetch(&self, user_id: &str) -> FirestoreResult<Option<Document>> {
        self.client
            .with_retry("get_ledger_entry", || {
                self.client.get_document(&self.collection, user_id)
            })
            .await
    }
}

fn entry_from_document(user_id: &str, doc: &Document) -> LedgerEntry {
    LedgerEntry::new(
        user_id,
        doc.get::<u32>(FIELD_FREE_CREDITS).unwrap_or(0),
        doc.get::<bool>(FIELD_SUBSCRIBED).unwrap_or(false),
    )
}

fn entry_fields(entry: &LedgerEntry) -> HashMap<String, crate::types::Value> {
    let mut fields = HashMap::new();
    fields.insert(FIELD_FREE_CREDITS.to_string(), entry.free_credits.to_firestore_value());
    fields.insert(FIELD_SUBSCRIBED.to_string(), entry.subscribed.to_firestore_value());
    fields.insert(FIELD_UPDATED_AT.to_string(), Utc::now().to_firestore_value());
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FirestoreConfig;
    use serde_json::json;
    use wiremock::matchers::{method, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const UPDATE_TIME: &str = "2024-05-02T10:00:00.123456Z";

    async fn repo_for(server: &MockServer) -> LedgerRepository {
        let config = FirestoreConfig::emulator("test-project", server.address().to_string());
        LedgerRepository::new(FirestoreClient::new(config).await.unwrap())
    }

    fn user_doc(free_credits: u32, subscribed: bool) -> serde_json::Value {
        json!({
            "name": "projects/test-project/databases/(default)/documents/users/u1",
            "fields": {
                "free_credits": {"integerValue": free_credits.to_string()},
                "subscribed": {"booleanValue": subscribed}
            },
            "updateTime": UPDATE_TIME
        })
    }

    async fn mount_get(server: &MockServer, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path_regex(r"/documents/users/u1$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_get_entry() {
        let server = MockServer::start().await;
        mount_get(&server, user_doc(3, false)).await;

        let entry = repo_for(&server).await.get_entry("u1").await.unwrap().unwrap();
        assert_eq!(entry, LedgerEntry::new("u1", 3, false));
    }

    #[tokio::test]
    async fn test_get_missing_entry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(repo_for(&server).await.get_entry("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_consume_uses_update_time_precondition() {
        let server = MockServer::start().await;
        mount_get(&server, user_doc(2, false)).await;
        Mock::given(method("PATCH"))
            .and(path_regex(r"/documents/users/u1$"))
            .and(query_param("currentDocument.updateTime", UPDATE_TIME))
            .and(query_param("updateMask.fieldPaths", "free_credits"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_doc(1, false)))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = repo_for(&server).await.consume_credit("u1").await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::Consumed { remaining: 1 });
    }

    #[tokio::test]
    async fn test_consume_retries_lost_race() {
        let server = MockServer::start().await;
        mount_get(&server, user_doc(1, false)).await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(412).set_body_string("FAILED_PRECONDITION"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_doc(0, false)))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = repo_for(&server).await.consume_credit("u1").await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::Consumed { remaining: 0 });
    }

    #[tokio::test]
    async fn test_subscribed_user_is_never_written() {
        let server = MockServer::start().await;
        mount_get(&server, user_doc(0, true)).await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = repo_for(&server).await.consume_credit("u1").await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::Subscribed);
    }

    #[tokio::test]
    async fn test_exhausted_user_is_never_written() {
        let server = MockServer::start().await;
        mount_get(&server, user_doc(0, false)).await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = repo_for(&server).await.consume_credit("u1").await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::Exhausted);
    }

    #[tokio::test]
    async fn test_consume_unknown_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = repo_for(&server).await.consume_credit("u1").await.unwrap_err();
        assert!(matches!(err, FirestoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_entry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"/documents/users$"))
            .and(query_param("documentId", "u1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_doc(3, false)))
            .expect(1)
            .mount(&server)
            .await;

        repo_for(&server)
            .await
            .create_entry(&LedgerEntry::new("u1", 3, false))
            .await
            .unwrap();
    }
}
