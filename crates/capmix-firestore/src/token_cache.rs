//! OAuth token caching for Firestore.
//!
//! Tokens are refreshed a minute before expiry under a write lock, so
//! concurrent requests trigger at most one refresh. If a refresh fails
//! while the old token is still technically valid, the old token is used.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gcp_auth::TokenProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

/// Refresh this long before expiry.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// TTL assumed when the provider reports an unusable expiry.
const TOKEN_DEFAULT_TTL: Duration = Duration::from_secs(50 * 60);

/// OAuth scope for Firestore REST access.
pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }

    fn is_usable(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Token cache with single-flight refresh.
pub struct TokenCache {
    auth: Arc<dyn TokenProvider>,
    cache: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(auth: Arc<dyn TokenProvider>) -> Self {
        Self {
            auth,
            cache: RwLock::new(None),
        }
    }

    /// Drop the cached token so the next call refreshes.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// A valid access token, refreshing if necessary.
    pub async fn get_token(&self) -> FirestoreResult<String> {
        if let Some(token) = self.cached_fresh(&*self.cache.read().await) {
            return Ok(token);
        }

        let mut cache = self.cache.write().await;

        // Another task may have refreshed while we waited for the lock
        if let Some(token) = self.cached_fresh(&cache) {
            return Ok(token);
        }

        match self.auth.token(&[FIRESTORE_SCOPE]).await {
            Ok(token) => {
                let access_token = token.as_str().to_string();
                let expires_at = deadline(token.expires_at());
                *cache = Some(CachedToken {
                    access_token: access_token.clone(),
                    expires_at,
                });
                debug!("Refreshed Firestore auth token");
                Ok(access_token)
            }
            Err(e) => match cache.as_ref().filter(|c| c.is_usable()) {
                Some(stale) => {
                    warn!("Token refresh failed, using existing token: {}", e);
                    Ok(stale.access_token.clone())
                }
                None => Err(FirestoreError::auth_error(format!(
                    "Failed to obtain auth token: {}",
                    e
                ))),
            },
        }
    }

    fn cached_fresh(&self, cache: &Option<CachedToken>) -> Option<String> {
        cache
            .as_ref()
            .filter(|c| c.is_fresh())
            .map(|c| c.access_token.clone())
    }
}

/// Convert a wall-clock expiry into a monotonic deadline.
fn deadline(expires_at: chrono::DateTime<Utc>) -> Instant {
    let now = Utc::now();
    if expires_at <= now {
        // Already expired: force a refresh on next use
        return Instant::now();
    }
    let ttl = (expires_at - now).to_std().unwrap_or(TOKEN_DEFAULT_TTL);
    Instant::now() + ttl
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_firestore_scope() {
        assert!(FIRESTORE_SCOPE.contains("datastore"));
    }

    #[test]
    fn test_deadline_for_expired_token() {
        let past = Utc::now() - chrono::Duration::seconds(10);
        assert!(deadline(past) <= Instant::now());
    }

    #[test]
    fn test_deadline_for_live_token() {
        let future = Utc::now() + chrono::Duration::minutes(30);
        let remaining = deadline(future).saturating_duration_since(Instant::now());
        assert!(remaining > Duration::from_secs(29 * 60));
    }

    #[test]
    fn test_cached_token_margin() {
        let nearly_expired = CachedToken {
            access_token: "t".into(),
            expires_at: Instant::now() + Duration::from_secs(30),
        };
        assert!(!nearly_expired.is_fresh());
        assert!(nearly_expired.is_usable());
    }
}
