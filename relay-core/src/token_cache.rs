//! Short-lived bearer token cache shared by every worker that needs it.

use crate::CoreError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error};

/// Issues fresh tokens from an external service.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Short name used in logs.
    fn service(&self) -> &str;

    async fn fetch_token(&self) -> Result<String, CoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub value: String,
    pub expires_at: Instant,
}

impl AuthToken {
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Lazily refreshed token with a safety margin before real expiry.
///
/// A failed refresh leaves the previous token in place; callers then get
/// `None` because that token has already expired.
pub struct TokenCache<S> {
    source: S,
    lifetime: Duration,
    refresh_margin: Duration,
    current: Mutex<Option<AuthToken>>,
}

impl<S: TokenSource> TokenCache<S> {
    pub fn new(source: S, lifetime: Duration, refresh_margin: Duration) -> Self {
        Self {
            source,
            lifetime,
            refresh_margin,
            current: Mutex::new(None),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Time a freshly fetched token is served for.
    pub fn effective_ttl(&self) -> Duration {
        self.lifetime.saturating_sub(self.refresh_margin)
    }

    pub async fn get_token(&self) -> Option<String> {
        let mut current = self.current.lock().await;
        let now = Instant::now();

        if let Some(token) = current.as_ref() {
            if token.is_valid_at(now) {
                return Some(token.value.clone());
            }
        }

        debug!("Refreshing {} token", self.source.service());
        match self.source.fetch_token().await {
            Ok(value) => {
                let token = AuthToken {
                    value: value.clone(),
                    expires_at: now + self.effective_ttl(),
                };
                *current = Some(token);
                Some(value)
            }
            Err(e) => {
                error!("Error getting {} token: {}", self.source.service(), e);
                None
            }
        }
    }

    /// Expiry of the cached token, if any.
    pub async fn expires_at(&self) -> Option<Instant> {
        self.current.lock().await.as_ref().map(|t| t.expires_at)
    }

    /// Drops the cached token so the next call refetches.
    pub async fn invalidate(&self) {
        *self.current.lock().await = None;
    }
}
