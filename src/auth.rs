//! Bearer credentials
//!
//! Token issuance (OAuth, managed identity) is outside this crate; a
//! [`CredentialProvider`] hands over tokens and [`TokenCache`] decides when to
//! ask for a new one. The cache is shared by every remote call in a run:
//! reads are concurrent, and at most one refresh is in flight at a time.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::AuthError;

pub const ACCESS_TOKEN_ENV: &str = "DATAVERSE_ACCESS_TOKEN";

#[derive(Clone)]
pub struct AccessToken {
    pub secret: String,
    /// `None` for tokens whose lifetime the caller does not know
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    /// Usable for at least `margin` longer
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => {
                let Ok(margin) = chrono::Duration::from_std(margin) else {
                    return false;
                };
                now.checked_add_signed(margin)
                    .map_or(false, |deadline| deadline < expires_at)
            }
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn fetch_token(&self) -> Result<AccessToken, AuthError>;
}

/// A token obtained elsewhere and passed in verbatim
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Read the token from `DATAVERSE_ACCESS_TOKEN`
    pub fn from_env() -> Result<Self, AuthError> {
        match std::env::var(ACCESS_TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => Ok(Self::new(token.trim())),
            _ => Err(AuthError::Missing(format!(
                "{} environment variable not set",
                ACCESS_TOKEN_ENV
            ))),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticTokenProvider {
    async fn fetch_token(&self) -> Result<AccessToken, AuthError> {
        Ok(AccessToken::new(self.token.clone(), None))
    }
}

// =============================================================================
// CACHE
// =============================================================================

pub struct TokenCache {
    provider: Arc<dyn CredentialProvider>,
    margin: Duration,
    current: RwLock<Option<AccessToken>>,
    /// Held for the duration of a refresh
    refresh: Mutex<()>,
    refreshes: AtomicU64,
}

impl TokenCache {
    pub fn new(provider: Arc<dyn CredentialProvider>, margin: Duration) -> Self {
        Self {
            provider,
            margin,
            current: RwLock::new(None),
            refresh: Mutex::new(()),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Current bearer secret, refreshed first if missing or about to expire
    pub async fn bearer(&self) -> Result<String, AuthError> {
        if let Some(secret) = self.fresh_secret().await {
            return Ok(secret);
        }

        let _guard = self.refresh.lock().await;
        // Another caller may have refreshed while we waited for the lock
        if let Some(secret) = self.fresh_secret().await {
            return Ok(secret);
        }

        let token = self.provider.fetch_token().await?;
        let secret = token.secret.clone();
        info!(expires_at = ?token.expires_at, "acquired access token");
        *self.current.write().await = Some(token);
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        Ok(secret)
    }

    /// Drop the cached token if it is still the one the platform rejected
    pub async fn invalidate(&self, rejected: &str) {
        let mut current = self.current.write().await;
        if current.as_ref().map_or(false, |t| t.secret == rejected) {
            debug!("invalidated rejected access token");
            *current = None;
        }
    }

    /// Number of successful provider fetches so far
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    async fn fresh_secret(&self) -> Option<String> {
        let current = self.current.read().await;
        current
            .as_ref()
            .filter(|t| t.is_fresh(Utc::now(), self.margin))
            .map(|t| t.secret.clone())
    }
}
