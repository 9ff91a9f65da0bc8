//! # Credential Store
//!
//! Access and refresh tokens live in secure platform storage (the OS
//! keychain), never in a file. The store is a thin, serialized key-value
//! surface: reads silent-fail to `None`, saves are atomic behind one lock,
//! and there is no retry logic here at all.
//!
//! [`TokenStore`] is the seam the gateway and stream client depend on;
//! [`MemoryTokenStore`] backs tests and headless environments with no
//! keychain.

use async_trait::async_trait;
use keyring::Entry;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};

/// Keychain service name all entries are filed under.
const SERVICE_NAME: &str = "hearth";

/// Keychain user slot for the access token.
const ACCESS_TOKEN_KEY: &str = "access_token";

/// Keychain user slot for the refresh token.
const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// An access/refresh token pair as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTokens {
    pub access_token: String,
    pub refresh_token: String,
}

// =============================================================================
// Token Store Trait
// =============================================================================

/// Serialized token storage.
///
/// Reads are nullable and never error out to callers; a broken keychain is
/// indistinguishable from a logged-out device, which is exactly how the
/// gateway treats it (omit the bearer, let the server answer 401).
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Loads both tokens, or `None` when either is absent or unreadable.
    async fn load(&self) -> Option<StoredTokens>;

    /// Loads just the access token, silent-fail.
    async fn access_token(&self) -> Option<String> {
        self.load().await.map(|t| t.access_token)
    }

    /// Loads just the refresh token, silent-fail.
    async fn refresh_token(&self) -> Option<String> {
        self.load().await.map(|t| t.refresh_token)
    }

    /// Saves both tokens atomically.
    async fn save(&self, access_token: &str, refresh_token: &str) -> SyncResult<()>;

    /// Removes both tokens. Succeeds when nothing was stored.
    async fn clear(&self) -> SyncResult<()>;
}

// =============================================================================
// Keyring Store
// =============================================================================

/// [`TokenStore`] over the OS keychain.
pub struct KeyringTokenStore {
    service: String,
    // Serializes concurrent token reads/writes; the keychain itself makes no
    // cross-entry atomicity promises.
    lock: Mutex<()>,
}

impl KeyringTokenStore {
    /// Creates a store under the default service name.
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Creates a store under a custom service name (side-by-side installs).
    pub fn with_service(service: impl Into<String>) -> Self {
        KeyringTokenStore {
            service: service.into(),
            lock: Mutex::new(()),
        }
    }

    async fn read_entry(&self, key: &'static str) -> Option<String> {
        let service = self.service.clone();
        tokio::task::spawn_blocking(move || {
            Entry::new(&service, key).ok()?.get_password().ok()
        })
        .await
        .ok()
        .flatten()
    }

    async fn write_entry(&self, key: &'static str, value: String) -> SyncResult<()> {
        let service = self.service.clone();
        tokio::task::spawn_blocking(move || {
            Entry::new(&service, key)
                .and_then(|entry| entry.set_password(&value))
                .map_err(|e| SyncError::Credentials(e.to_string()))
        })
        .await
        .map_err(|e| SyncError::Credentials(e.to_string()))?
    }

    async fn delete_entry(&self, key: &'static str) {
        let service = self.service.clone();
        let _ = tokio::task::spawn_blocking(move || {
            if let Ok(entry) = Entry::new(&service, key) {
                let _ = entry.delete_credential();
            }
        })
        .await;
    }
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for KeyringTokenStore {
    async fn load(&self) -> Option<StoredTokens> {
        let _guard = self.lock.lock().await;
        let access_token = self.read_entry(ACCESS_TOKEN_KEY).await?;
        let refresh_token = self.read_entry(REFRESH_TOKEN_KEY).await?;
        Some(StoredTokens {
            access_token,
            refresh_token,
        })
    }

    async fn save(&self, access_token: &str, refresh_token: &str) -> SyncResult<()> {
        let _guard = self.lock.lock().await;
        self.write_entry(ACCESS_TOKEN_KEY, access_token.to_string())
            .await?;
        self.write_entry(REFRESH_TOKEN_KEY, refresh_token.to_string())
            .await?;
        debug!("Stored token pair in keychain");
        Ok(())
    }

    async fn clear(&self) -> SyncResult<()> {
        let _guard = self.lock.lock().await;
        self.delete_entry(ACCESS_TOKEN_KEY).await;
        self.delete_entry(REFRESH_TOKEN_KEY).await;
        debug!("Cleared token pair from keychain");
        Ok(())
    }
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// [`TokenStore`] held in memory. For tests and environments without a
/// keychain; tokens do not survive the process.
#[derive(Default)]
pub struct MemoryTokenStore {
    inner: Mutex<Option<StoredTokens>>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store preloaded with a token pair.
    pub fn with_tokens(access_token: &str, refresh_token: &str) -> Self {
        MemoryTokenStore {
            inner: Mutex::new(Some(StoredTokens {
                access_token: access_token.to_string(),
                refresh_token: refresh_token.to_string(),
            })),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Option<StoredTokens> {
        self.inner.lock().await.clone()
    }

    async fn save(&self, access_token: &str, refresh_token: &str) -> SyncResult<()> {
        *self.inner.lock().await = Some(StoredTokens {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
        });
        Ok(())
    }

    async fn clear(&self) -> SyncResult<()> {
        let mut guard = self.inner.lock().await;
        if guard.is_none() {
            warn!("Clearing an already-empty token store");
        }
        *guard = None;
        Ok(())
    }
}
