//! OAuth credential and PKCE verifier storage
//!
//! # Architecture
//!
//! - `CredentialBackend` trait: durable get/upsert/delete keyed by (user, platform)
//! - `MemoryBackend`: map-backed implementation for tests and ephemeral runs
//! - `Database` (see [`crate::db`]): SQLite implementation
//! - `TokenStore`: facade adding the volatile verifier map and per-key
//!   serialization of credential writes
//!
//! Credentials survive restarts when the backend is durable. Verifiers never
//! do: they live only in the `TokenStore` and expire after `verifier_ttl`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use libfanpost::tokens::{CredentialUpdate, MemoryBackend, TokenStore};
//! use libfanpost::types::PlatformKind;
//!
//! # async fn example() -> libfanpost::error::Result<()> {
//! let store = TokenStore::new(Arc::new(MemoryBackend::new()));
//!
//! store
//!     .save_credential(
//!         "user-1",
//!         PlatformKind::TikTok,
//!         CredentialUpdate::new("act.token").with_refresh_token("rft.token"),
//!     )
//!     .await?;
//!
//! assert!(store.has_credential("user-1", PlatformKind::TikTok).await);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{PlatformError, Result};
use crate::types::PlatformKind;

mod memory;

pub use memory::MemoryBackend;


/// Default lifetime of an unused PKCE verifier
pub const DEFAULT_VERIFIER_TTL: Duration = Duration::from_secs(10 * 60);

/// Composite key identifying one user's connection to one platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CredentialKey {
    pub user_id: String,
    pub platform: PlatformKind,
}

impl CredentialKey {
    pub fn new(user_id: impl Into<String>, platform: PlatformKind) -> Self {
        Self {
            user_id: user_id.into(),
            platform,
        }
    }
}

impl std::fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.user_id, self.platform)
    }
}

/// Stored OAuth tokens for one (user, platform) pair
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub user_id: String,
    pub platform: PlatformKind,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix timestamp (seconds)
    pub expires_at: Option<i64>,
    /// Platform-side identifiers such as TikTok's `open_id`
    pub metadata: BTreeMap<String, String>,
    pub updated_at: i64,
}

impl Credential {
    pub fn key(&self) -> CredentialKey {
        CredentialKey::new(self.user_id.clone(), self.platform)
    }

    /// Whether `expires_at` has passed. Credentials without an expiry never expire.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("platform", &self.platform)
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("metadata", &self.metadata)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Token fields returned by an exchange or refresh, ready to be saved
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialUpdate {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub metadata: BTreeMap<String, String>,
}

impl CredentialUpdate {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            ..Default::default()
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expires_in(mut self, seconds: i64) -> Self {
        self.expires_in = Some(seconds);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    fn into_credential(self, key: &CredentialKey, now: i64) -> Credential {
        Credential {
            user_id: key.user_id.clone(),
            platform: key.platform,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_in.map(|secs| now + secs),
            metadata: self.metadata,
            updated_at: now,
        }
    }
}

impl std::fmt::Debug for CredentialUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialUpdate")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_in", &self.expires_in)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// A PKCE verifier waiting for its OAuth callback
#[derive(Clone, PartialEq, Eq)]
pub struct Verifier {
    pub user_id: String,
    pub platform: PlatformKind,
    pub verifier: String,
    pub created_at: DateTime<Utc>,
}

impl Verifier {
    fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or_default()
    }
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("user_id", &self.user_id)
            .field("platform", &self.platform)
            .field("verifier", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Durable credential storage
///
/// `upsert` must merge atomically per key: a `None` refresh token or empty
/// metadata in the incoming credential keeps the stored value.
#[async_trait]
pub trait CredentialBackend: Send + Sync {
    async fn get(&self, key: &CredentialKey) -> Result<Option<Credential>>;

    /// Insert or merge, returning the credential as stored
    async fn upsert(&self, credential: &Credential) -> Result<Credential>;

    /// Returns whether a credential was removed
    async fn delete(&self, key: &CredentialKey) -> Result<bool>;

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Credential>>;

    fn backend_name(&self) -> &str;
}

type WriteLocks = Mutex<HashMap<CredentialKey, Arc<tokio::sync::Mutex<()>>>>;

/// Held write lock for one (user, platform) key
struct KeyWriteGuard<'a> {
    locks: &'a WriteLocks,
    key: CredentialKey,
    lock: Arc<tokio::sync::Mutex<()>>,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for KeyWriteGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock();
        // One reference in the map plus ours: nobody else holds or waits
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.key);
        }
    }
}

/// Facade over a credential backend plus the volatile verifier map
pub struct TokenStore {
    backend: Arc<dyn CredentialBackend>,
    verifiers: Mutex<HashMap<CredentialKey, Verifier>>,
    write_locks: WriteLocks,
    verifier_ttl: Duration,
}

impl TokenStore {
    pub fn new(backend: Arc<dyn CredentialBackend>) -> Self {
        Self {
            backend,
            verifiers: Mutex::new(HashMap::new()),
            write_locks: Mutex::new(HashMap::new()),
            verifier_ttl: DEFAULT_VERIFIER_TTL,
        }
    }

    pub fn with_verifier_ttl(mut self, ttl: Duration) -> Self {
        self.verifier_ttl = ttl;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.backend_name()
    }

    /// Take the write lock for `key`; the map entry is dropped with the last holder
    async fn write_lock(&self, key: &CredentialKey) -> KeyWriteGuard<'_> {
        let lock = self
            .write_locks
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let guard = Arc::clone(&lock).lock_owned().await;

        KeyWriteGuard {
            locks: &self.write_locks,
            key: key.clone(),
            lock,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn write_lock_count(&self) -> usize {
        self.write_locks.lock().len()
    }

    // ------------------------------------------------------------------
    // Verifiers
    // ------------------------------------------------------------------

    /// Store a verifier, replacing any earlier one for the same key
    pub fn save_verifier(&self, user_id: &str, platform: PlatformKind, verifier: &str) {
        self.purge_expired_verifiers();

        let key = CredentialKey::new(user_id, platform);
        let entry = Verifier {
            user_id: user_id.to_string(),
            platform,
            verifier: verifier.to_string(),
            created_at: Utc::now(),
        };

        if self.verifiers.lock().insert(key, entry).is_some() {
            debug!(user_id, platform = %platform, "Replaced pending verifier");
        }
    }

    /// Returns `None` when absent, consumed, or older than the verifier TTL
    pub fn get_verifier(&self, user_id: &str, platform: PlatformKind) -> Option<Verifier> {
        let key = CredentialKey::new(user_id, platform);
        let verifiers = self.verifiers.lock();
        let entry = verifiers.get(&key)?;

        if entry.age(Utc::now()) >= self.verifier_ttl {
            debug!(user_id, platform = %platform, "Ignoring expired verifier");
            return None;
        }

        Some(entry.clone())
    }

    /// Returns whether a verifier was removed
    pub fn delete_verifier(&self, user_id: &str, platform: PlatformKind) -> bool {
        let key = CredentialKey::new(user_id, platform);
        self.verifiers.lock().remove(&key).is_some()
    }

    /// Drop every verifier older than the TTL, returning how many were removed
    pub fn purge_expired_verifiers(&self) -> usize {
        let now = Utc::now();
        let ttl = self.verifier_ttl;
        let mut verifiers = self.verifiers.lock();
        let before = verifiers.len();
        verifiers.retain(|_, v| v.age(now) < ttl);
        let removed = before - verifiers.len();

        if removed > 0 {
            debug!(removed, "Purged expired verifiers");
        }
        removed
    }

    // ------------------------------------------------------------------
    // Credentials
    // ------------------------------------------------------------------

    /// Insert or update a credential
    ///
    /// `expires_at` is computed from `expires_in`. A stored refresh token is
    /// kept when the update carries none.
    pub async fn save_credential(
        &self,
        user_id: &str,
        platform: PlatformKind,
        update: CredentialUpdate,
    ) -> Result<Credential> {
        let key = CredentialKey::new(user_id, platform);
        let _guard = self.write_lock(&key).await;

        self.save_locked(&key, update).await
    }

    async fn save_locked(&self, key: &CredentialKey, update: CredentialUpdate) -> Result<Credential> {
        let credential = update.into_credential(key, Utc::now().timestamp());
        let stored = self.backend.upsert(&credential).await?;

        info!(
            user_id = %key.user_id,
            platform = %key.platform,
            backend = self.backend.backend_name(),
            has_refresh_token = stored.refresh_token.is_some(),
            "Saved credential"
        );

        Ok(stored)
    }

    /// Replace a rejected access token, serialized with every other write for the key
    ///
    /// If another task already replaced `stale_access_token` while this one
    /// waited for the lock, the newer credential is returned without calling
    /// `refresh`.
    pub async fn refresh_credential<F, Fut>(
        &self,
        user_id: &str,
        platform: PlatformKind,
        stale_access_token: &str,
        refresh: F,
    ) -> Result<Credential>
    where
        F: FnOnce(Credential) -> Fut,
        Fut: Future<Output = Result<CredentialUpdate>>,
    {
        let key = CredentialKey::new(user_id, platform);
        let _guard = self.write_lock(&key).await;

        let current = self.backend.get(&key).await?.ok_or_else(|| {
            PlatformError::AuthRequired(format!("no {} credential on file", platform))
        })?;

        if current.access_token != stale_access_token {
            debug!(user_id, platform = %platform, "Credential already refreshed");
            return Ok(current);
        }

        let update = refresh(current).await?;
        self.save_locked(&key, update).await
    }

    /// Look up a credential; storage failures are logged and reported as absent
    pub async fn get_credential(&self, user_id: &str, platform: PlatformKind) -> Option<Credential> {
        let key = CredentialKey::new(user_id, platform);
        match self.backend.get(&key).await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(user_id, platform = %platform, "Credential lookup failed: {}", e);
                None
            }
        }
    }

    pub async fn has_credential(&self, user_id: &str, platform: PlatformKind) -> bool {
        self.get_credential(user_id, platform).await.is_some()
    }

    /// Remove a credential, returning whether one existed
    pub async fn delete_credential(&self, user_id: &str, platform: PlatformKind) -> Result<bool> {
        let key = CredentialKey::new(user_id, platform);
        let _guard = self.write_lock(&key).await;

        let deleted = self.backend.delete(&key).await?;
        if deleted {
            info!(user_id, platform = %platform, "Deleted credential");
        }
        Ok(deleted)
    }

    /// Platforms the user has a stored credential for, in platform order
    pub async fn connected_platforms(&self, user_id: &str) -> Vec<PlatformKind> {
        match self.backend.list_for_user(user_id).await {
            Ok(credentials) => {
                let mut platforms: Vec<PlatformKind> =
                    credentials.into_iter().map(|c| c.platform).collect();
                platforms.sort();
                platforms.dedup();
                platforms
            }
            Err(e) => {
                warn!(user_id, "Listing credentials failed: {}", e);
                Vec::new()
            }
        }
    }
}
