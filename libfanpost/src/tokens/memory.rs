//! In-memory credential backend

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::{Credential, CredentialBackend, CredentialKey};
use crate::error::Result;

/// Credential backend holding everything in a mutex-guarded map
///
/// Nothing survives the process. Used for tests and `backend = "memory"`.
#[derive(Default)]
pub struct MemoryBackend {
    credentials: Mutex<HashMap<CredentialKey, Credential>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.credentials.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.lock().is_empty()
    }
}

#[async_trait]
impl CredentialBackend for MemoryBackend {
    async fn get(&self, key: &CredentialKey) -> Result<Option<Credential>> {
        Ok(self.credentials.lock().get(key).cloned())
    }

    async fn upsert(&self, credential: &Credential) -> Result<Credential> {
        let mut credentials = self.credentials.lock();
        let key = credential.key();

        let merged = match credentials.get(&key) {
            Some(existing) => Credential {
                refresh_token: credential
                    .refresh_token
                    .clone()
                    .or_else(|| existing.refresh_token.clone()),
                metadata: if credential.metadata.is_empty() {
                    existing.metadata.clone()
                } else {
                    credential.metadata.clone()
                },
                ..credential.clone()
            },
            None => credential.clone(),
        };

        credentials.insert(key, merged.clone());
        Ok(merged)
    }

    async fn delete(&self, key: &CredentialKey) -> Result<bool> {
        Ok(self.credentials.lock().remove(key).is_some())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Credential>> {
        Ok(self
            .credentials
            .lock()
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
