use anyhow::bail;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

use super::model::Identity;
use super::store::{DuplicateIdentity, IdentityStore, SettingStore, StoreFuture};

/// Process-local store used by tests and by the server when no DSN is given.
///
/// Nothing survives a restart, including the signing key pair.
#[derive(Debug)]
pub struct MemoryStore {
    identities: RwLock<HashMap<i64, Identity>>,
    settings: RwLock<HashMap<String, String>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            identities: RwLock::new(HashMap::new()),
            settings: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityStore for MemoryStore {
    fn find_by_id(&self, id: i64) -> StoreFuture<'_, Option<Identity>> {
        Box::pin(async move { Ok(self.identities.read().await.get(&id).cloned()) })
    }

    fn find_by_username<'a>(&'a self, username: &'a str) -> StoreFuture<'a, Option<Identity>> {
        Box::pin(async move {
            let identities = self.identities.read().await;
            Ok(identities
                .values()
                .find(|identity| identity.username == username)
                .cloned())
        })
    }

    fn exists_by_username_or_email<'a>(
        &'a self,
        username: &'a str,
        email: &'a str,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let identities = self.identities.read().await;
            Ok(identities
                .values()
                .any(|identity| identity.username == username || identity.email == email))
        })
    }

    fn save<'a>(&'a self, identity: &'a Identity) -> StoreFuture<'a, Identity> {
        Box::pin(async move {
            let mut identities = self.identities.write().await;

            let taken = identities.values().any(|other| {
                other.id != identity.id
                    && (other.username == identity.username || other.email == identity.email)
            });
            if taken {
                return Err(DuplicateIdentity.into());
            }

            let mut stored = identity.clone();
            if !stored.is_persisted() {
                stored.id = self.next_id.fetch_add(1, Ordering::SeqCst);
            } else if !identities.contains_key(&stored.id) {
                bail!("identity {} does not exist", stored.id);
            }
            identities.insert(stored.id, stored.clone());
            Ok(stored)
        })
    }
}

impl SettingStore for MemoryStore {
    fn get_setting<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.settings.read().await.get(key).cloned()) })
    }

    fn put_setting<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.settings
                .write()
                .await
                .insert(key.to_string(), value.to_string());
            Ok(())
        })
    }
}
