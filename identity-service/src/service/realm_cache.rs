//! # Realm and Signing Key Cache
//!
//! Realm settings and signing keys are read on every request and change
//! rarely. This is a read-through cache in front of the repositories with a
//! 60-second TTL; invalidation on update is best-effort, and a stale read
//! within the TTL is tolerated.

use moka::future::Cache;
use shared::errors::ApiError;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{Realm, RealmSigningKey};
use crate::repository::{KeyRepository, RealmRepository};

/// Cache TTL. Admin updates propagate within this bound.
const CACHE_TTL: Duration = Duration::from_secs(60);

/// Read-through cache for realm settings and active signing keys.
#[derive(Clone)]
pub struct RealmCache {
    realms: RealmRepository,
    keys: KeyRepository,
    by_name: Cache<String, Arc<Realm>>,
    active_keys: Cache<Uuid, Arc<Vec<RealmSigningKey>>>,
}

impl RealmCache {
    pub fn new(realms: RealmRepository, keys: KeyRepository) -> Self {
        Self {
            realms,
            keys,
            by_name: Cache::builder()
                .max_capacity(1024)
                .time_to_live(CACHE_TTL)
                .build(),
            active_keys: Cache::builder()
                .max_capacity(1024)
                .time_to_live(CACHE_TTL)
                .build(),
        }
    }

    /// Resolves a realm by URL name.
    ///
    /// Misses are not cached: an unknown realm name hits the database every
    /// time, which keeps newly created realms visible immediately.
    pub async fn realm_by_name(&self, name: &str) -> Result<Option<Arc<Realm>>, ApiError> {
        if let Some(realm) = self.by_name.get(name).await {
            return Ok(Some(realm));
        }

        match self.realms.find_by_name(name).await? {
            Some(realm) => {
                let realm = Arc::new(realm);
                self.by_name.insert(name.to_string(), realm.clone()).await;
                Ok(Some(realm))
            }
            None => Ok(None),
        }
    }

    /// Active signing keys of a realm, newest first.
    pub async fn signing_keys(&self, realm_id: Uuid) -> Result<Arc<Vec<RealmSigningKey>>, ApiError> {
        if let Some(keys) = self.active_keys.get(&realm_id).await {
            return Ok(keys);
        }

        let keys = Arc::new(self.keys.active_keys(realm_id).await?);
        self.active_keys.insert(realm_id, keys.clone()).await;
        Ok(keys)
    }

    /// Drops a realm from the cache (best-effort, after an update).
    pub async fn invalidate_realm(&self, name: &str) {
        self.by_name.invalidate(name).await;
    }

    /// Drops a realm's key set from the cache (best-effort, after rotation).
    pub async fn invalidate_keys(&self, realm_id: Uuid) {
        self.active_keys.invalidate(&realm_id).await;
    }
}
