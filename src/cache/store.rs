use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::cache::local::LocalCache;
use crate::cache::remote::{RemoteTier, RestRemote};
use crate::category::Category;
use crate::config::Config;

/// Canonical cache key: trimmed and uppercased.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_uppercase()
}

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Two-tier cache of learned description→category mappings: a durable remote
/// store fronted by a bounded local fallback file.
///
/// Every tier failure is caught and logged here; `get` and `put` never
/// propagate I/O errors, so the resolver always has a defined fallback.
pub struct CacheStore {
    remote: Option<Box<dyn RemoteTier>>,
    local: Mutex<LocalCache>,
}

impl CacheStore {
    /// Wire both tiers from configuration. An unconfigured remote store
    /// leaves the local tier operating alone.
    pub fn from_config(config: &Config) -> Self {
        let remote = RestRemote::from_config(config)
            .map(|client| Box::new(client) as Box<dyn RemoteTier>);
        let local = LocalCache::open(
            &config.local_cache_path,
            config.local_ttl_days,
            config.local_cache_cap,
        );
        Self::new(remote, local)
    }

    /// Injection constructor for tests and embedders.
    pub fn new(remote: Option<Box<dyn RemoteTier>>, local: LocalCache) -> Self {
        Self {
            remote,
            local: Mutex::new(local),
        }
    }

    /// Look up a description. The remote tier is consulted first; a hit is
    /// written through into the local tier before returning. On a remote
    /// miss, error, or absent configuration the local tier answers, subject
    /// to its TTL. `None` means a miss in both tiers.
    pub fn get(&self, description: &str) -> Option<Category> {
        let key = normalize_key(description);
        if key.is_empty() {
            return None;
        }

        if let Some(remote) = &self.remote {
            match remote.fetch(&key) {
                Ok(Some(category)) => {
                    log::debug!("remote cache hit: {} -> {}", key, category);
                    self.populate_local(&key, category);
                    return Some(category);
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("remote cache tier unavailable for get: {:#}", e);
                }
            }
        }

        let now = now_millis();
        self.local_lock().get(&key, now)
    }

    /// Persist a learned mapping into both tiers. `Other` is a sentinel, not
    /// an answer, and is never persisted. The local tier is updated even if
    /// the remote upsert fails.
    pub fn put(&self, description: &str, category: Category) {
        if category.is_other() {
            log::debug!("refusing to cache Other for {:?}", description);
            return;
        }

        let key = normalize_key(description);
        if key.is_empty() {
            return;
        }

        if let Some(remote) = &self.remote {
            if let Err(e) = remote.store(&key, category) {
                log::warn!("remote cache tier unavailable for put: {:#}", e);
            }
        }

        self.populate_local(&key, category);
    }

    /// Entry count of the local tier.
    pub fn local_len(&self) -> usize {
        self.local_lock().len()
    }

    fn populate_local(&self, key: &str, category: Category) {
        let now = now_millis();
        let mut local = self.local_lock();
        local.insert(key.to_string(), category, now);
        if let Err(e) = local.save() {
            log::warn!("failed to persist local cache: {:#}", e);
        }
    }

    fn local_lock(&self) -> MutexGuard<'_, LocalCache> {
        // A panicked write-back thread must not block later lookups.
        self.local
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
