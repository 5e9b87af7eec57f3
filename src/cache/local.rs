use std::collections::HashMap;
use std::fs::{self, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::category::Category;

const CACHE_FILE: &str = ".spendtag-cache.json";
const CACHE_FILE_VERSION: u32 = 1;

/// Default location of the local cache file.
pub fn default_cache_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(CACHE_FILE)
}

/// One learned mapping in the local tier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocalCacheEntry {
    pub category: Category,
    /// Epoch milliseconds of the last write.
    pub timestamp: i64,
}

/// On-disk format of the local tier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocalCacheFile {
    /// Version for migration purposes.
    pub version: u32,
    /// Mappings indexed by normalized description.
    pub mappings: HashMap<String, LocalCacheEntry>,
}

impl Default for LocalCacheFile {
    fn default() -> Self {
        Self {
            version: CACHE_FILE_VERSION,
            mappings: HashMap::new(),
        }
    }
}

/// Local fallback tier: a size-bounded, TTL-checked JSON file of learned
/// description→category mappings.
pub struct LocalCache {
    path: PathBuf,
    ttl_millis: i64,
    cap: usize,
    file: LocalCacheFile,
}

impl LocalCache {
    /// Open the tier at `path`, loading any existing file. A missing file
    /// starts an empty tier; an unreadable one is absorbed the same way so a
    /// poisoned cache can never block resolution.
    pub fn open(path: &Path, ttl_days: i64, cap: usize) -> Self {
        Self {
            path: path.to_path_buf(),
            ttl_millis: ttl_days * 24 * 60 * 60 * 1_000,
            cap,
            file: load_file(path),
        }
    }

    /// Look up a normalized key. A hit is valid only while its age is within
    /// the TTL; older entries are treated as misses and left for capacity
    /// eviction to collect.
    pub fn get(&self, key: &str, now_millis: i64) -> Option<Category> {
        let entry = self.file.mappings.get(key)?;
        if now_millis - entry.timestamp <= self.ttl_millis {
            Some(entry.category)
        } else {
            None
        }
    }

    /// Upsert a mapping. When inserting a new key would exceed the cap, the
    /// oldest entries by timestamp are evicted first until there is room.
    /// Does not touch the disk; call [`LocalCache::save`] afterwards.
    pub fn insert(&mut self, key: String, category: Category, now_millis: i64) {
        if !self.file.mappings.contains_key(&key) && self.file.mappings.len() >= self.cap {
            let excess = self.file.mappings.len() + 1 - self.cap;
            self.evict_oldest(excess);
        }

        self.file.mappings.insert(
            key,
            LocalCacheEntry {
                category,
                timestamp: now_millis,
            },
        );
    }

    /// Write the tier to disk with owner-only permissions.
    pub fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.file)
            .context("failed to serialize local cache file")?;
        fs::write(&self.path, &content).context("failed to write local cache file")?;
        fs::set_permissions(&self.path, Permissions::from_mode(0o600))
            .context("failed to set local cache file permissions")?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.file.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file.mappings.is_empty()
    }

    fn evict_oldest(&mut self, count: usize) {
        for _ in 0..count {
            let oldest = self
                .file
                .mappings
                .iter()
                .min_by(|(ka, ea), (kb, eb)| {
                    ea.timestamp.cmp(&eb.timestamp).then_with(|| ka.cmp(kb))
                })
                .map(|(key, _)| key.clone());

            match oldest {
                Some(key) => {
                    self.file.mappings.remove(&key);
                }
                None => break,
            }
        }
        log::debug!("local cache evicted {} oldest entries", count);
    }
}

fn load_file(path: &Path) -> LocalCacheFile {
    if !path.exists() {
        return LocalCacheFile::default();
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            log::warn!(
                "failed to read local cache file {}, starting empty: {}",
                path.display(),
                e
            );
            return LocalCacheFile::default();
        }
    };

    match serde_json::from_str::<LocalCacheFile>(&content) {
        Ok(file) if file.version < CACHE_FILE_VERSION => migrate(file),
        Ok(file) => file,
        Err(e) => {
            log::warn!(
                "failed to parse local cache file {}, starting empty: {}",
                path.display(),
                e
            );
            LocalCacheFile::default()
        }
    }
}

/// Migrate a cache file from older versions.
fn migrate(mut file: LocalCacheFile) -> LocalCacheFile {
    // Future migrations go here; for now only the version is updated.
    file.version = CACHE_FILE_VERSION;
    file
}
