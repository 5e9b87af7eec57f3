pub mod local;
pub mod remote;
pub mod store;

// Re-export commonly used items
pub use local::{default_cache_path, LocalCache, LocalCacheEntry, LocalCacheFile};
pub use remote::{RemoteTier, RestRemote};
pub use store::{normalize_key, CacheStore};
