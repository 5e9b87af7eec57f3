use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::default_cache_path;

/// Pipeline configuration.
///
/// Defaults are usable out of the box: with no classifier or remote store
/// configured the pipeline still resolves via rules and the local cache tier.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Classification endpoint URL. Empty = classifier unavailable.
    pub classifier_url: String,
    /// API key sent to the classification endpoint.
    pub classifier_api_key: String,
    /// Remote cache store base URL. Empty = remote tier unavailable.
    pub remote_url: String,
    /// API key sent to the remote cache store.
    pub remote_api_key: String,
    /// Local cache file location.
    pub local_cache_path: PathBuf,
    /// Maximum descriptions per classifier request.
    pub max_batch_size: usize,
    /// Delay inserted between successive classifier batches.
    pub batch_delay_ms: u64,
    /// Per-request deadline for classifier and remote tier calls.
    pub request_timeout_secs: u64,
    /// Total classifier attempts per batch (first try + retries).
    pub max_attempts: u32,
    /// First retry delay; doubles per subsequent retry.
    pub backoff_base_secs: u64,
    /// Age limit for local tier hits, in days.
    pub local_ttl_days: i64,
    /// Entry cap for the local tier.
    pub local_cache_cap: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            classifier_url: String::new(),
            classifier_api_key: String::new(),
            remote_url: String::new(),
            remote_api_key: String::new(),
            local_cache_path: default_cache_path(),
            max_batch_size: 20,
            batch_delay_ms: 1_000,
            request_timeout_secs: 30,
            max_attempts: 3,
            backoff_base_secs: 2,
            local_ttl_days: 30,
            local_cache_cap: 1_000,
        }
    }
}

impl Config {
    /// Load configuration from `SPENDTAG_*` environment variables, falling
    /// back to the defaults for anything unset or unparsable.
    ///
    /// Recognized variables:
    /// - `SPENDTAG_CLASSIFIER_URL`, `SPENDTAG_CLASSIFIER_API_KEY`
    /// - `SPENDTAG_REMOTE_URL`, `SPENDTAG_REMOTE_API_KEY`
    /// - `SPENDTAG_CACHE_PATH`
    /// - `SPENDTAG_BATCH_SIZE`, `SPENDTAG_BATCH_DELAY_MS`
    /// - `SPENDTAG_TIMEOUT_SECS`, `SPENDTAG_CACHE_TTL_DAYS`
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(url) = env::var("SPENDTAG_CLASSIFIER_URL") {
            config.classifier_url = url;
        }
        if let Ok(key) = env::var("SPENDTAG_CLASSIFIER_API_KEY") {
            config.classifier_api_key = key;
        }
        if let Ok(url) = env::var("SPENDTAG_REMOTE_URL") {
            config.remote_url = url;
        }
        if let Ok(key) = env::var("SPENDTAG_REMOTE_API_KEY") {
            config.remote_api_key = key;
        }
        if let Ok(path) = env::var("SPENDTAG_CACHE_PATH") {
            config.local_cache_path = PathBuf::from(path);
        }
        if let Some(size) = env_parse("SPENDTAG_BATCH_SIZE") {
            config.max_batch_size = size;
        }
        if let Some(delay) = env_parse("SPENDTAG_BATCH_DELAY_MS") {
            config.batch_delay_ms = delay;
        }
        if let Some(timeout) = env_parse("SPENDTAG_TIMEOUT_SECS") {
            config.request_timeout_secs = timeout;
        }
        if let Some(days) = env_parse("SPENDTAG_CACHE_TTL_DAYS") {
            config.local_ttl_days = days;
        }

        config
    }

    pub fn classifier_configured(&self) -> bool {
        !self.classifier_url.is_empty()
    }

    pub fn remote_configured(&self) -> bool {
        !self.remote_url.is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert!(!config.classifier_configured());
        assert!(!config.remote_configured());
        assert_eq!(config.max_batch_size, 20);
        assert_eq!(config.batch_delay_ms, 1_000);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.backoff_base_secs, 2);
        assert_eq!(config.local_ttl_days, 30);
        assert_eq!(config.local_cache_cap, 1_000);
    }

    #[test]
    fn test_env_overrides() {
        unsafe {
            env::set_var("SPENDTAG_CLASSIFIER_URL", "http://localhost:4000");
            env::set_var("SPENDTAG_BATCH_SIZE", "5");
            env::set_var("SPENDTAG_BATCH_DELAY_MS", "250");
            env::set_var("SPENDTAG_CACHE_TTL_DAYS", "not-a-number");
        }

        let config = Config::from_env();

        assert_eq!(config.classifier_url, "http://localhost:4000");
        assert!(config.classifier_configured());
        assert_eq!(config.max_batch_size, 5);
        assert_eq!(config.batch_delay_ms, 250);
        // Unparsable values fall back to the default.
        assert_eq!(config.local_ttl_days, 30);

        unsafe {
            env::remove_var("SPENDTAG_CLASSIFIER_URL");
            env::remove_var("SPENDTAG_BATCH_SIZE");
            env::remove_var("SPENDTAG_BATCH_DELAY_MS");
            env::remove_var("SPENDTAG_CACHE_TTL_DAYS");
        }
    }
}
