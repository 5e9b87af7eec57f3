use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::config::Config;

/// Durable remote tier behind an object-safe seam so tests can inject
/// doubles. Implementations report failures as errors; the [`CacheStore`]
/// façade absorbs them as "tier unavailable".
///
/// [`CacheStore`]: crate::cache::CacheStore
pub trait RemoteTier: Send + Sync {
    /// Category stored for a normalized key; `Ok(None)` on a miss.
    fn fetch(&self, key: &str) -> Result<Option<Category>>;

    /// Upsert a mapping keyed by the normalized name. Repeated writes of the
    /// same key overwrite, never duplicate.
    fn store(&self, key: &str, category: Category) -> Result<()>;
}

const TABLE: &str = "transaction_categories";

/// REST table client for the remote tier.
///
/// The store is addressed as `{base}/{table}` with PostgREST-style filters;
/// writes are upserts on the `transaction_name` unique key with overwrite on
/// conflict.
pub struct RestRemote {
    base_url: String,
    api_key: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct CategoryRow {
    category: String,
}

#[derive(Serialize)]
struct UpsertRow<'a> {
    transaction_name: &'a str,
    category: &'a str,
    usage_count: u32,
}

impl RestRemote {
    /// Build the client from configuration; `None` when no remote store is
    /// configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        if !config.remote_configured() {
            return None;
        }
        Some(Self {
            base_url: config.remote_url.trim_end_matches('/').to_string(),
            api_key: config.remote_api_key.clone(),
            timeout: config.request_timeout(),
        })
    }

    fn table_url(&self) -> String {
        format!("{}/{}", self.base_url, TABLE)
    }
}

impl RemoteTier for RestRemote {
    fn fetch(&self, key: &str) -> Result<Option<Category>> {
        let url = format!(
            "{}?transaction_name=eq.{}&select=category&limit=1",
            self.table_url(),
            urlencoding::encode(key)
        );

        let response = ureq::get(&url)
            .set("apikey", &self.api_key)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .timeout(self.timeout)
            .call()
            .context("remote cache fetch failed")?;

        let text = response
            .into_string()
            .context("failed to read remote cache response")?;
        parse_fetch_response(&text)
    }

    fn store(&self, key: &str, category: Category) -> Result<()> {
        let url = format!("{}?on_conflict=transaction_name", self.table_url());
        let rows = [UpsertRow {
            transaction_name: key,
            category: category.as_str(),
            usage_count: 1,
        }];
        let body = serde_json::to_string(&rows).context("failed to serialize upsert row")?;

        ureq::post(&url)
            .set("apikey", &self.api_key)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Content-Type", "application/json")
            .set("Prefer", "resolution=merge-duplicates")
            .timeout(self.timeout)
            .send_string(&body)
            .context("remote cache upsert failed")?;

        Ok(())
    }
}

fn parse_fetch_response(text: &str) -> Result<Option<Category>> {
    let rows: Vec<CategoryRow> =
        serde_json::from_str(text).context("failed to parse remote cache response")?;

    let row = match rows.into_iter().next() {
        Some(row) => row,
        None => return Ok(None),
    };

    // Validate at the boundary: a row outside the closed set is a miss, not
    // an invalid tag propagating into the pipeline.
    match Category::parse(&row.category) {
        Some(category) => Ok(Some(category)),
        None => {
            log::warn!(
                "remote tier returned unknown category {:?}, treating as miss",
                row.category
            );
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_requires_url() {
        let config = Config::default();
        assert!(RestRemote::from_config(&config).is_none());

        let configured = Config {
            remote_url: "https://cache.example.com/rest/v1/".to_string(),
            ..Config::default()
        };
        let remote = RestRemote::from_config(&configured).unwrap();
        assert_eq!(
            remote.table_url(),
            "https://cache.example.com/rest/v1/transaction_categories"
        );
    }

    #[test]
    fn test_parse_fetch_response_hit() {
        let result = parse_fetch_response(r#"[{"category":"Utilities"}]"#).unwrap();
        assert_eq!(result, Some(Category::Utilities));
    }

    #[test]
    fn test_parse_fetch_response_miss() {
        assert_eq!(parse_fetch_response("[]").unwrap(), None);
    }

    #[test]
    fn test_unknown_category_row_is_a_miss() {
        let result = parse_fetch_response(r#"[{"category":"Blockchain"}]"#).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_malformed_response_is_an_error() {
        assert!(parse_fetch_response("not json").is_err());
    }
}
