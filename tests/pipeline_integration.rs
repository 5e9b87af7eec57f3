//! End-to-end pipeline tests over the public API, with scripted transport
//! and remote tier doubles. No network, no real endpoints.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use tempfile::TempDir;

use spendtag::cache::{normalize_key, LocalCache};
use spendtag::{
    BatchClassifier, CacheStore, Category, ClassifierTransport, ClassifyError, ClassifyPolicy,
    RemoteTier, Resolver, RuleEngine, Transaction,
};

/// Remote tier double backed by a shared map. Clones observe the same rows,
/// so tests keep one clone and give the other to the store.
#[derive(Clone, Default)]
struct InMemoryRemote {
    rows: Arc<Mutex<HashMap<String, Category>>>,
    failing: Arc<AtomicBool>,
    fetches: Arc<AtomicUsize>,
    stores: Arc<AtomicUsize>,
}

impl InMemoryRemote {
    fn seed(&self, key: &str, category: Category) {
        self.rows
            .lock()
            .unwrap()
            .insert(normalize_key(key), category);
    }

    fn row(&self, key: &str) -> Option<Category> {
        self.rows.lock().unwrap().get(&normalize_key(key)).copied()
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl RemoteTier for InMemoryRemote {
    fn fetch(&self, key: &str) -> Result<Option<Category>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            bail!("remote unavailable");
        }
        Ok(self.rows.lock().unwrap().get(key).copied())
    }

    fn store(&self, key: &str, category: Category) -> Result<()> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            bail!("remote unavailable");
        }
        self.rows.lock().unwrap().insert(key.to_string(), category);
        Ok(())
    }
}

#[derive(Clone)]
struct ScriptedTransport {
    responses: Arc<Mutex<VecDeque<Result<String, ClassifyError>>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    fn new(script: Vec<Result<String, ClassifyError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(script.into())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ClassifierTransport for ScriptedTransport {
    fn send(&self, _prompt: &str, _timeout: Duration) -> Result<String, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ClassifyError::Transport("script exhausted".to_string())))
    }
}

fn fast_policy() -> ClassifyPolicy {
    ClassifyPolicy {
        max_attempts: 2,
        timeout: Duration::from_millis(10),
        backoff_base: Duration::from_millis(1),
    }
}

fn build_resolver(
    dir: &TempDir,
    remote: Option<InMemoryRemote>,
    transport: Option<ScriptedTransport>,
) -> (Resolver, Arc<CacheStore>) {
    let local = LocalCache::open(&dir.path().join("cache.json"), 30, 1_000);
    let remote = remote.map(|r| Box::new(r) as Box<dyn RemoteTier>);
    let store = Arc::new(CacheStore::new(remote, local));
    let classifier = transport.map(|t| BatchClassifier::new(Box::new(t), fast_policy()));

    let resolver = Resolver::new(
        RuleEngine::new(),
        Arc::clone(&store),
        classifier,
        20,
        Duration::ZERO,
    );
    (resolver, store)
}

fn tx(description: &str) -> Transaction {
    Transaction::new(description, -25.00, 1_700_000_000_000, "USD")
}

#[test]
fn test_full_pipeline_spans_rules_cache_and_classifier() {
    let dir = TempDir::new().unwrap();
    let remote = InMemoryRemote::default();
    remote.seed("ACME SAAS SUBSCRIPTION", Category::Utilities);

    let transport = ScriptedTransport::new(vec![Ok(r#"{"1": "Shopping"}"#.to_string())]);
    let (resolver, _store) = build_resolver(&dir, Some(remote.clone()), Some(transport.clone()));

    let input = vec![
        tx("NETFLIX.COM 866-579-7172"),
        tx("ACME SAAS SUBSCRIPTION"),
        tx("ZORPLE INDUSTRIES #88"),
        tx("ZORPLE INDUSTRIES #88"),
    ];
    let resolved = resolver.resolve(&input);
    resolver.shutdown();

    assert_eq!(resolved[0].category, Some(Category::Entertainment));
    assert_eq!(resolved[1].category, Some(Category::Utilities));
    assert_eq!(resolved[2].category, Some(Category::Shopping));
    assert_eq!(resolved[3].category, Some(Category::Shopping));

    // The duplicate collapsed into one classified description, one batch.
    assert_eq!(transport.calls(), 1);
    // The classifier's answer was written back to the remote tier.
    assert_eq!(remote.row("ZORPLE INDUSTRIES #88"), Some(Category::Shopping));
}

#[test]
fn test_resolved_categories_survive_to_the_next_run() {
    let dir = TempDir::new().unwrap();
    let transport = ScriptedTransport::new(vec![Ok(r#"{"1": "Travel"}"#.to_string())]);

    let (first, _) = build_resolver(&dir, None, Some(transport.clone()));
    let resolved = first.resolve(&[tx("ORBIT TOURS LTD")]);
    assert_eq!(resolved[0].category, Some(Category::Travel));
    first.shutdown();
    assert_eq!(transport.calls(), 1);

    // Second run on the same cache file, without any classifier at all.
    let (second, _) = build_resolver(&dir, None, None);
    let resolved = second.resolve(&[tx("ORBIT TOURS LTD")]);
    second.shutdown();

    assert_eq!(resolved[0].category, Some(Category::Travel));
}

#[test]
fn test_remote_outage_falls_back_to_local_tier() {
    let dir = TempDir::new().unwrap();
    let remote = InMemoryRemote::default();

    // A healthy first run lands the answer in both tiers.
    let transport = ScriptedTransport::new(vec![Ok(r#"{"1": "Groceries"}"#.to_string())]);
    let (first, _) = build_resolver(&dir, Some(remote.clone()), Some(transport));
    first.resolve(&[tx("FARMSTAND 22")]);
    first.shutdown();
    assert_eq!(remote.row("FARMSTAND 22"), Some(Category::Groceries));

    // Remote down on the second run: the local tier still answers and no
    // classifier call is needed.
    remote.set_failing(true);
    let second_transport = ScriptedTransport::new(vec![]);
    let (second, _) = build_resolver(&dir, Some(remote.clone()), Some(second_transport.clone()));
    let resolved = second.resolve(&[tx("FARMSTAND 22")]);
    second.shutdown();

    assert_eq!(resolved[0].category, Some(Category::Groceries));
    assert_eq!(second_transport.calls(), 0);
}

#[test]
fn test_total_outage_still_returns_other_for_everything() {
    let dir = TempDir::new().unwrap();
    let remote = InMemoryRemote::default();
    remote.set_failing(true);

    let transport = ScriptedTransport::new(vec![]);
    let (resolver, store) = build_resolver(&dir, Some(remote), Some(transport));

    let input = vec![tx("UNKNOWN ONE"), tx("UNKNOWN TWO"), tx("UNKNOWN THREE")];
    let resolved = resolver.resolve(&input);
    resolver.shutdown();

    assert_eq!(resolved.len(), 3);
    for transaction in &resolved {
        assert_eq!(transaction.category, Some(Category::Other));
    }
    // Other never pollutes the cache.
    assert_eq!(store.local_len(), 0);
}

#[test]
fn test_writeback_failure_still_keeps_local_copy() {
    let dir = TempDir::new().unwrap();
    let remote = InMemoryRemote::default();
    remote.set_failing(true);

    let transport = ScriptedTransport::new(vec![Ok(r#"{"1": "Income"}"#.to_string())]);
    let (resolver, store) = build_resolver(&dir, Some(remote.clone()), Some(transport));

    let resolved = resolver.resolve(&[tx("QUARTERLY DIVIDEND")]);
    resolver.shutdown();

    assert_eq!(resolved[0].category, Some(Category::Income));
    // The remote write was attempted and refused; the local tier kept it.
    assert!(remote.stores.load(Ordering::SeqCst) >= 1);
    assert_eq!(store.get("QUARTERLY DIVIDEND"), Some(Category::Income));
}
