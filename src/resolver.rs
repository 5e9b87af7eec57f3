use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Sender};

use crate::cache::CacheStore;
use crate::category::Category;
use crate::classifier::BatchClassifier;
use crate::config::Config;
use crate::rules::RuleEngine;
use crate::transaction::Transaction;
use crate::writeback::{spawn_writeback_worker, LearnedCategory};

/// Orchestrates category resolution: rules, then cache, then batched
/// classification, cheapest stage first.
///
/// Each stage claims the descriptions it can answer; later stages only see
/// what remains, so a rule match can never be overwritten by a stale cache
/// row or a classifier answer.
pub struct Resolver {
    rules: RuleEngine,
    store: Arc<CacheStore>,
    classifier: Option<BatchClassifier>,
    max_batch_size: usize,
    batch_delay: Duration,
    writeback_tx: Sender<LearnedCategory>,
    worker: JoinHandle<()>,
}

impl Resolver {
    pub fn from_config(config: &Config) -> Self {
        let store = Arc::new(CacheStore::from_config(config));
        let classifier = BatchClassifier::from_config(config);

        log::info!(
            "resolver ready (classifier: {}, remote cache: {})",
            config.classifier_configured(),
            config.remote_configured()
        );

        Self::new(
            RuleEngine::new(),
            store,
            classifier,
            config.max_batch_size,
            config.batch_delay(),
        )
    }

    pub fn new(
        rules: RuleEngine,
        store: Arc<CacheStore>,
        classifier: Option<BatchClassifier>,
        max_batch_size: usize,
        batch_delay: Duration,
    ) -> Self {
        let (writeback_tx, writeback_rx) = unbounded();
        let worker = spawn_writeback_worker(Arc::clone(&store), writeback_rx);

        Self {
            rules,
            store,
            classifier,
            // chunks() panics on zero.
            max_batch_size: max_batch_size.max(1),
            batch_delay,
            writeback_tx,
            worker,
        }
    }

    /// Resolve categories for a set of transactions.
    ///
    /// Returns a new vector in input order; already categorized transactions
    /// pass through untouched. Duplicate descriptions are resolved once and
    /// every holder receives the same answer. Never fails: descriptions no
    /// stage can answer come back as `Other`.
    pub fn resolve(&self, transactions: &[Transaction]) -> Vec<Transaction> {
        let mut seen = HashSet::new();
        let mut pending: Vec<String> = Vec::new();
        for transaction in transactions.iter().filter(|t| t.needs_category()) {
            if seen.insert(transaction.description.clone()) {
                pending.push(transaction.description.clone());
            }
        }

        if pending.is_empty() {
            return transactions.to_vec();
        }

        log::info!(
            "resolving {} unique descriptions across {} transactions",
            pending.len(),
            transactions.len()
        );

        let mut resolved: HashMap<String, Category> = HashMap::with_capacity(pending.len());

        pending.retain(|description| match self.rules.match_description(description) {
            Some(category) => {
                resolved.insert(description.clone(), category);
                false
            }
            None => true,
        });

        pending.retain(|description| match self.store.get(description) {
            Some(category) => {
                resolved.insert(description.clone(), category);
                false
            }
            None => true,
        });

        if !pending.is_empty() {
            match &self.classifier {
                Some(classifier) => self.classify_pending(classifier, &pending, &mut resolved),
                None => log::debug!(
                    "no classifier configured, {} descriptions default to Other",
                    pending.len()
                ),
            }
        }

        transactions
            .iter()
            .map(|transaction| {
                if transaction.needs_category() {
                    let category = resolved
                        .get(&transaction.description)
                        .copied()
                        .unwrap_or(Category::Other);
                    transaction.with_category(category)
                } else {
                    transaction.clone()
                }
            })
            .collect()
    }

    /// Run the remaining descriptions through the classifier, one batch at a
    /// time with a fixed delay between batches.
    fn classify_pending(
        &self,
        classifier: &BatchClassifier,
        pending: &[String],
        resolved: &mut HashMap<String, Category>,
    ) {
        let total_batches = pending.len().div_ceil(self.max_batch_size);
        log::info!(
            "classifying {} descriptions in {} batches",
            pending.len(),
            total_batches
        );

        for (index, batch) in pending.chunks(self.max_batch_size).enumerate() {
            if index > 0 && !self.batch_delay.is_zero() {
                thread::sleep(self.batch_delay);
            }

            log::debug!(
                "classifying batch {} of {} ({} descriptions)",
                index + 1,
                total_batches,
                batch.len()
            );

            for (description, category) in classifier.classify(batch) {
                if !category.is_other() {
                    let learned = LearnedCategory {
                        description: description.clone(),
                        category,
                    };
                    if let Err(e) = self.writeback_tx.send(learned) {
                        log::error!("failed to queue write-back for {:?}: {}", description, e);
                    }
                }
                resolved.insert(description, category);
            }
        }
    }

    /// Drain the write-back queue and stop the worker.
    ///
    /// Consumes the resolver so no further resolution can race the shutdown.
    pub fn shutdown(self) {
        drop(self.writeback_tx);
        if self.worker.join().is_err() {
            log::error!("write-back worker panicked");
        }
    }
}
