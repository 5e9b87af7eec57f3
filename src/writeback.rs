use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;

use crate::cache::CacheStore;
use crate::category::Category;

/// Message sent to the write-back worker: one freshly classified mapping to
/// persist.
#[derive(Debug, Clone)]
pub struct LearnedCategory {
    pub description: String,
    pub category: Category,
}

/// Spawn the background write-back worker.
///
/// The worker persists classifier results into the cache store off the
/// resolution path, so a slow or failing store never delays resolution. It
/// exits once every sender has been dropped and the channel drains.
pub fn spawn_writeback_worker(
    store: Arc<CacheStore>,
    rx: Receiver<LearnedCategory>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        log::info!("Write-back worker started");

        for learned in rx {
            log::debug!(
                "Persisting learned mapping: {} -> {}",
                learned.description,
                learned.category
            );
            store.put(&learned.description, learned.category);
        }

        log::info!("Write-back worker shutting down");
    })
}
