pub mod cache;
pub mod category;
pub mod classifier;
pub mod config;
pub mod resolver;
pub mod rules;
pub mod transaction;
pub mod writeback;

// Re-export commonly used items
pub use cache::{CacheStore, RemoteTier};
pub use category::Category;
pub use classifier::{BatchClassifier, ClassifierTransport, ClassifyError, ClassifyPolicy};
pub use config::Config;
pub use resolver::Resolver;
pub use rules::{default_rules, CategoryRule, RuleEngine};
pub use transaction::Transaction;
pub use writeback::{spawn_writeback_worker, LearnedCategory};
