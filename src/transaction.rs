use serde::{Deserialize, Serialize};

use crate::category::Category;

/// A single bank transaction as supplied by the caller.
///
/// The pipeline never mutates a transaction in place; resolution produces
/// new values via [`Transaction::with_category`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    /// Free-text description as it appeared on the statement.
    pub description: String,
    pub amount: f64,
    /// Posting date, epoch milliseconds.
    pub date: i64,
    /// ISO 4217 code, e.g. "USD".
    pub currency: String,
    /// Resolved category; `None` means never resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

impl Transaction {
    pub fn new(description: &str, amount: f64, date: i64, currency: &str) -> Self {
        Self {
            description: description.to_string(),
            amount,
            date,
            currency: currency.to_string(),
            category: None,
        }
    }

    /// Copy of this transaction with the category set.
    pub fn with_category(&self, category: Category) -> Self {
        let mut resolved = self.clone();
        resolved.category = Some(category);
        resolved
    }

    /// True when the resolver should attempt categorization: no category yet,
    /// or only the `Other` sentinel.
    pub fn needs_category(&self) -> bool {
        match self.category {
            None => true,
            Some(category) => category.is_other(),
        }
    }
}
