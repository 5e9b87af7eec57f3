use serde::{Deserialize, Serialize};

/// Closed set of spending categories a transaction can resolve to.
///
/// `Other` doubles as the unresolved sentinel: a transaction carrying `Other`
/// is fair game for re-resolution, and no cache tier ever persists it.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum Category {
    Entertainment,
    #[serde(rename = "Food & Dining")]
    FoodAndDining,
    Groceries,
    Shopping,
    Transportation,
    Travel,
    Utilities,
    Housing,
    #[serde(rename = "Health & Fitness")]
    HealthAndFitness,
    Income,
    Transfers,
    #[serde(rename = "Fees & Charges")]
    FeesAndCharges,
    Other,
}

impl Default for Category {
    fn default() -> Self {
        Self::Other
    }
}

impl Category {
    /// Every category in canonical order, as presented to the classifier.
    pub const ALL: [Category; 13] = [
        Category::Entertainment,
        Category::FoodAndDining,
        Category::Groceries,
        Category::Shopping,
        Category::Transportation,
        Category::Travel,
        Category::Utilities,
        Category::Housing,
        Category::HealthAndFitness,
        Category::Income,
        Category::Transfers,
        Category::FeesAndCharges,
        Category::Other,
    ];

    /// Canonical name used in prompts, cache rows, and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Entertainment => "Entertainment",
            Category::FoodAndDining => "Food & Dining",
            Category::Groceries => "Groceries",
            Category::Shopping => "Shopping",
            Category::Transportation => "Transportation",
            Category::Travel => "Travel",
            Category::Utilities => "Utilities",
            Category::Housing => "Housing",
            Category::HealthAndFitness => "Health & Fitness",
            Category::Income => "Income",
            Category::Transfers => "Transfers",
            Category::FeesAndCharges => "Fees & Charges",
            Category::Other => "Other",
        }
    }

    /// Parse a category name. Tries the canonical spelling first, then a
    /// trimmed case-insensitive pass for sloppy classifier output. Names
    /// outside the closed set return `None`; callers at the classifier
    /// boundary coerce that to `Other`.
    pub fn parse(name: &str) -> Option<Category> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == name)
            .or_else(|| {
                let wanted = name.trim();
                Category::ALL
                    .iter()
                    .copied()
                    .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            })
    }

    pub fn is_other(&self) -> bool {
        matches!(self, Category::Other)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical_names() {
        for category in Category::ALL {
            assert_eq!(Category::parse(category.as_str()), Some(category));
        }
    }

    #[test]
    fn test_parse_is_lenient_about_case_and_padding() {
        assert_eq!(
            Category::parse("  food & dining "),
            Some(Category::FoodAndDining)
        );
        assert_eq!(Category::parse("GROCERIES"), Some(Category::Groceries));
    }

    #[test]
    fn test_parse_rejects_names_outside_the_set() {
        assert_eq!(Category::parse("Cryptocurrency"), None);
        assert_eq!(Category::parse(""), None);
    }

    #[test]
    fn test_serde_uses_canonical_names() {
        let json = serde_json::to_string(&Category::FoodAndDining).unwrap();
        assert_eq!(json, "\"Food & Dining\"");

        let parsed: Category = serde_json::from_str("\"Fees & Charges\"").unwrap();
        assert_eq!(parsed, Category::FeesAndCharges);
    }

    #[test]
    fn test_default_is_other() {
        assert!(Category::default().is_other());
    }
}
