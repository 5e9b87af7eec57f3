use serde::{Deserialize, Serialize};

use crate::category::Category;

/// A keyword-to-category mapping with a priority used for first-match
/// resolution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Keywords tested in order; stored lowercase, matched as substrings of
    /// the normalized description.
    pub keywords: Vec<String>,
    pub category: Category,
    /// Higher priority is evaluated first.
    pub priority: i32,
}

/// Deterministic keyword matcher over a static rule table. Pure: no I/O, no
/// hidden state.
pub struct RuleEngine {
    /// Sorted by descending priority; ties keep declaration order.
    rules: Vec<CategoryRule>,
}

impl RuleEngine {
    /// Engine over the builtin rule table.
    pub fn new() -> Self {
        Self::from_rules(default_rules())
    }

    /// Engine over a caller-supplied table.
    pub fn from_rules(mut rules: Vec<CategoryRule>) -> Self {
        for rule in &mut rules {
            for keyword in &mut rule.keywords {
                *keyword = keyword.to_lowercase();
            }
        }
        // Stable sort: equal-priority rules keep their declaration order.
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        RuleEngine { rules }
    }

    /// First matching keyword of the first matching rule wins; scanning stops
    /// immediately. Returns `None` when no keyword occurs in the description.
    pub fn match_description(&self, description: &str) -> Option<Category> {
        let normalized = description.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }

        for rule in &self.rules {
            for keyword in &rule.keywords {
                if normalized.contains(keyword.as_str()) {
                    return Some(rule.category);
                }
            }
        }

        None
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Builtin rule table for common statement descriptions.
///
/// Priority bands: 60 for phrases that disambiguate an otherwise broader
/// merchant match, 50 for named merchants, 10 for generic terms.
pub fn default_rules() -> Vec<CategoryRule> {
    vec![
        // Disambiguators: must outrank the plain merchant keyword below
        rule(&["amazon prime", "prime video"], Category::Entertainment, 60),
        rule(
            &["uber eats", "doordash", "grubhub", "deliveroo", "just eat"],
            Category::FoodAndDining,
            60,
        ),
        // Named merchants
        rule(
            &[
                "netflix",
                "spotify",
                "hulu",
                "disney",
                "hbo",
                "twitch",
                "steam",
                "ticketmaster",
            ],
            Category::Entertainment,
            50,
        ),
        rule(
            &[
                "starbucks",
                "mcdonald",
                "burger king",
                "kfc",
                "chipotle",
                "dunkin",
                "nando",
            ],
            Category::FoodAndDining,
            50,
        ),
        rule(
            &[
                "tesco",
                "walmart",
                "kroger",
                "aldi",
                "lidl",
                "safeway",
                "sainsbury",
                "whole foods",
                "wholefds",
                "trader joe",
            ],
            Category::Groceries,
            50,
        ),
        rule(
            &["amazon", "ebay", "etsy", "target", "best buy", "ikea"],
            Category::Shopping,
            50,
        ),
        rule(
            &["uber", "lyft", "shell", "chevron", "exxon", "national rail"],
            Category::Transportation,
            50,
        ),
        rule(
            &[
                "airbnb",
                "booking.com",
                "expedia",
                "marriott",
                "hilton",
                "ryanair",
                "easyjet",
                "delta air",
            ],
            Category::Travel,
            50,
        ),
        rule(
            &[
                "comcast",
                "xfinity",
                "verizon",
                "at&t",
                "t-mobile",
                "vodafone",
                "british gas",
                "pg&e",
            ],
            Category::Utilities,
            50,
        ),
        rule(
            &["cvs", "walgreens", "planet fitness", "peloton"],
            Category::HealthAndFitness,
            50,
        ),
        // Generic terms
        rule(&["cinema", "theatre", "concert"], Category::Entertainment, 10),
        rule(
            &["restaurant", "cafe", "coffee", "diner", "pizzeria", "bakery"],
            Category::FoodAndDining,
            10,
        ),
        rule(&["grocery", "supermarket"], Category::Groceries, 10),
        rule(
            &["fuel", "gas station", "petrol", "parking", "toll", "transit"],
            Category::Transportation,
            10,
        ),
        rule(&["hotel", "hostel", "airline", "airways"], Category::Travel, 10),
        rule(
            &["electric", "water bill", "internet", "broadband", "utility"],
            Category::Utilities,
            10,
        ),
        rule(&["rent", "mortgage", "landlord"], Category::Housing, 10),
        rule(
            &["pharmacy", "dental", "clinic", "fitness", "gym"],
            Category::HealthAndFitness,
            10,
        ),
        rule(
            &["payroll", "salary", "direct deposit", "paycheck"],
            Category::Income,
            10,
        ),
        rule(
            &["zelle", "venmo", "wire transfer", "transfer to", "transfer from"],
            Category::Transfers,
            10,
        ),
        rule(
            &[
                "overdraft",
                "monthly fee",
                "service charge",
                "atm fee",
                "interest charge",
                "late fee",
            ],
            Category::FeesAndCharges,
            10,
        ),
    ]
}

fn rule(keywords: &[&str], category: Category, priority: i32) -> CategoryRule {
    CategoryRule {
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        category,
        priority,
    }
}
