//! Category and bank reference data.
//!
//! Both tables are read-only lookup data maintained outside this system;
//! the core loads them from the settings folder and only ever queries.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether a category absorbs income or expenses. The sign of a spending
/// record decides which nature its allocations may target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CategoryNature {
    Income,
    Expense,
}

impl CategoryNature {
    /// Nature admissible for a given record amount: non-negative amounts
    /// allocate to income categories, negative ones to expense categories.
    pub fn for_amount(amount: f64) -> Self {
        if amount < 0.0 {
            CategoryNature::Expense
        } else {
            CategoryNature::Income
        }
    }
}

impl fmt::Display for CategoryNature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CategoryNature::Income => "income",
            CategoryNature::Expense => "expense",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubCategory {
    pub id: i64,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: i64,
    pub label: String,
    pub nature: CategoryNature,
    #[serde(default)]
    pub subcategories: Vec<SubCategory>,
}

/// Lookup table over the loaded categories.
#[derive(Debug, Clone, Default)]
pub struct CategoryCatalog {
    categories: Vec<Category>,
}

impl CategoryCatalog {
    pub fn new(categories: Vec<Category>) -> Self {
        Self { categories }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, id: i64) -> Option<&Category> {
        self.categories.iter().find(|category| category.id == id)
    }

    /// Subcategories of `category_id`, empty when the category is unknown.
    pub fn subcategories(&self, category_id: i64) -> &[SubCategory] {
        self.category(category_id)
            .map(|category| category.subcategories.as_slice())
            .unwrap_or_default()
    }

    pub fn sub_category(&self, category_id: i64, sub_category_id: i64) -> Option<&SubCategory> {
        self.subcategories(category_id)
            .iter()
            .find(|sub| sub.id == sub_category_id)
    }

    /// Categories a record of the given amount may allocate to.
    pub fn admissible_for(&self, amount: f64) -> Vec<&Category> {
        let nature = CategoryNature::for_amount(amount);
        self.categories
            .iter()
            .filter(|category| category.nature == nature)
            .collect()
    }
}

/// Wire shape of `categories.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoriesFile {
    pub version: u32,
    pub categories: Vec<Category>,
}

/// A bank recognized from record identifiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bank {
    pub id: String,
    pub label: String,
}

/// Wire shape of `banks.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanksFile {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    pub banks: Vec<Bank>,
}
