//! Spending records imported from the bank feed.
//!
//! Records are read-only inputs to the allocation workflow: their sign
//! decides the admissible category nature and their amount is the target
//! that allocations must sum to.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A bank account the spending feed groups records under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub label: String,
}

/// One imported bank transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpendingRecord {
    pub id: String,
    pub account_id: String,
    pub date: NaiveDate,
    pub party: String,
    #[serde(rename = "partyID", default)]
    pub party_id: Option<i64>,
    pub amount: f64,
    pub owner: String,
    #[serde(rename = "categoryID", default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(rename = "subCategoryID", default, skip_serializing_if = "Option::is_none")]
    pub sub_category_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(rename = "tagID", default, skip_serializing_if = "Option::is_none")]
    pub tag_id: Option<i64>,
}

impl SpendingRecord {
    pub fn is_expense(&self) -> bool {
        self.amount < 0.0
    }
}

/// The persisted spending document: accounts plus one record list per
/// account, in matching order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingPayload {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub accounts: Vec<Account>,
    pub records_by_account: Vec<Vec<SpendingRecord>>,
}

impl SpendingPayload {
    /// Records for the account at `index`, empty when out of range.
    pub fn records_for_account(&self, index: usize) -> &[SpendingRecord] {
        self.records_by_account
            .get(index)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Allocation progress of a spending record, derived by cross-referencing
/// the draft and released document folders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationStatus {
    #[default]
    Unallocated,
    Draft,
    Released,
}

impl fmt::Display for AllocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AllocationStatus::Unallocated => "Unallocated",
            AllocationStatus::Draft => "Draft",
            AllocationStatus::Released => "Released",
        };
        f.write_str(label)
    }
}
