//! Allocation line items and the persisted allocation document.
//!
//! The same document shape serves both lifecycle stages: drafts carry
//! `savedAt`, released copies carry `releasedAt` plus the spending amount
//! and currency. Field names follow the wire format of the stored JSON.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::money::round2;

pub const DOCUMENT_VERSION: u32 = 1;
pub const RELEASE_CURRENCY: &str = "CHF";

/// Placeholder applied when a line is added without a comment.
pub const DEFAULT_COMMENT: &str = "Please comment";

/// One split of a spending record's amount onto a category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllocationLine {
    pub id: Uuid,
    #[serde(rename = "categoryID")]
    pub category_id: i64,
    #[serde(rename = "subCategoryID")]
    pub sub_category_id: i64,
    pub comment: String,
    pub amount: f64,
    #[serde(rename = "allocationDate")]
    pub allocation_date: NaiveDate,
    #[serde(rename = "allocatedTagID", default)]
    pub allocated_tag_id: Option<i64>,
}

impl AllocationLine {
    /// Decodes one stored line, tolerating the gaps older documents have.
    /// Ids are regenerated on load; amounts are re-rounded to two
    /// decimals. Returns `None` when no usable amount is present.
    pub fn from_value(value: &Value, fallback_date: NaiveDate) -> Option<Self> {
        let amount = value.get("amount")?.as_f64()?;
        let allocation_date = value
            .get("allocationDate")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(fallback_date);
        Some(Self {
            id: Uuid::new_v4(),
            category_id: value.get("categoryID").and_then(Value::as_i64).unwrap_or(0),
            sub_category_id: value
                .get("subCategoryID")
                .and_then(Value::as_i64)
                .unwrap_or(0),
            comment: value
                .get("comment")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            amount: round2(amount),
            allocation_date,
            allocated_tag_id: value.get("allocatedTagID").and_then(Value::as_i64),
        })
    }
}

/// The per-record JSON document persisted in the draft or released folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationDocument {
    pub version: u32,
    pub spending_id: String,
    #[serde(rename = "partyID", default)]
    pub party_id: Option<i64>,
    #[serde(default)]
    pub processed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spending_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub allocations: Vec<AllocationLine>,
}

impl AllocationDocument {
    /// Builds the mutable draft stage of the document.
    pub fn draft(
        spending_id: String,
        party_id: Option<i64>,
        allocations: Vec<AllocationLine>,
        saved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            spending_id,
            party_id,
            processed: false,
            saved_at: Some(saved_at),
            released_at: None,
            spending_amount: None,
            currency: None,
            allocations,
        }
    }

    /// Builds the released stage, denominated and stamped for the batch
    /// consumer that owns the `processed` flag from here on.
    pub fn released(
        spending_id: String,
        party_id: Option<i64>,
        spending_amount: f64,
        allocations: Vec<AllocationLine>,
        released_at: DateTime<Utc>,
    ) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            spending_id,
            party_id,
            processed: false,
            saved_at: None,
            released_at: Some(released_at),
            spending_amount: Some(round2(spending_amount)),
            currency: Some(RELEASE_CURRENCY.to_string()),
            allocations,
        }
    }

    /// Extracts the stored lines from a raw document value. `None` when
    /// the `allocations` field is missing or not an array, which callers
    /// treat the same as an absent document.
    pub fn lines_from_value(raw: &Value, fallback_date: NaiveDate) -> Option<Vec<AllocationLine>> {
        let entries = raw.get("allocations")?.as_array()?;
        Some(
            entries
                .iter()
                .filter_map(|entry| AllocationLine::from_value(entry, fallback_date))
                .collect(),
        )
    }
}
