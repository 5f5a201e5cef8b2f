//! Read-only spending ledger: payload loading and allocation status
//! annotation.
//!
//! The ledger never mutates anything. Status is derived by listing the
//! two allocation folders once and cross-referencing document names
//! against record ids; a draft wins over a released copy, matching what
//! a freshly opened session would load.

use std::collections::HashSet;

use centime_domain::{AllocationStatus, SpendingPayload};

use crate::error::CoreError;
use crate::store::{find_by_name, AllocationFolders, DocumentHandle, DocumentStore, FolderId, StoreError};

pub const SPENDING_DOCUMENT: &str = "spending.json";

/// Loads and validates the spending payload document.
pub async fn load_spending(
    store: &dyn DocumentStore,
    folder: &FolderId,
) -> Result<SpendingPayload, CoreError> {
    let Some(file) = find_by_name(store, folder, SPENDING_DOCUMENT).await? else {
        return Err(CoreError::MissingDocument(SPENDING_DOCUMENT.into()));
    };
    let raw = store.read(&file.id).await?;
    let payload: SpendingPayload =
        serde_json::from_value(raw).map_err(|err| CoreError::InvalidDocument(err.to_string()))?;
    if payload.version != 1 {
        return Err(CoreError::InvalidDocument(format!(
            "unsupported spending payload version {}",
            payload.version
        )));
    }
    Ok(payload)
}

/// Snapshot of which spending records currently have a draft or a
/// released allocation document.
#[derive(Debug, Clone, Default)]
pub struct AllocationStatusIndex {
    drafts: HashSet<String>,
    released: HashSet<String>,
}

impl AllocationStatusIndex {
    pub async fn load(
        store: &dyn DocumentStore,
        folders: &AllocationFolders,
    ) -> Result<Self, StoreError> {
        let drafts = collect_ids(store.list(&folders.drafts).await?);
        let released = collect_ids(store.list(&folders.released).await?);
        Ok(Self { drafts, released })
    }

    pub fn status(&self, spending_id: &str) -> AllocationStatus {
        if self.drafts.contains(spending_id) {
            AllocationStatus::Draft
        } else if self.released.contains(spending_id) {
            AllocationStatus::Released
        } else {
            AllocationStatus::Unallocated
        }
    }

    pub fn draft_count(&self) -> usize {
        self.drafts.len()
    }

    pub fn released_count(&self) -> usize {
        self.released.len()
    }
}

fn collect_ids(files: Vec<DocumentHandle>) -> HashSet<String> {
    files
        .into_iter()
        .filter_map(|file| file.name.strip_suffix(".json").map(str::to_string))
        .collect()
}
