//! Batch promotion of drafted allocations into the released folder.
//!
//! Used by the archive flow to release many records at once. Both
//! folders are listed a single time up front; per record the draft is
//! read, stamped, upserted into the released folder, and deleted.
//! Malformed or absent drafts are skipped, never fatal.

use chrono::{SecondsFormat, Utc};
use serde_json::Value;

use crate::store::{AllocationFolders, DocumentStore, StoreError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub released: usize,
    pub skipped: usize,
}

pub async fn release_drafts_batch(
    store: &dyn DocumentStore,
    folders: &AllocationFolders,
    spending_ids: &[String],
) -> Result<BatchOutcome, StoreError> {
    let draft_files = store.list(&folders.drafts).await?;
    let released_files = store.list(&folders.released).await?;

    let mut outcome = BatchOutcome::default();
    for spending_id in spending_ids {
        let name = format!("{spending_id}.json");
        let Some(draft) = draft_files.iter().find(|file| file.name == name) else {
            outcome.skipped += 1;
            continue;
        };

        let mut raw = store.read(&draft.id).await?;
        if !raw.get("allocations").is_some_and(Value::is_array) {
            outcome.skipped += 1;
            continue;
        }
        if let Value::Object(map) = &mut raw {
            map.insert(
                "releasedAt".into(),
                Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
            map.insert("processed".into(), Value::Bool(false));
        }

        let existing = released_files.iter().find(|file| file.name == name);
        store
            .write(
                &folders.released,
                &name,
                &raw,
                existing.map(|file| file.id.as_str()),
            )
            .await?;
        store.delete(&draft.id).await?;
        outcome.released += 1;
    }
    Ok(outcome)
}
