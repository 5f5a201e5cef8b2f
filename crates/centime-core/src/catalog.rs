//! Read-only reference data loaded from the settings folder.

use centime_domain::{Bank, BanksFile, CategoriesFile, CategoryCatalog};

use crate::error::CoreError;
use crate::store::{find_by_name, DocumentStore, FolderId};

pub const CATEGORIES_DOCUMENT: &str = "categories.json";
pub const BANKS_DOCUMENT: &str = "banks.json";

/// Loads and validates the category table.
pub async fn load_categories(
    store: &dyn DocumentStore,
    settings: &FolderId,
) -> Result<CategoryCatalog, CoreError> {
    let Some(file) = find_by_name(store, settings, CATEGORIES_DOCUMENT).await? else {
        return Err(CoreError::MissingDocument(CATEGORIES_DOCUMENT.into()));
    };
    let raw = store.read(&file.id).await?;
    let parsed: CategoriesFile =
        serde_json::from_value(raw).map_err(|err| CoreError::InvalidDocument(err.to_string()))?;
    if parsed.version != 1 {
        return Err(CoreError::InvalidDocument(format!(
            "unsupported categories.json version {}",
            parsed.version
        )));
    }
    Ok(CategoryCatalog::new(parsed.categories))
}

/// Loads and validates the bank table.
pub async fn load_banks(
    store: &dyn DocumentStore,
    settings: &FolderId,
) -> Result<Vec<Bank>, CoreError> {
    let Some(file) = find_by_name(store, settings, BANKS_DOCUMENT).await? else {
        return Err(CoreError::MissingDocument(BANKS_DOCUMENT.into()));
    };
    let raw = store.read(&file.id).await?;
    let parsed: BanksFile =
        serde_json::from_value(raw).map_err(|err| CoreError::InvalidDocument(err.to_string()))?;
    if parsed.version != 1 {
        return Err(CoreError::InvalidDocument(format!(
            "unsupported banks.json version {}",
            parsed.version
        )));
    }
    Ok(parsed.banks)
}
