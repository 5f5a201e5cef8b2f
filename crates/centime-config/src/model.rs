use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How a released allocation with no surviving draft behaves on load.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ReopenMode {
    /// Released documents load read-only; the batch consumer owns their
    /// lifecycle through the `processed` flag.
    #[default]
    ReadOnly,
    /// Released documents move back into the drafts folder and become
    /// editable again.
    ReopenAsDraft,
}

/// Folder names for the two allocation lifecycle stages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllocationFolderConfig {
    #[serde(default = "AllocationFolderConfig::default_drafts")]
    pub drafts: String,
    #[serde(default = "AllocationFolderConfig::default_released")]
    pub released: String,
}

impl AllocationFolderConfig {
    fn default_drafts() -> String {
        "allocations/drafts".into()
    }

    fn default_released() -> String {
        "allocations/released".into()
    }
}

impl Default for AllocationFolderConfig {
    fn default() -> Self {
        Self {
            drafts: Self::default_drafts(),
            released: Self::default_released(),
        }
    }
}

/// Folder map for the document store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FolderConfig {
    #[serde(default = "FolderConfig::default_spending")]
    pub spending: String,
    #[serde(default = "FolderConfig::default_settings")]
    pub settings: String,
    #[serde(default)]
    pub allocations: AllocationFolderConfig,
}

impl FolderConfig {
    fn default_spending() -> String {
        "spending".into()
    }

    fn default_settings() -> String {
        "settings".into()
    }
}

impl Default for FolderConfig {
    fn default() -> Self {
        Self {
            spending: Self::default_spending(),
            settings: Self::default_settings(),
            allocations: AllocationFolderConfig::default(),
        }
    }
}

/// Stores user-configurable preferences and the store layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "Config::default_currency")]
    pub currency: String,
    #[serde(default)]
    pub reopen_released: ReopenMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Optional custom root for the document store. Defaults to
    /// `~/Documents/Centime`.
    pub store_root: Option<PathBuf>,
    #[serde(default)]
    pub folders: FolderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            currency: Self::default_currency(),
            reopen_released: ReopenMode::default(),
            store_root: None,
            folders: FolderConfig::default(),
        }
    }
}

impl Config {
    pub fn default_currency() -> String {
        "CHF".into()
    }

    pub fn resolve_store_root(&self) -> PathBuf {
        if let Some(path) = &self.store_root {
            return path.clone();
        }

        let base = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        base.join("Centime")
    }
}
