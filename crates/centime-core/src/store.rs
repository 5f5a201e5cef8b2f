//! Abstraction over the remote document store.
//!
//! The core never talks to a concrete backend directly: it consumes the
//! [`DocumentStore`] capability and observes availability through the
//! shared [`StoreSession`] context. An authorization failure anywhere
//! expires that context, after which every call fails fast with
//! [`StoreError::Unavailable`] until an external reconnect flow resets it.

use std::fmt;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use centime_config::Config;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

/// Identifies a folder in the document store. Opaque to the core: a
/// directory path for the filesystem backend, a remote folder id for a
/// hosted one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FolderId(String);

impl FolderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FolderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Listing entry for a stored document.
#[derive(Debug, Clone)]
pub struct DocumentHandle {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub modified_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store is not connected; mutating callers degrade to no-ops.
    #[error("document store unavailable")]
    Unavailable,
    /// The session was invalidated mid-call. Expires the shared context.
    #[error("document store session expired")]
    Unauthorized,
    /// Network or backend failure outside the availability protocol.
    #[error("store transport failure: {0}")]
    Transport(String),
    /// A document exists but its payload cannot be used.
    #[error("malformed document: {0}")]
    Malformed(String),
}

/// Connection status of the shared store context.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StoreStatus {
    #[default]
    Disconnected,
    Connected,
    Expired {
        reason: String,
    },
}

impl StoreStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, StoreStatus::Connected)
    }
}

/// Process-wide store availability, passed explicitly to every component
/// that needs it. There is deliberately no global: the composition root
/// owns one `Arc<StoreSession>` and hands it to stores and loaders.
#[derive(Debug, Default)]
pub struct StoreSession {
    status: RwLock<StoreStatus>,
}

impl StoreSession {
    pub fn connected() -> Self {
        Self {
            status: RwLock::new(StoreStatus::Connected),
        }
    }

    pub fn status(&self) -> StoreStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn connect(&self) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = StoreStatus::Connected;
    }

    /// Invalidates the whole session. Called by store backends when a call
    /// comes back unauthorized.
    pub fn expire(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(%reason, "store session expired");
        *self.status.write().unwrap_or_else(PoisonError::into_inner) =
            StoreStatus::Expired { reason };
    }

    /// Fails fast with [`StoreError::Unavailable`] unless connected.
    pub fn ensure_connected(&self) -> Result<(), StoreError> {
        match self.status() {
            StoreStatus::Connected => Ok(()),
            StoreStatus::Disconnected | StoreStatus::Expired { .. } => {
                Err(StoreError::Unavailable)
            }
        }
    }
}

/// The document capability the allocation core runs against: list, read,
/// upserting write, and delete of JSON documents grouped in folders.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Whether calls are currently expected to succeed. Mutating session
    /// operations consult this before touching the store.
    fn available(&self) -> bool;

    async fn list(&self, folder: &FolderId) -> Result<Vec<DocumentHandle>, StoreError>;

    async fn read(&self, file_id: &str) -> Result<Value, StoreError>;

    /// Creates the document, or overwrites the one identified by
    /// `existing_id`. Returns the document id.
    async fn write(
        &self,
        folder: &FolderId,
        name: &str,
        data: &Value,
        existing_id: Option<&str>,
    ) -> Result<String, StoreError>;

    async fn delete(&self, file_id: &str) -> Result<(), StoreError>;
}

/// Finds a document by exact name within a folder.
pub async fn find_by_name(
    store: &dyn DocumentStore,
    folder: &FolderId,
    name: &str,
) -> Result<Option<DocumentHandle>, StoreError> {
    let files = store.list(folder).await?;
    Ok(files.into_iter().find(|file| file.name == name))
}

/// The folder pair backing allocation persistence.
#[derive(Debug, Clone)]
pub struct AllocationFolders {
    pub drafts: FolderId,
    pub released: FolderId,
}

/// Full folder map consumed by the core.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    pub spending: FolderId,
    pub settings: FolderId,
    pub allocations: AllocationFolders,
}

impl StoreLayout {
    pub fn from_config(config: &Config) -> Self {
        Self {
            spending: FolderId::new(config.folders.spending.clone()),
            settings: FolderId::new(config.folders.settings.clone()),
            allocations: AllocationFolders {
                drafts: FolderId::new(config.folders.allocations.drafts.clone()),
                released: FolderId::new(config.folders.allocations.released.clone()),
            },
        }
    }
}
