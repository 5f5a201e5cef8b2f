//! centime-core
//!
//! Allocation business logic: the document-store abstraction, the
//! exclusive task queue, the allocation session state machine, spending
//! status annotation, reference-data loaders, and batch release.
//! No terminal I/O and no concrete storage backend.

pub mod batch;
pub mod catalog;
pub mod error;
pub mod ledger;
pub mod queue;
pub mod session;
pub mod store;

pub use error::CoreError;
pub use queue::{ExclusiveQueue, QueueClosed};
pub use session::{
    AllocationForm, AllocationSession, BusyAction, ReopenPolicy, SessionState,
};
pub use store::{
    find_by_name, AllocationFolders, DocumentHandle, DocumentStore, FolderId, StoreError,
    StoreLayout, StoreSession, StoreStatus,
};
