//! centime-testing
//!
//! Test doubles for the workspace: an in-memory [`DocumentStore`] with
//! seeding helpers, an operation journal, overlap accounting, and
//! unauthorized fault injection, plus a tracing bootstrap for test
//! binaries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde_json::Value;

use centime_core::store::{DocumentHandle, DocumentStore, FolderId, StoreError, StoreSession};

/// Installs a compact tracing subscriber once per test binary. Honors
/// `RUST_LOG`.
pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, Clone)]
struct StoredDocument {
    folder: String,
    name: String,
    data: Value,
    modified: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryState {
    documents: HashMap<String, StoredDocument>,
    journal: Vec<String>,
    next_id: u64,
}

/// In-memory document store. Duplicate names within a folder are allowed
/// on purpose: a store that silently deduplicated would hide exactly the
/// upsert bugs the session protocol exists to prevent.
pub struct MemoryStore {
    session: Arc<StoreSession>,
    state: Mutex<MemoryState>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fail_unauthorized: AtomicBool,
}

impl MemoryStore {
    pub fn connected() -> Arc<Self> {
        Self::with_session(Arc::new(StoreSession::connected()))
    }

    pub fn disconnected() -> Arc<Self> {
        Self::with_session(Arc::new(StoreSession::default()))
    }

    pub fn with_session(session: Arc<StoreSession>) -> Arc<Self> {
        Arc::new(Self {
            session,
            state: Mutex::new(MemoryState::default()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            fail_unauthorized: AtomicBool::new(false),
        })
    }

    pub fn session(&self) -> Arc<StoreSession> {
        Arc::clone(&self.session)
    }

    /// The next store call fails with `Unauthorized` and expires the
    /// shared session, mimicking an HTTP 401 mid-operation.
    pub fn fail_next_unauthorized(&self) {
        self.fail_unauthorized.store(true, Ordering::SeqCst);
    }

    /// Inserts a document directly, bypassing availability checks.
    pub fn seed(&self, folder: &FolderId, name: &str, data: Value) -> String {
        let mut state = self.lock();
        state.next_id += 1;
        let id = format!("mem-{}", state.next_id);
        state.documents.insert(
            id.clone(),
            StoredDocument {
                folder: folder.as_str().to_string(),
                name: name.to_string(),
                data,
                modified: Utc::now(),
            },
        );
        id
    }

    /// The payload of the first document matching folder and name.
    pub fn document(&self, folder: &FolderId, name: &str) -> Option<Value> {
        let state = self.lock();
        state
            .documents
            .values()
            .find(|doc| doc.folder == folder.as_str() && doc.name == name)
            .map(|doc| doc.data.clone())
    }

    /// Number of documents currently stored in a folder.
    pub fn count(&self, folder: &FolderId) -> usize {
        let state = self.lock();
        state
            .documents
            .values()
            .filter(|doc| doc.folder == folder.as_str())
            .count()
    }

    /// Ordered record of every store call that began executing.
    pub fn journal(&self) -> Vec<String> {
        self.lock().journal.clone()
    }

    /// Highest number of store calls ever in flight simultaneously.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, entry: String) -> Result<(), StoreError> {
        self.session.ensure_connected()?;
        if self.fail_unauthorized.swap(false, Ordering::SeqCst) {
            self.session.expire("unauthorized store call");
            return Err(StoreError::Unauthorized);
        }
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.lock().journal.push(entry);
        Ok(())
    }

    fn end(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn available(&self) -> bool {
        self.session.status().is_connected()
    }

    async fn list(&self, folder: &FolderId) -> Result<Vec<DocumentHandle>, StoreError> {
        self.begin(format!("list {folder}"))?;
        tokio::task::yield_now().await;
        let handles = {
            let state = self.lock();
            let mut handles: Vec<DocumentHandle> = state
                .documents
                .iter()
                .filter(|(_, doc)| doc.folder == folder.as_str())
                .map(|(id, doc)| DocumentHandle {
                    id: id.clone(),
                    name: doc.name.clone(),
                    mime_type: "application/json".into(),
                    modified_time: Some(doc.modified),
                })
                .collect();
            handles.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
            handles
        };
        self.end();
        Ok(handles)
    }

    async fn read(&self, file_id: &str) -> Result<Value, StoreError> {
        self.begin(format!("read {file_id}"))?;
        tokio::task::yield_now().await;
        let result = self
            .lock()
            .documents
            .get(file_id)
            .map(|doc| doc.data.clone())
            .ok_or_else(|| StoreError::Transport(format!("unknown document {file_id}")));
        self.end();
        result
    }

    async fn write(
        &self,
        folder: &FolderId,
        name: &str,
        data: &Value,
        existing_id: Option<&str>,
    ) -> Result<String, StoreError> {
        self.begin(format!("write {folder}/{name}"))?;
        tokio::task::yield_now().await;
        let result = {
            let mut state = self.lock();
            match existing_id {
                Some(id) => {
                    let Some(doc) = state.documents.get_mut(id) else {
                        self.end();
                        return Err(StoreError::Transport(format!("unknown document {id}")));
                    };
                    doc.data = data.clone();
                    doc.name = name.to_string();
                    doc.modified = Utc::now();
                    Ok(id.to_string())
                }
                None => {
                    state.next_id += 1;
                    let id = format!("mem-{}", state.next_id);
                    state.documents.insert(
                        id.clone(),
                        StoredDocument {
                            folder: folder.as_str().to_string(),
                            name: name.to_string(),
                            data: data.clone(),
                            modified: Utc::now(),
                        },
                    );
                    Ok(id)
                }
            }
        };
        self.end();
        result
    }

    async fn delete(&self, file_id: &str) -> Result<(), StoreError> {
        self.begin(format!("delete {file_id}"))?;
        tokio::task::yield_now().await;
        let result = if self.lock().documents.remove(file_id).is_some() {
            Ok(())
        } else {
            Err(StoreError::Transport(format!(
                "unknown document {file_id}"
            )))
        };
        self.end();
        result
    }
}
