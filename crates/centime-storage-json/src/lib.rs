//! centime-storage-json
//!
//! Filesystem-backed document store. Folders map to directories beneath a
//! root, document ids are root-relative paths, and writes are staged to a
//! tmp file before being renamed into place. Availability is governed by
//! the shared [`StoreSession`] like any other backend.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use centime_core::store::{DocumentHandle, DocumentStore, FolderId, StoreError, StoreSession};

const DOCUMENT_EXTENSION: &str = "json";
const DOCUMENT_MIME_TYPE: &str = "application/json";
const TMP_SUFFIX: &str = "tmp";

pub struct JsonDocumentStore {
    root: PathBuf,
    session: Arc<StoreSession>,
}

impl JsonDocumentStore {
    pub fn new(root: PathBuf, session: Arc<StoreSession>) -> Result<Self, StoreError> {
        fs::create_dir_all(&root).map_err(io_error)?;
        Ok(Self { root, session })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn folder_dir(&self, folder: &FolderId) -> PathBuf {
        self.root.join(folder.as_str())
    }

    fn document_path(&self, file_id: &str) -> PathBuf {
        self.root.join(file_id)
    }

    fn file_id(&self, folder: &FolderId, name: &str) -> String {
        format!("{}/{}", folder.as_str(), name)
    }
}

#[async_trait]
impl DocumentStore for JsonDocumentStore {
    fn available(&self) -> bool {
        self.session.status().is_connected()
    }

    async fn list(&self, folder: &FolderId) -> Result<Vec<DocumentHandle>, StoreError> {
        self.session.ensure_connected()?;
        debug!(%folder, "listing documents");
        let dir = self.folder_dir(folder);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut handles = Vec::new();
        for entry in fs::read_dir(&dir).map_err(io_error)? {
            let entry = entry.map_err(io_error)?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|ext| ext.to_str()) != Some(DOCUMENT_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            handles.push(DocumentHandle {
                id: self.file_id(folder, name),
                name: name.to_string(),
                mime_type: DOCUMENT_MIME_TYPE.into(),
                modified_time: modified_time(&path),
            });
        }
        handles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(handles)
    }

    async fn read(&self, file_id: &str) -> Result<Value, StoreError> {
        self.session.ensure_connected()?;
        debug!(file_id, "reading document");
        let data = fs::read_to_string(self.document_path(file_id)).map_err(io_error)?;
        serde_json::from_str(&data).map_err(|err| StoreError::Malformed(err.to_string()))
    }

    async fn write(
        &self,
        folder: &FolderId,
        name: &str,
        data: &Value,
        existing_id: Option<&str>,
    ) -> Result<String, StoreError> {
        self.session.ensure_connected()?;
        debug!(%folder, name, updating = existing_id.is_some(), "writing document");
        let (path, id) = match existing_id {
            Some(id) => (self.document_path(id), id.to_string()),
            None => (
                self.folder_dir(folder).join(name),
                self.file_id(folder, name),
            ),
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let json = serde_json::to_string_pretty(data)
            .map_err(|err| StoreError::Malformed(err.to_string()))?;
        let tmp = tmp_path(&path);
        write_atomic(&tmp, &json)?;
        fs::rename(&tmp, &path).map_err(io_error)?;
        Ok(id)
    }

    async fn delete(&self, file_id: &str) -> Result<(), StoreError> {
        self.session.ensure_connected()?;
        debug!(file_id, "deleting document");
        let path = self.document_path(file_id);
        if path.exists() {
            fs::remove_file(&path).map_err(io_error)?;
        }
        Ok(())
    }
}

fn io_error(err: std::io::Error) -> StoreError {
    StoreError::Transport(err.to_string())
}

fn modified_time(path: &Path) -> Option<DateTime<Utc>> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let ext = match path.extension().and_then(|ext| ext.to_str()) {
        Some(existing) => format!("{}.{}", existing, TMP_SUFFIX),
        None => TMP_SUFFIX.to_string(),
    };
    tmp.set_extension(ext);
    tmp
}

fn write_atomic(path: &Path, data: &str) -> Result<(), StoreError> {
    let mut file = File::create(path).map_err(io_error)?;
    file.write_all(data.as_bytes()).map_err(io_error)?;
    file.flush().map_err(io_error)?;
    Ok(())
}
