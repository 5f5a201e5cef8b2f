use thiserror::Error;

use crate::store::StoreError;

/// Failures surfaced by ledger and reference-data operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("document not found: {0}")]
    MissingDocument(String),
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}
