use thiserror::Error;

use crate::object_store::ObjectStoreError;
use crate::storage::DatabaseError;

/// Failures surfaced by document, share and access operations.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("Identifier already exists: {0}")]
    DuplicateIdentifier(String),
    /// Absent and expired shares are reported identically.
    #[error("Share not found or expired")]
    NotFoundOrExpired,
    #[error("Share code required")]
    CodeRequired,
    #[error("Invalid share code")]
    InvalidCode,
    #[error("Storage error: {0}")]
    Storage(#[from] ObjectStoreError),
    #[error("Database error: {0}")]
    Database(DatabaseError),
}

impl From<DatabaseError> for DocumentError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::DuplicateIdentifier(id) => DocumentError::DuplicateIdentifier(id),
            other => DocumentError::Database(other),
        }
    }
}

impl DocumentError {
    pub fn document_not_found() -> Self {
        DocumentError::NotFound("Document not found".to_string())
    }
}
