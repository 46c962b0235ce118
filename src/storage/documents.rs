use chrono::{DateTime, Utc};
use redb::{ReadableTable, WriteTransaction};

use super::db::{Database, DatabaseError};
use super::models::DocumentRecord;
use super::tables::*;

impl Database {
    // ========================================================================
    // Document operations
    // ========================================================================

    /// Insert a new document record.
    ///
    /// Fails with `DuplicateIdentifier` when the id or the storage path is already taken.
    pub fn create_document(&self, document: &DocumentRecord) -> Result<(), DatabaseError> {
        debug_assert!(!document.id.is_empty(), "document id must not be empty");
        debug_assert!(
            !document.storage_path.is_empty(),
            "document storage path must not be empty"
        );

        let write_txn = self.begin_write()?;
        {
            let documents = write_txn.open_table(DOCUMENTS)?;
            if documents.get(document.id.as_str())?.is_some() {
                return Err(DatabaseError::DuplicateIdentifier(document.id.clone()));
            }
            let paths = write_txn.open_table(STORAGE_PATHS)?;
            if paths.get(document.storage_path.as_str())?.is_some() {
                return Err(DatabaseError::DuplicateIdentifier(
                    document.storage_path.clone(),
                ));
            }
        }
        write_document(&write_txn, document, None)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Get a document by its id
    pub fn get_document(&self, id: &str) -> Result<Option<DocumentRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(DOCUMENTS)?;
        decode_document(&table, id)
    }

    /// Upsert a document as-is, keeping every index in sync.
    pub fn save_document(&self, document: &DocumentRecord) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        let previous = {
            let table = write_txn.open_table(DOCUMENTS)?;
            decode_document(&table, &document.id)?
        };
        write_document(&write_txn, document, previous.as_ref())?;
        write_txn.commit()?;
        Ok(())
    }

    /// Read-modify-write a single document inside one write transaction.
    ///
    /// Returns `Ok(None)` when the document does not exist. An error from `f`
    /// aborts the transaction, leaving the stored record untouched.
    pub fn modify_document<T, E, F>(&self, id: &str, f: F) -> Result<Option<T>, E>
    where
        E: From<DatabaseError>,
        F: FnOnce(&mut DocumentRecord) -> Result<T, E>,
    {
        let write_txn = self.begin_write()?;
        let previous = {
            let table = write_txn.open_table(DOCUMENTS).map_err(DatabaseError::from)?;
            decode_document(&table, id)?
        };

        let Some(previous) = previous else {
            write_txn.abort().map_err(DatabaseError::from)?;
            return Ok(None);
        };

        let mut document = previous.clone();
        let output = match f(&mut document) {
            Ok(output) => output,
            Err(e) => {
                write_txn.abort().map_err(DatabaseError::from)?;
                return Err(e);
            }
        };

        document.updated_at = Utc::now();
        write_document(&write_txn, &document, Some(&previous))?;
        write_txn.commit().map_err(DatabaseError::from)?;
        Ok(Some(output))
    }

    /// Atomically bump the download counter, returning the new value.
    pub fn increment_download_count(&self, id: &str) -> Result<Option<u64>, DatabaseError> {
        let write_txn = self.begin_write()?;
        let count = {
            let mut table = write_txn.open_table(DOCUMENTS)?;
            match decode_document(&table, id)? {
                Some(mut document) => {
                    document.download_count = document.download_count.saturating_add(1);
                    let data = rmp_serde::to_vec_named(&document)?;
                    table.insert(id, data.as_slice())?;
                    Some(document.download_count)
                }
                None => None,
            }
        };
        write_txn.commit()?;
        Ok(count)
    }

    /// All documents uploaded by `owner_id`, newest first
    pub fn list_documents_by_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<DocumentRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let owner_table = read_txn.open_table(OWNER_DOCUMENTS)?;
        let documents_table = read_txn.open_table(DOCUMENTS)?;

        let document_ids: Vec<String> = match owner_table.get(owner_id)? {
            Some(data) => rmp_serde::from_slice(data.value())?,
            None => return Ok(Vec::new()),
        };

        let mut documents = Vec::with_capacity(document_ids.len());
        for document_id in document_ids {
            if let Some(document) = decode_document(&documents_table, &document_id)? {
                if document.owner_id == owner_id {
                    documents.push(document);
                }
            }
        }

        documents.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(documents)
    }

    /// Look up the document stored under an object key
    pub fn get_document_by_storage_path(
        &self,
        storage_path: &str,
    ) -> Result<Option<DocumentRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let paths_table = read_txn.open_table(STORAGE_PATHS)?;

        let id = match paths_table.get(storage_path)? {
            Some(data) => data.value().to_string(),
            None => return Ok(None),
        };

        let documents_table = read_txn.open_table(DOCUMENTS)?;
        decode_document(&documents_table, &id)
    }

    /// Resolve a share token to its document (resolves token -> id -> document)
    pub fn get_document_by_share_token(
        &self,
        token: &str,
    ) -> Result<Option<DocumentRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let token_table = read_txn.open_table(SHARE_TOKENS)?;

        let id = match token_table.get(token)? {
            Some(data) => data.value().to_string(),
            None => return Ok(None),
        };

        let documents_table = read_txn.open_table(DOCUMENTS)?;
        Ok(decode_document(&documents_table, &id)?
            .filter(|document| document.share_token.as_deref() == Some(token)))
    }

    /// Shares owned by `owner_id` that currently grant access, most recently updated first
    pub fn list_active_shares(
        &self,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<DocumentRecord>, DatabaseError> {
        let mut shared: Vec<DocumentRecord> = self
            .list_documents_by_owner(owner_id)?
            .into_iter()
            .filter(|document| document.share_is_active(now))
            .collect();
        shared.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(shared)
    }
}

fn decode_document<T>(table: &T, id: &str) -> Result<Option<DocumentRecord>, DatabaseError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let result = match table.get(id)? {
        Some(data) => Some(rmp_serde::from_slice(data.value())?),
        None => None,
    };
    Ok(result)
}

fn read_owner_ids<T>(table: &T, owner_id: &str) -> Result<Vec<String>, DatabaseError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let result = match table.get(owner_id)? {
        Some(data) => rmp_serde::from_slice(data.value())?,
        None => Vec::new(),
    };
    Ok(result)
}

/// Write a record and reconcile the storage path, owner and share token indexes
/// against the previously stored version.
fn write_document(
    write_txn: &WriteTransaction,
    document: &DocumentRecord,
    previous: Option<&DocumentRecord>,
) -> Result<(), DatabaseError> {
    if let Some(previous) = previous {
        if previous.storage_path != document.storage_path {
            return Err(DatabaseError::ImmutableStoragePath(document.id.clone()));
        }
    }

    {
        let mut table = write_txn.open_table(DOCUMENTS)?;
        let data = rmp_serde::to_vec_named(document)?;
        table.insert(document.id.as_str(), data.as_slice())?;
    }

    if previous.is_none() {
        let mut paths = write_txn.open_table(STORAGE_PATHS)?;
        paths.insert(document.storage_path.as_str(), document.id.as_str())?;
    }

    // Maintain owner index
    {
        let mut owner_table = write_txn.open_table(OWNER_DOCUMENTS)?;
        if let Some(previous) = previous.filter(|p| p.owner_id != document.owner_id) {
            let mut document_ids = read_owner_ids(&owner_table, &previous.owner_id)?;
            document_ids.retain(|id| id != &document.id);
            if document_ids.is_empty() {
                owner_table.remove(previous.owner_id.as_str())?;
            } else {
                let data = rmp_serde::to_vec_named(&document_ids)?;
                owner_table.insert(previous.owner_id.as_str(), data.as_slice())?;
            }
        }

        let mut document_ids = read_owner_ids(&owner_table, &document.owner_id)?;
        if !document_ids.contains(&document.id) {
            document_ids.push(document.id.clone());
            let data = rmp_serde::to_vec_named(&document_ids)?;
            owner_table.insert(document.owner_id.as_str(), data.as_slice())?;
        }
    }

    // Maintain share token index
    let previous_token = previous.and_then(|p| p.share_token.as_deref());
    if previous_token != document.share_token.as_deref() {
        let mut token_table = write_txn.open_table(SHARE_TOKENS)?;
        if let Some(old) = previous_token {
            token_table.remove(old)?;
        }
        if let Some(new) = document.share_token.as_deref() {
            token_table.insert(new, document.id.as_str())?;
        }
    }

    Ok(())
}
