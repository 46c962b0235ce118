use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{MIN_SHARE_URL_LIFETIME_SECS, PERMANENT_SHARE_URL_LIFETIME_SECS};
use crate::error::DocumentError;
use crate::object_store::ObjectStore;
use crate::storage::models::{DocumentRecord, ShareMode};
use crate::storage::Database;

/// What an anonymous client needs to know before fetching a share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareKind {
    pub requires_password: bool,
    pub filename: String,
}

/// A granted anonymous download.
#[derive(Debug, Clone, Serialize)]
pub struct SharedAccess {
    pub filename: String,
    pub url: String,
    pub mime_type: String,
    pub file_size: u64,
}

/// Find the document behind an active share token.
///
/// Unknown, cancelled and expired tokens all fail with `NotFoundOrExpired`.
pub fn resolve_share(
    db: &Database,
    token: &str,
    now: DateTime<Utc>,
) -> Result<DocumentRecord, DocumentError> {
    db.get_document_by_share_token(token)?
        .filter(|document| document.share_is_active(now))
        .ok_or(DocumentError::NotFoundOrExpired)
}

pub fn check_share_kind(
    db: &Database,
    token: &str,
    now: DateTime<Utc>,
) -> Result<ShareKind, DocumentError> {
    let document = resolve_share(db, token, now)?;
    Ok(ShareKind {
        requires_password: document.share_mode == ShareMode::WithPassword,
        filename: document.filename,
    })
}

/// Lifetime of the URL handed out for a share.
///
/// Never below ten minutes, so the URL may outlive a share that is about to expire.
pub fn presigned_url_lifetime(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
    match expires_at {
        Some(expires_at) => {
            let remaining = (expires_at - now).num_seconds().max(0) as u64;
            Duration::from_secs(remaining.max(MIN_SHARE_URL_LIFETIME_SECS))
        }
        None => Duration::from_secs(PERMANENT_SHARE_URL_LIFETIME_SECS),
    }
}

fn verify_share_code(document: &DocumentRecord, supplied: Option<&str>) -> Result<(), DocumentError> {
    if document.share_mode != ShareMode::WithPassword {
        return Ok(());
    }
    match supplied.filter(|code| !code.is_empty()) {
        None => Err(DocumentError::CodeRequired),
        Some(code) if document.share_code.as_deref() == Some(code) => Ok(()),
        Some(_) => Err(DocumentError::InvalidCode),
    }
}

/// Grant anonymous access to a shared document.
///
/// The download counter is bumped only once the URL has been minted.
pub async fn access_share(
    db: &Database,
    store: &dyn ObjectStore,
    token: &str,
    code: Option<&str>,
    now: DateTime<Utc>,
) -> Result<SharedAccess, DocumentError> {
    let document = resolve_share(db, token, now)?;
    verify_share_code(&document, code)?;

    let lifetime = presigned_url_lifetime(document.share_expires_at, now);
    let url = store
        .presigned_url(&document.storage_path, lifetime)
        .await
        .map_err(|e| {
            tracing::error!(document_id = %document.id, error = %e, "Failed to mint share URL");
            e
        })?;

    let count = db
        .increment_download_count(&document.id)?
        .ok_or(DocumentError::NotFoundOrExpired)?;

    tracing::info!(
        document_id = %document.id,
        lifetime_secs = lifetime.as_secs(),
        download_count = count,
        "Share accessed"
    );

    Ok(SharedAccess {
        filename: document.filename,
        url,
        mime_type: document.mime_type,
        file_size: document.byte_size,
    })
}
