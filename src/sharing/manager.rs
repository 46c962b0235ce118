use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;

use super::policy::{authorize, Action};
use super::SHARE_TTL_DAYS;
use crate::auth::Identity;
use crate::error::DocumentError;
use crate::storage::models::{DocumentRecord, ShareMode};
use crate::storage::Database;

/// The share settings of one document as returned to its owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShareDescriptor {
    pub share_token: Option<String>,
    pub share_type: ShareMode,
    pub share_code: Option<String>,
    pub share_expires_at: Option<DateTime<Utc>>,
    pub filename: String,
    pub is_shared: bool,
}

impl From<&DocumentRecord> for ShareDescriptor {
    fn from(document: &DocumentRecord) -> Self {
        Self {
            share_token: document.share_token.clone(),
            share_type: document.share_mode,
            share_code: document.share_code.clone(),
            share_expires_at: document.share_expires_at,
            filename: document.filename.clone(),
            is_shared: document.is_shared,
        }
    }
}

/// One entry of the caller's active-share listing.
#[derive(Debug, Clone, Serialize)]
pub struct SharedDocumentSummary {
    pub id: String,
    pub filename: String,
    pub file_size: u64,
    pub mime_type: String,
    pub download_count: u64,
    pub share_token: Option<String>,
    pub share_type: ShareMode,
    pub share_code: Option<String>,
    pub share_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DocumentRecord> for SharedDocumentSummary {
    fn from(document: DocumentRecord) -> Self {
        Self {
            id: document.id,
            filename: document.filename,
            file_size: document.byte_size,
            mime_type: document.mime_type,
            download_count: document.download_count,
            share_token: document.share_token,
            share_type: document.share_mode,
            share_code: document.share_code,
            share_expires_at: document.share_expires_at,
            created_at: document.created_at,
            updated_at: document.updated_at,
        }
    }
}

/// Share codes are exactly four ASCII digits.
pub fn validate_share_code(code: &str) -> Result<(), DocumentError> {
    if code.len() == 4 && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(DocumentError::InvalidArgument(
            "Share code must be exactly 4 digits".to_string(),
        ))
    }
}

fn generate_share_code() -> String {
    format!("{:04}", rand::rng().random_range(0..10_000u32))
}

fn generate_share_token() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// Treat an empty string the same as an absent code.
fn supplied(code: Option<&str>) -> Option<&str> {
    code.filter(|c| !c.is_empty())
}

/// Work out the code to store for `mode`.
///
/// `current` is kept when no code is supplied and the share is already
/// password protected; otherwise a fresh code is drawn.
fn resolve_share_code(
    mode: ShareMode,
    requested: Option<&str>,
    current: Option<&str>,
) -> Result<Option<String>, DocumentError> {
    match mode {
        ShareMode::None => Err(DocumentError::InvalidArgument(
            "Share type must be public or with_password".to_string(),
        )),
        ShareMode::Public => Ok(None),
        ShareMode::WithPassword => match supplied(requested) {
            Some(code) => {
                validate_share_code(code)?;
                Ok(Some(code.to_string()))
            }
            None => Ok(Some(
                current
                    .map(str::to_string)
                    .unwrap_or_else(generate_share_code),
            )),
        },
    }
}

/// Share a document, or refresh its existing share.
///
/// The token survives while the current share is still valid; a missing or
/// expired token is replaced. Expiry is always reset to [`SHARE_TTL_DAYS`].
pub fn create_or_refresh_share(
    document: &mut DocumentRecord,
    mode: ShareMode,
    code: Option<&str>,
    identity: &Identity,
    now: DateTime<Utc>,
) -> Result<ShareDescriptor, DocumentError> {
    authorize(Action::ManageShare, document, identity)?;
    let share_code = resolve_share_code(mode, code, None)?;

    let token_expired = document
        .share_expires_at
        .is_some_and(|expires| expires <= now);
    if document.share_token.is_none() || token_expired {
        document.share_token = Some(generate_share_token());
    }

    document.is_shared = true;
    document.share_mode = mode;
    document.share_code = share_code;
    document.share_expires_at = Some(now + Duration::days(SHARE_TTL_DAYS));

    Ok(ShareDescriptor::from(&*document))
}

/// Change the mode, code or expiry of an existing share without touching its token.
///
/// A missing `expire_days` makes the share permanent.
pub fn update_share(
    document: &mut DocumentRecord,
    mode: ShareMode,
    code: Option<&str>,
    expire_days: Option<i64>,
    identity: &Identity,
    now: DateTime<Utc>,
) -> Result<ShareDescriptor, DocumentError> {
    authorize(Action::ManageShare, document, identity)?;
    if !document.is_shared || document.share_token.is_none() {
        return Err(DocumentError::NotFound(
            "Document not found or not shared".to_string(),
        ));
    }

    let expires_at = match expire_days {
        Some(days) if days < 1 => {
            return Err(DocumentError::InvalidArgument(
                "expire_days must be at least 1".to_string(),
            ));
        }
        Some(days) => Some(
            Duration::try_days(days)
                .and_then(|ttl| now.checked_add_signed(ttl))
                .ok_or_else(|| {
                    DocumentError::InvalidArgument("expire_days is too large".to_string())
                })?,
        ),
        None => None,
    };

    let current_code = match document.share_mode {
        ShareMode::WithPassword => document.share_code.as_deref(),
        _ => None,
    };
    let share_code = resolve_share_code(mode, code, current_code)?;

    document.share_mode = mode;
    document.share_code = share_code;
    document.share_expires_at = expires_at;

    Ok(ShareDescriptor::from(&*document))
}

/// Remove the share link. Cancelling an unshared document is a no-op.
pub fn cancel_share(
    document: &mut DocumentRecord,
    identity: &Identity,
) -> Result<ShareDescriptor, DocumentError> {
    authorize(Action::ManageShare, document, identity)?;
    document.clear_share();
    Ok(ShareDescriptor::from(&*document))
}

// ============================================================================
// Persisted operations
// ============================================================================

pub fn share_document(
    db: &Database,
    document_id: &str,
    mode: ShareMode,
    code: Option<&str>,
    identity: &Identity,
) -> Result<ShareDescriptor, DocumentError> {
    let now = Utc::now();
    let descriptor = db
        .modify_document(document_id, |document| {
            create_or_refresh_share(document, mode, code, identity, now)
        })?
        .ok_or_else(DocumentError::document_not_found)?;

    tracing::info!(
        document_id = %document_id,
        share_mode = mode.as_str(),
        expires_at = ?descriptor.share_expires_at,
        "Document shared"
    );
    Ok(descriptor)
}

pub fn update_document_share(
    db: &Database,
    document_id: &str,
    mode: ShareMode,
    code: Option<&str>,
    expire_days: Option<i64>,
    identity: &Identity,
) -> Result<ShareDescriptor, DocumentError> {
    let now = Utc::now();
    let descriptor = db
        .modify_document(document_id, |document| {
            update_share(document, mode, code, expire_days, identity, now)
        })?
        .ok_or_else(|| DocumentError::NotFound("Document not found or not shared".to_string()))?;

    tracing::info!(
        document_id = %document_id,
        share_mode = mode.as_str(),
        expires_at = ?descriptor.share_expires_at,
        "Share updated"
    );
    Ok(descriptor)
}

pub fn cancel_document_share(
    db: &Database,
    document_id: &str,
    identity: &Identity,
) -> Result<ShareDescriptor, DocumentError> {
    let descriptor = db
        .modify_document(document_id, |document| cancel_share(document, identity))?
        .ok_or_else(DocumentError::document_not_found)?;

    tracing::info!(document_id = %document_id, "Share cancelled");
    Ok(descriptor)
}

/// Current share settings, visible to the owner only.
pub fn document_share_info(
    db: &Database,
    document_id: &str,
    identity: &Identity,
) -> Result<ShareDescriptor, DocumentError> {
    let document = db
        .get_document(document_id)?
        .ok_or_else(DocumentError::document_not_found)?;
    authorize(Action::ViewShare, &document, identity)?;
    Ok(ShareDescriptor::from(&document))
}

/// Active shares owned by the caller, most recently changed first.
pub fn list_my_shares(
    db: &Database,
    identity: &Identity,
    now: DateTime<Utc>,
) -> Result<Vec<SharedDocumentSummary>, DocumentError> {
    Ok(db
        .list_active_shares(&identity.user_id, now)?
        .into_iter()
        .map(SharedDocumentSummary::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_share_code() {
        assert!(validate_share_code("0042").is_ok());
        assert!(validate_share_code("9999").is_ok());
        for bad in ["", "123", "12345", "12a4", "١٢٣٤", " 123"] {
            assert!(
                matches!(
                    validate_share_code(bad),
                    Err(DocumentError::InvalidArgument(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_generated_codes_are_four_digits() {
        for _ in 0..200 {
            let code = generate_share_code();
            assert!(validate_share_code(&code).is_ok(), "{code}");
        }
    }

    #[test]
    fn test_generated_tokens_are_128_bit_hex() {
        let token = generate_share_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_share_token());
    }

    #[test]
    fn test_resolve_share_code_rules() {
        assert!(matches!(
            resolve_share_code(ShareMode::None, None, None),
            Err(DocumentError::InvalidArgument(_))
        ));
        assert_eq!(
            resolve_share_code(ShareMode::Public, Some("1234"), None).unwrap(),
            None
        );
        assert_eq!(
            resolve_share_code(ShareMode::WithPassword, Some("0007"), Some("1111")).unwrap(),
            Some("0007".to_string())
        );
        assert_eq!(
            resolve_share_code(ShareMode::WithPassword, Some(""), Some("1111")).unwrap(),
            Some("1111".to_string())
        );
    }
}
