//! Share-link lifecycle and anonymous access control.
//!
//! A document carries at most one share link. The owner creates, updates and
//! cancels it ([`manager`]); anonymous callers resolve it by token
//! ([`access`]). Every ownership and visibility decision goes through
//! [`policy::authorize`].

pub mod access;
pub mod manager;
pub mod policy;

pub use access::{
    access_share, check_share_kind, presigned_url_lifetime, resolve_share, ShareKind,
    SharedAccess,
};
pub use manager::{
    cancel_document_share, cancel_share, create_or_refresh_share, document_share_info,
    list_my_shares, share_document, update_document_share, update_share, validate_share_code,
    ShareDescriptor, SharedDocumentSummary,
};
pub use policy::{authorize, authorize_upload, Action};

/// Lifetime of a share created (or refreshed) through the create path.
pub const SHARE_TTL_DAYS: i64 = 7;

/// Shortest presigned URL handed out for a share, even one about to expire.
pub const MIN_SHARE_URL_LIFETIME_SECS: u64 = 600;

/// Presigned URL lifetime for shares without an expiry.
pub const PERMANENT_SHARE_URL_LIFETIME_SECS: u64 = 24 * 60 * 60;

/// Presigned URL lifetime for owner previews.
pub const PREVIEW_URL_LIFETIME_SECS: u64 = 600;
