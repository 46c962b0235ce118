//! doc-share - document storage with time-limited, optionally code-protected share links
//!
//! This crate provides document upload, download and sharing with:
//! - Swappable object storage backends (local filesystem, GCS, S3/MinIO)
//! - redb embedded database for document records (ACID, MVCC, crash-safe)
//! - A share-link lifecycle with a single ownership/visibility policy
//! - REST API with multipart upload and ranged downloads

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod object_store;
pub mod sharing;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use auth::Authenticator;
use config::Config;
use object_store::UrlSigner;
use storage::Database;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub object_store: Arc<dyn object_store::ObjectStore>,
    /// Present when objects are served through `/_objects`
    pub url_signer: Option<UrlSigner>,
    pub auth: Authenticator,
}
