mod gcs;
mod local;
mod s3;
mod signer;

pub use gcs::GcsStore;
pub use local::LocalStore;
pub use s3::{S3Credentials, S3Store};
pub use signer::UrlSigner;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// Object content as a stream of chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Longest presigned URL lifetime accepted by the cloud backends (7 days).
pub const MAX_PRESIGNED_LIFETIME: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Abstraction over object storage backends.
/// Keys are storage paths -- the raw blobs are meaningless without the document records.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: Bytes, content_type: &str)
        -> Result<(), ObjectStoreError>;

    /// Stream the object starting `offset` bytes in.
    async fn open_read(&self, key: &str, offset: u64) -> Result<ByteStream, ObjectStoreError>;

    /// Mint a time-limited URL that fetches the object without further authorization.
    async fn presigned_url(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, ObjectStoreError>;

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;
}

/// Storage key for a newly uploaded document: `{YYYY/MM/DD}/{owner hash}/{id}{ext}`.
///
/// Only the id makes the key unique; the date and owner segments group objects
/// for browsing.
pub fn document_key(now: DateTime<Utc>, owner_email: &str, id: &str, filename: &str) -> String {
    let owner_hash = hex::encode(Sha256::digest(owner_email.as_bytes()));
    format!(
        "{}/{}/{id}{}",
        now.format("%Y/%m/%d"),
        &owner_hash[..8],
        file_extension(filename)
    )
}

/// Extension of the final path segment, dot included, when it is plain alphanumeric.
fn file_extension(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.bytes().all(|b| b.is_ascii_alphanumeric()) =>
        {
            format!(".{ext}")
        }
        _ => String::new(),
    }
}

/// SHA-256 content fingerprint (hex).
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Percent-encode an object key for use in a URL path, keeping `/` separators.
pub(crate) fn encode_key_path(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Reject keys that could escape a backend's namespace.
pub(crate) fn validate_key(key: &str) -> Result<(), ObjectStoreError> {
    if key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(ObjectStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
