use async_trait::async_trait;
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncSeekExt;
use tokio_util::io::ReaderStream;

use super::{validate_key, ByteStream, ObjectStore, ObjectStoreError, UrlSigner};

/// Local filesystem object store for development and testing.
///
/// Presigned URLs point back at this service's `/_objects` route and are
/// authenticated with the configured [`UrlSigner`].
pub struct LocalStore {
    base_path: PathBuf,
    signer: UrlSigner,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(base_path: P, signer: UrlSigner) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path, signer })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        _content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;
        Ok(())
    }

    async fn open_read(&self, key: &str, offset: u64) -> Result<ByteStream, ObjectStoreError> {
        let path = self.object_path(key)?;
        let mut file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ObjectStoreError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }
        Ok(Box::pin(ReaderStream::new(file)))
    }

    async fn presigned_url(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, ObjectStoreError> {
        validate_key(key)?;
        let lifetime = chrono::Duration::from_std(expires_in)
            .map_err(|e| ObjectStoreError::Backend(format!("Invalid URL lifetime: {e}")))?;
        Ok(self.signer.sign(key, chrono::Utc::now() + lifetime))
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let path = self.object_path(key)?;
        if path.exists() {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }
}
