use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::{
    encode_key_path, validate_key, ByteStream, ObjectStore, ObjectStoreError,
    MAX_PRESIGNED_LIFETIME,
};

const GCS_HOST: &str = "storage.googleapis.com";

/// Fallback lifetime when the token endpoint omits `expires_in`
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;
/// Tokens are refreshed this long before they expire
const TOKEN_REFRESH_MARGIN_SECS: i64 = 300;

/// Google Cloud Storage object store backend.
pub struct GcsStore {
    bucket: String,
    client: Client,
    access_token: tokio::sync::RwLock<CachedToken>,
    /// Service account key; required for V4 signed URLs
    service_account: Option<ServiceAccountKey>,
}

#[derive(Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// OAuth access token with the instant it stops being accepted.
#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn empty() -> Self {
        Self {
            value: String::new(),
            expires_at: DateTime::<Utc>::MIN_UTC,
        }
    }

    fn from_response(resp: TokenResponse, now: DateTime<Utc>) -> Self {
        let lifetime = resp
            .expires_in
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        Self {
            value: resp.access_token,
            expires_at: now + chrono::Duration::seconds(lifetime),
        }
    }

    fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.value.is_empty()
            || now + chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) >= self.expires_at
    }
}

impl GcsStore {
    pub async fn new(bucket: &str, credentials_file: Option<&str>) -> Result<Self, anyhow::Error> {
        let client = Client::builder().build()?;

        let service_account = match credentials_file {
            Some(path) => {
                let key_json = tokio::fs::read_to_string(path).await?;
                Some(serde_json::from_str::<ServiceAccountKey>(&key_json)?)
            }
            None => None,
        };

        let store = Self {
            bucket: bucket.to_string(),
            client,
            access_token: tokio::sync::RwLock::new(CachedToken::empty()),
            service_account,
        };

        store.bearer_token().await?;
        Ok(store)
    }

    /// Current access token, fetching a new one when it is missing or close to expiry.
    async fn bearer_token(&self) -> Result<String, ObjectStoreError> {
        {
            let cached = self.access_token.read().await;
            if !cached.needs_refresh(Utc::now()) {
                return Ok(cached.value.clone());
            }
        }

        let mut cached = self.access_token.write().await;
        // Another request may have refreshed while we waited for the lock
        if cached.needs_refresh(Utc::now()) {
            let resp = match self.service_account {
                Some(ref key) => self.token_from_service_account(key).await,
                None => self.token_from_metadata_server().await,
            }
            .map_err(|e| ObjectStoreError::Backend(format!("GCS token refresh failed: {e}")))?;
            *cached = CachedToken::from_response(resp, Utc::now());
            tracing::debug!(expires_at = %cached.expires_at, "Refreshed GCS access token");
        }
        Ok(cached.value.clone())
    }

    async fn token_from_service_account(
        &self,
        key: &ServiceAccountKey,
    ) -> Result<TokenResponse, anyhow::Error> {
        let now = Utc::now().timestamp();
        let claims = serde_json::json!({
            "iss": key.client_email,
            "scope": "https://www.googleapis.com/auth/devstorage.read_write",
            "aud": key.token_uri,
            "iat": now,
            "exp": now + 3600,
        });

        // Build JWT (header.claims.signature)
        let header = base64_url_encode(&serde_json::to_vec(&serde_json::json!({
            "alg": "RS256",
            "typ": "JWT"
        }))?);
        let payload = base64_url_encode(&serde_json::to_vec(&claims)?);
        let unsigned = format!("{header}.{payload}");

        let signature = sign_rsa_sha256(unsigned.as_bytes(), &key.private_key)?;
        let jwt = format!("{unsigned}.{}", base64_url_encode(&signature));

        let resp: TokenResponse = self
            .client
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt),
            ])
            .send()
            .await?
            .json()
            .await?;

        Ok(resp)
    }

    async fn token_from_metadata_server(&self) -> Result<TokenResponse, anyhow::Error> {
        let resp: TokenResponse = self
            .client
            .get("http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token")
            .header("Metadata-Flavor", "Google")
            .send()
            .await?
            .json()
            .await?;

        Ok(resp)
    }

    fn upload_url(&self, key: &str) -> String {
        format!(
            "https://{GCS_HOST}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.bucket,
            urlencoding::encode(key)
        )
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "https://{GCS_HOST}/storage/v1/b/{}/o/{}",
            self.bucket,
            urlencoding::encode(key)
        )
    }

    /// Build a V4 signed GET URL (GOOG4-RSA-SHA256).
    fn signed_url(
        &self,
        key: &ServiceAccountKey,
        object: &str,
        now: DateTime<Utc>,
        expires_in: Duration,
    ) -> Result<String, ObjectStoreError> {
        let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();
        let datestamp = now.format("%Y%m%d").to_string();
        let scope = format!("{datestamp}/auto/storage/goog4_request");
        let credential = format!("{}/{scope}", key.client_email);
        let expires = expires_in.min(MAX_PRESIGNED_LIFETIME).as_secs();

        let canonical_uri = format!("/{}/{}", self.bucket, encode_key_path(object));
        let canonical_query = format!(
            "X-Goog-Algorithm=GOOG4-RSA-SHA256&X-Goog-Credential={}&X-Goog-Date={timestamp}\
             &X-Goog-Expires={expires}&X-Goog-SignedHeaders=host",
            urlencoding::encode(&credential)
        );
        let canonical_request = format!(
            "GET\n{canonical_uri}\n{canonical_query}\nhost:{GCS_HOST}\n\nhost\nUNSIGNED-PAYLOAD"
        );
        let string_to_sign = format!(
            "GOOG4-RSA-SHA256\n{timestamp}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signature = sign_rsa_sha256(string_to_sign.as_bytes(), &key.private_key)
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        Ok(format!(
            "https://{GCS_HOST}{canonical_uri}?{canonical_query}&X-Goog-Signature={}",
            hex::encode(signature)
        ))
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        validate_key(key)?;
        let token = self.bearer_token().await?;

        let resp = self
            .client
            .post(self.upload_url(key))
            .bearer_auth(&token)
            .header("Content-Type", content_type)
            .body(data)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Backend(format!(
                "GCS upload failed ({status}): {body}"
            )));
        }

        Ok(())
    }

    async fn open_read(&self, key: &str, offset: u64) -> Result<ByteStream, ObjectStoreError> {
        let token = self.bearer_token().await?;

        let mut request = self
            .client
            .get(format!("{}?alt=media", self.object_url(key)))
            .bearer_auth(&token);
        if offset > 0 {
            request = request.header("Range", format!("bytes={offset}-"));
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ObjectStoreError::NotFound(key.to_string()));
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Backend(format!(
                "GCS download failed ({status}): {body}"
            )));
        }

        Ok(Box::pin(resp.bytes_stream().map_err(std::io::Error::other)))
    }

    async fn presigned_url(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, ObjectStoreError> {
        validate_key(key)?;
        let service_account = self.service_account.as_ref().ok_or_else(|| {
            ObjectStoreError::Unsupported(
                "signed URLs require GCS_CREDENTIALS_FILE with a service account key".to_string(),
            )
        })?;
        self.signed_url(service_account, key, Utc::now(), expires_in)
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let token = self.bearer_token().await?;

        let resp = self
            .client
            .delete(self.object_url(key))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        // 404 is fine -- object already gone
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Backend(format!(
                "GCS delete failed ({status}): {body}"
            )));
        }

        Ok(())
    }
}

fn base64_url_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

fn sign_rsa_sha256(data: &[u8], private_key_pem: &str) -> Result<Vec<u8>, anyhow::Error> {
    // Strip PEM headers and decode base64
    let der_b64: String = private_key_pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    let der = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, der_b64.trim())?;

    // Use ring for RSA signing
    let key_pair = ring::signature::RsaKeyPair::from_pkcs8(&der)
        .map_err(|e| anyhow::anyhow!("Failed to parse RSA key: {e}"))?;

    let mut signature = vec![0u8; key_pair.public().modulus_len()];
    key_pair
        .sign(
            &ring::signature::RSA_PKCS1_SHA256,
            &ring::rand::SystemRandom::new(),
            data,
            &mut signature,
        )
        .map_err(|e| anyhow::anyhow!("Failed to sign: {e}"))?;

    Ok(signature)
}
