//! S3-compatible object store (AWS S3, MinIO) using path-style addressing
//! and AWS Signature Version 4.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode, Url};
use sha2::{Digest, Sha256};

use super::{
    encode_key_path, validate_key, ByteStream, ObjectStore, ObjectStoreError,
    MAX_PRESIGNED_LIFETIME,
};

const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

#[derive(Clone)]
pub struct S3Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

/// Scheme and authority of an S3 endpoint, e.g. `http` + `minio:9000`.
#[derive(Debug, Clone)]
struct Endpoint {
    scheme: String,
    host: String,
}

impl Endpoint {
    fn parse(raw: &str) -> Result<Self, anyhow::Error> {
        let url = Url::parse(raw)?;
        let host = url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("S3 endpoint '{raw}' has no host"))?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
        })
    }
}

pub struct S3Store {
    bucket: String,
    client: Client,
    credentials: S3Credentials,
    endpoint: Endpoint,
    /// Host used for presigned URLs; the signature covers it, so it must be the public one.
    presign_endpoint: Endpoint,
}

impl S3Store {
    /// Connect to the bucket, creating it if it does not exist yet.
    pub async fn new(
        endpoint: &str,
        external_url: Option<&str>,
        bucket: &str,
        credentials: S3Credentials,
    ) -> Result<Self, anyhow::Error> {
        let endpoint = Endpoint::parse(endpoint)?;
        let presign_endpoint = match external_url {
            Some(url) => Endpoint::parse(url)?,
            None => endpoint.clone(),
        };

        let store = Self {
            bucket: bucket.to_string(),
            client: Client::builder().build()?,
            credentials,
            endpoint,
            presign_endpoint,
        };

        store.ensure_bucket().await?;
        Ok(store)
    }

    async fn ensure_bucket(&self) -> Result<(), anyhow::Error> {
        let path = format!("/{}", self.bucket);
        let resp = self
            .signed_request(Method::HEAD, &path, Bytes::new(), None)
            .await?;

        match resp.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                let resp = self
                    .signed_request(Method::PUT, &path, Bytes::new(), None)
                    .await?;
                if !resp.status().is_success() {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    anyhow::bail!("Failed to create bucket {} ({status}): {body}", self.bucket);
                }
                tracing::info!(bucket = %self.bucket, "Created object storage bucket");
                Ok(())
            }
            status => anyhow::bail!("Bucket check for {} failed ({status})", self.bucket),
        }
    }

    fn object_path(&self, key: &str) -> String {
        format!("/{}/{}", self.bucket, encode_key_path(key))
    }

    /// Send a header-signed request. `path` must already be URI-encoded.
    async fn signed_request(
        &self,
        method: Method,
        path: &str,
        body: Bytes,
        extra_headers: Option<&[(&str, String)]>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = if body.is_empty() {
            EMPTY_PAYLOAD_SHA256.to_string()
        } else {
            hex::encode(Sha256::digest(&body))
        };

        let authorization = authorization_header(
            &self.credentials,
            method.as_str(),
            &self.endpoint.host,
            path,
            &payload_hash,
            now,
        );

        let url = format!("{}://{}{}", self.endpoint.scheme, self.endpoint.host, path);
        let mut request = self
            .client
            .request(method, url)
            .header("x-amz-date", amz_date)
            .header("x-amz-content-sha256", payload_hash)
            .header("Authorization", authorization);
        for (name, value) in extra_headers.unwrap_or_default() {
            request = request.header(*name, value);
        }
        if !body.is_empty() {
            request = request.body(body);
        }
        request.send().await
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        validate_key(key)?;
        let headers = [("Content-Type", content_type.to_string())];
        let resp = self
            .signed_request(Method::PUT, &self.object_path(key), data, Some(&headers[..]))
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Backend(format!(
                "S3 upload failed ({status}): {body}"
            )));
        }

        Ok(())
    }

    async fn open_read(&self, key: &str, offset: u64) -> Result<ByteStream, ObjectStoreError> {
        validate_key(key)?;
        let range = [("Range", format!("bytes={offset}-"))];
        let headers = if offset > 0 { Some(&range[..]) } else { None };

        let resp = self
            .signed_request(Method::GET, &self.object_path(key), Bytes::new(), headers)
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ObjectStoreError::NotFound(key.to_string()));
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Backend(format!(
                "S3 download failed ({status}): {body}"
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
        let path = self.object_path(key);
        let query = presigned_query(
            &self.credentials,
            &self.presign_endpoint.host,
            &path,
            Utc::now(),
            expires_in.min(MAX_PRESIGNED_LIFETIME).as_secs(),
        );
        Ok(format!(
            "{}://{}{path}?{query}",
            self.presign_endpoint.scheme, self.presign_endpoint.host
        ))
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        validate_key(key)?;
        let resp = self
            .signed_request(Method::DELETE, &self.object_path(key), Bytes::new(), None)
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        // S3 answers 204 for missing keys too; treat 404 the same way
        if !resp.status().is_success() && resp.status() != StatusCode::NOT_FOUND {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Backend(format!(
                "S3 delete failed ({status}): {body}"
            )));
        }

        Ok(())
    }
}

// ============================================================================
// Signature Version 4
// ============================================================================

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn credential_scope(credentials: &S3Credentials, now: DateTime<Utc>) -> String {
    format!(
        "{}/{}/s3/aws4_request",
        now.format("%Y%m%d"),
        credentials.region
    )
}

fn signature(credentials: &S3Credentials, now: DateTime<Utc>, canonical_request: &str) -> String {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{}\n{}",
        credential_scope(credentials, now),
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let date_key = hmac_sha256(
        format!("AWS4{}", credentials.secret_key).as_bytes(),
        now.format("%Y%m%d").to_string().as_bytes(),
    );
    let region_key = hmac_sha256(&date_key, credentials.region.as_bytes());
    let service_key = hmac_sha256(&region_key, b"s3");
    let signing_key = hmac_sha256(&service_key, b"aws4_request");

    hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()))
}

fn authorization_header(
    credentials: &S3Credentials,
    method: &str,
    host: &str,
    canonical_uri: &str,
    payload_hash: &str,
    now: DateTime<Utc>,
) -> String {
    let amz_date = now.format("%Y%m%dT%H%M%SZ");
    let signed_headers = "host;x-amz-content-sha256;x-amz-date";
    let canonical_request = format!(
        "{method}\n{canonical_uri}\n\nhost:{host}\nx-amz-content-sha256:{payload_hash}\n\
         x-amz-date:{amz_date}\n\n{signed_headers}\n{payload_hash}"
    );

    format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={signed_headers}, Signature={}",
        credentials.access_key,
        credential_scope(credentials, now),
        signature(credentials, now, &canonical_request)
    )
}

/// Query string (including `X-Amz-Signature`) for a presigned GET of `canonical_uri`.
fn presigned_query(
    credentials: &S3Credentials,
    host: &str,
    canonical_uri: &str,
    now: DateTime<Utc>,
    expires_secs: u64,
) -> String {
    let credential = format!(
        "{}/{}",
        credentials.access_key,
        credential_scope(credentials, now)
    );
    let canonical_query = format!(
        "X-Amz-Algorithm=AWS4-HMAC-SHA256&X-Amz-Credential={}&X-Amz-Date={}\
         &X-Amz-Expires={expires_secs}&X-Amz-SignedHeaders=host",
        urlencoding::encode(&credential),
        now.format("%Y%m%dT%H%M%SZ")
    );
    let canonical_request =
        format!("GET\n{canonical_uri}\n{canonical_query}\nhost:{host}\n\nhost\nUNSIGNED-PAYLOAD");

    format!(
        "{canonical_query}&X-Amz-Signature={}",
        signature(credentials, now, &canonical_request)
    )
}
