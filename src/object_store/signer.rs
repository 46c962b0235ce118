//! HMAC-signed object URLs for backends without native presigning.
//!
//! URL: `{base}/_objects/{key}?expires={unix}&signature={hex}` where the
//! signature is HMAC-SHA256(secret, "{key}\n{expires}").

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::encode_key_path;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct UrlSigner {
    base_url: String,
    secret: Vec<u8>,
}

impl UrlSigner {
    pub fn new(base_url: &str, secret: &[u8]) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            secret: secret.to_vec(),
        }
    }

    pub fn sign(&self, key: &str, expires_at: DateTime<Utc>) -> String {
        let expires = expires_at.timestamp();
        let signature = hex::encode(self.mac(key, expires).finalize().into_bytes());
        format!(
            "{}/_objects/{}?expires={expires}&signature={signature}",
            self.base_url,
            encode_key_path(key)
        )
    }

    /// Check a signature in constant time and that `now` has not passed `expires`.
    pub fn verify(&self, key: &str, expires: i64, signature: &str, now: DateTime<Utc>) -> bool {
        if now.timestamp() > expires {
            return false;
        }
        let Ok(tag) = hex::decode(signature) else {
            return false;
        };
        self.mac(key, expires).verify_slice(&tag).is_ok()
    }

    fn mac(&self, key: &str, expires: i64) -> HmacSha256 {
        let mut mac =
            <HmacSha256 as Mac>::new_from_slice(&self.secret).expect("HMAC accepts any key size");
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac
    }
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_signed_url_round_trip() {
        let signer = UrlSigner::new("http://localhost:8080/", b"secret");
        let now = Utc::now();
        let expires_at = now + Duration::minutes(10);
        let url = signer.sign("2024/01/02/abcd1234/file one.pdf", expires_at);

        assert!(url.starts_with(
            "http://localhost:8080/_objects/2024/01/02/abcd1234/file%20one.pdf?"
        ));

        let signature = url.rsplit("signature=").next().unwrap();
        assert!(signer.verify(
            "2024/01/02/abcd1234/file one.pdf",
            expires_at.timestamp(),
            signature,
            now
        ));
    }

    #[test]
    fn test_signature_rejects_tampering_and_expiry() {
        let signer = UrlSigner::new("http://localhost:8080", b"secret");
        let now = Utc::now();
        let expires_at = now + Duration::minutes(10);
        let url = signer.sign("a/b.txt", expires_at);
        let signature = url.rsplit("signature=").next().unwrap();

        assert!(!signer.verify("a/c.txt", expires_at.timestamp(), signature, now));
        assert!(!signer.verify("a/b.txt", expires_at.timestamp() + 1, signature, now));
        assert!(!signer.verify("a/b.txt", expires_at.timestamp(), "zz", now));
        assert!(!signer.verify(
            "a/b.txt",
            expires_at.timestamp(),
            signature,
            expires_at + Duration::seconds(1)
        ));

        let other = UrlSigner::new("http://localhost:8080", b"other");
        assert!(!other.verify("a/b.txt", expires_at.timestamp(), signature, now));
    }
}
