//! Bearer-token authentication.
//!
//! Tokens are HS256 JWTs issued by the account service; this crate only
//! verifies them and turns the claims into an [`Identity`].

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::response::ApiError;
use crate::AppState;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authorization")]
    MissingToken,
    #[error("Invalid authorization header format")]
    MalformedHeader,
    #[error("Invalid or expired token")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
}

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: String,
    pub email: String,
    /// Administrators may upload documents.
    #[serde(default)]
    pub is_admin: bool,
    /// Expiration timestamp.
    pub exp: u64,
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
    pub can_upload: bool,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            can_upload: claims.is_admin,
        }
    }
}

/// Verifies (and, for tooling, issues) HS256 bearer tokens.
#[derive(Clone)]
pub struct Authenticator {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    validation: Validation,
}

impl Authenticator {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Resolve the caller from an `Authorization` header value.
    pub fn resolve(&self, authorization: Option<&str>) -> Result<Identity, AuthError> {
        let header = authorization.ok_or(AuthError::MissingToken)?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::MalformedHeader)?;

        let token_data = decode::<Claims>(token.trim(), &self.decoding_key, &self.validation)
            .map_err(AuthError::InvalidToken)?;
        Ok(token_data.claims.into())
    }

    /// Mint a token for `identity` valid for `ttl`.
    pub fn issue(
        &self,
        identity: &Identity,
        ttl: std::time::Duration,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let exp = chrono::Utc::now().timestamp().max(0) as u64 + ttl.as_secs();
        let claims = Claims {
            sub: identity.user_id.clone(),
            email: identity.email.clone(),
            is_admin: identity.can_upload,
            exp,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
    }
}

/// Extractor for authenticated users.
///
/// Rejects with 401 when the bearer token is missing, malformed or expired.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, ApiError> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        state.auth.resolve(header).map(AuthUser).map_err(|e| {
            tracing::debug!(error = %e, "Authentication failed");
            ApiError::unauthorized(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn identity() -> Identity {
        Identity {
            user_id: "user-1".to_string(),
            email: "alice@example.com".to_string(),
            can_upload: true,
        }
    }

    #[test]
    fn test_issue_and_resolve() {
        let auth = Authenticator::new("secret");
        let token = auth.issue(&identity(), Duration::from_secs(600)).unwrap();

        let resolved = auth.resolve(Some(&format!("Bearer {token}"))).unwrap();
        assert_eq!(resolved, identity());
    }

    #[test]
    fn test_missing_and_malformed_headers() {
        let auth = Authenticator::new("secret");
        assert!(matches!(auth.resolve(None), Err(AuthError::MissingToken)));
        assert!(matches!(
            auth.resolve(Some("Basic dXNlcjpwYXNz")),
            Err(AuthError::MalformedHeader)
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = Authenticator::new("secret")
            .issue(&identity(), Duration::from_secs(600))
            .unwrap();
        let other = Authenticator::new("another-secret");
        assert!(matches!(
            other.resolve(Some(&format!("Bearer {token}"))),
            Err(AuthError::InvalidToken(_))
        ));
    }
}
