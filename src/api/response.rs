use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::StatusCode;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::DocumentError;

// ============================================================================
// Success envelope
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub message: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, message: impl Into<String>) -> Json<ApiResponse<T>> {
        Json(ApiResponse {
            data,
            message: message.into(),
        })
    }
}

// ============================================================================
// Error envelope
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status_code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Error returned by every handler and extractor.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorBody {
            status_code: self.status.as_u16(),
            message: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<DocumentError> for ApiError {
    fn from(e: DocumentError) -> Self {
        match e {
            DocumentError::NotFound(_) | DocumentError::NotFoundOrExpired => {
                ApiError::not_found(e.to_string())
            }
            DocumentError::Forbidden(_) | DocumentError::CodeRequired | DocumentError::InvalidCode => {
                ApiError::forbidden(e.to_string())
            }
            DocumentError::InvalidArgument(_) | DocumentError::DuplicateIdentifier(_) => {
                ApiError::bad_request(e.to_string())
            }
            DocumentError::Storage(ref inner) => {
                tracing::error!(error = %inner, "Object storage failure");
                ApiError::internal("Storage operation failed")
                    .with_details(serde_json::json!({ "error": inner.to_string() }))
            }
            DocumentError::Database(ref inner) => {
                tracing::error!(error = %inner, "Database failure");
                ApiError::internal("Database operation failed")
                    .with_details(serde_json::json!({ "error": inner.to_string() }))
            }
        }
    }
}

// ============================================================================
// Custom extractors (reject with the error envelope)
// ============================================================================

/// Drop-in replacement for `axum::Json` that rejects with [`ApiError`].
pub struct AppJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, ApiError> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => {
                let message = match rejection {
                    JsonRejection::JsonDataError(err) => {
                        format!("Invalid request body: {}", err.body_text())
                    }
                    JsonRejection::JsonSyntaxError(_) => "Malformed JSON in request body".into(),
                    JsonRejection::MissingJsonContentType(_) => {
                        "Missing Content-Type: application/json header".into()
                    }
                    _ => "Failed to read request body".into(),
                };
                Err(ApiError::bad_request(message))
            }
        }
    }
}

/// Drop-in replacement for `axum::extract::Query` that rejects with [`ApiError`].
pub struct AppQuery<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequestParts<S> for AppQuery<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, ApiError> {
        let query = parts.uri.query().unwrap_or_default();
        serde_qs::from_str(query)
            .map(AppQuery)
            .map_err(|e| ApiError::bad_request(friendly_query_error(&e.to_string())))
    }
}

/// Translate serde/serde_qs error messages into human-friendly descriptions.
fn friendly_query_error(raw: &str) -> String {
    let cleaned = raw
        .replace("u32", "non-negative integer")
        .replace("u64", "non-negative integer")
        .replace("i32", "integer")
        .replace("i64", "integer");

    format!("Invalid query parameter: {cleaned}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::ObjectStoreError;

    #[test]
    fn test_document_error_status_mapping() {
        let cases = [
            (DocumentError::document_not_found(), StatusCode::NOT_FOUND),
            (DocumentError::NotFoundOrExpired, StatusCode::NOT_FOUND),
            (
                DocumentError::Forbidden("Not authorized".into()),
                StatusCode::FORBIDDEN,
            ),
            (DocumentError::CodeRequired, StatusCode::FORBIDDEN),
            (DocumentError::InvalidCode, StatusCode::FORBIDDEN),
            (
                DocumentError::InvalidArgument("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                DocumentError::DuplicateIdentifier("x".into()),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (error, status) in cases {
            let api_error = ApiError::from(error);
            assert_eq!(api_error.status, status);
            assert!(api_error.details.is_none());
        }
    }

    #[test]
    fn test_storage_errors_carry_details() {
        let api_error = ApiError::from(DocumentError::Storage(ObjectStoreError::Backend(
            "bucket unreachable".into(),
        )));
        assert_eq!(api_error.status, StatusCode::INTERNAL_SERVER_ERROR);
        let details = api_error.details.unwrap();
        assert!(details["error"]
            .as_str()
            .unwrap()
            .contains("bucket unreachable"));
    }

    #[test]
    fn test_friendly_query_error() {
        assert_eq!(
            friendly_query_error("invalid digit found in string for u32"),
            "Invalid query parameter: invalid digit found in string for non-negative integer"
        );
    }
}
