use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::response::{ApiError, AppQuery};
use crate::object_store::ObjectStoreError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SignedUrlParams {
    pub expires: i64,
    pub signature: String,
}

/// Serve an object through a locally signed URL.
/// Route: GET /_objects/*key
pub async fn serve_object(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    AppQuery(params): AppQuery<SignedUrlParams>,
) -> Result<Response, ApiError> {
    let signer = state
        .url_signer
        .as_ref()
        .ok_or_else(|| ApiError::not_found("Not found"))?;

    if !signer.verify(&key, params.expires, &params.signature, chrono::Utc::now()) {
        return Err(ApiError::forbidden("Invalid or expired signature"));
    }

    let stream = state
        .object_store
        .open_read(&key, 0)
        .await
        .map_err(|e| match e {
            ObjectStoreError::NotFound(_) | ObjectStoreError::InvalidKey(_) => {
                ApiError::not_found("Object not found")
            }
            _ => ApiError::internal(format!("Failed to retrieve object: {e}")),
        })?;

    let mut response = (StatusCode::OK, Body::from_stream(stream)).into_response();
    let headers = response.headers_mut();

    let mime_type = match state.db.get_document_by_storage_path(&key) {
        Ok(Some(document)) => document.mime_type,
        Ok(None) => mime_guess::from_path(&key).first_or_octet_stream().to_string(),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Failed to look up stored content type");
            mime_guess::from_path(&key).first_or_octet_stream().to_string()
        }
    };
    headers.insert(
        header::CONTENT_TYPE,
        mime_type
            .parse()
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );

    // Objects never change under a key
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("private, max-age=600"),
    );

    Ok(response)
}
