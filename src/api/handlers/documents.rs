use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio_util::io::{ReaderStream, StreamReader};

use crate::api::range::{parse_range, ByteRange};
use crate::api::response::{ApiError, ApiResponse};
use crate::auth::AuthUser;
use crate::error::DocumentError;
use crate::object_store::{content_hash, document_key, ObjectStoreError};
use crate::sharing::{authorize, authorize_upload, Action, PREVIEW_URL_LIFETIME_SECS};
use crate::storage::models::{DocumentRecord, ShareMode};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub id: String,
    pub filename: String,
    pub file_size: u64,
    pub mime_type: String,
    pub content_hash: String,
    pub owner_id: String,
    pub is_public: bool,
    pub download_count: u64,
    pub is_shared: bool,
    pub share_type: ShareMode,
    pub share_token: Option<String>,
    pub share_expires_at: Option<DateTime<Utc>>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub url: String,
    pub filename: String,
    pub mime_type: String,
    pub file_size: u64,
    pub expires_in: u64,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<DocumentResponse>>, ApiError> {
    authorize_upload(&identity)?;

    let mut file_data: Option<Bytes> = None;
    let mut file_name: Option<String> = None;
    let mut file_content_type: Option<String> = None;
    let mut is_public = false;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                file_content_type = field.content_type().map(|s| s.to_string());

                let data = field.bytes().await.map_err(multipart_error)?;
                if data.len() as u64 > state.config.max_upload_size {
                    return Err(ApiError::payload_too_large(format!(
                        "File exceeds maximum upload size of {} bytes",
                        state.config.max_upload_size
                    )));
                }
                file_data = Some(data);
            }
            "is_public" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid is_public: {e}")))?;
                is_public = parse_flag(&text)?;
            }
            _ => {}
        }
    }

    let file_data = file_data.ok_or_else(|| ApiError::bad_request("file field is required"))?;
    let filename = file_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::bad_request("filename is required"))?;

    let mime_type = file_content_type
        .filter(|ct| ct != "application/octet-stream")
        .or_else(|| mime_guess::from_path(&filename).first().map(|m| m.to_string()))
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now();
    let storage_path = document_key(now, &identity.email, &id, &filename);

    let record = DocumentRecord {
        id: id.clone(),
        filename,
        content_hash: content_hash(&file_data),
        byte_size: file_data.len() as u64,
        mime_type,
        storage_path: storage_path.clone(),
        owner_id: identity.user_id.clone(),
        is_public,
        download_count: 0,
        created_at: now,
        updated_at: now,
        is_shared: false,
        share_token: None,
        share_mode: ShareMode::None,
        share_code: None,
        share_expires_at: None,
    };

    // Bytes first; the record only exists once the object does
    state
        .object_store
        .put(&storage_path, file_data, &record.mime_type)
        .await
        .map_err(|e| {
            tracing::error!(document_id = %id, error = %e, "Failed to store document");
            DocumentError::from(e)
        })?;

    if let Err(e) = state.db.create_document(&record) {
        if let Err(cleanup) = state.object_store.delete(&storage_path).await {
            tracing::warn!(
                document_id = %id,
                error = %cleanup,
                "Failed to remove orphaned object"
            );
        }
        return Err(DocumentError::from(e).into());
    }

    tracing::info!(
        document_id = %id,
        storage_path = %storage_path,
        size = record.byte_size,
        "Uploaded document"
    );

    Ok(ApiResponse::success(
        document_to_response(&record),
        "File uploaded successfully",
    ))
}

pub async fn preview_document(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<PreviewResponse>>, ApiError> {
    let document = load_document(&state, &id)?;
    authorize(Action::Preview, &document, &identity)?;

    let url = state
        .object_store
        .presigned_url(
            &document.storage_path,
            std::time::Duration::from_secs(PREVIEW_URL_LIFETIME_SECS),
        )
        .await
        .map_err(DocumentError::from)?;

    Ok(ApiResponse::success(
        PreviewResponse {
            url,
            filename: document.filename,
            mime_type: document.mime_type,
            file_size: document.byte_size,
            expires_in: PREVIEW_URL_LIFETIME_SECS,
        },
        "Preview URL generated",
    ))
}

/// Stream a document, honouring a single `Range` header.
pub async fn download_document(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let document = load_document(&state, &id)?;
    authorize(Action::Download, &document, &identity)?;

    let range = match headers.get(header::RANGE) {
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| ApiError::bad_request("Malformed Range header"))?;
            Some(parse_range(value, document.byte_size)?)
        }
        None => None,
    };
    let (offset, length) = match range {
        Some(range) => (range.start, range.len()),
        None => (0, document.byte_size),
    };

    let stream = state
        .object_store
        .open_read(&document.storage_path, offset)
        .await
        .map_err(|e| match e {
            ObjectStoreError::NotFound(_) => {
                tracing::error!(document_id = %id, "Document content missing from storage");
                ApiError::not_found("Document content not found")
            }
            other => DocumentError::from(other).into(),
        })?;

    state
        .db
        .increment_download_count(&document.id)
        .map_err(DocumentError::from)?;

    let reader = StreamReader::new(stream).take(length);
    let body = Body::from_stream(ReaderStream::new(reader));

    tracing::debug!(document_id = %id, offset, length, "Serving document");
    Ok(content_response(&document, range, length, body))
}

pub async fn my_documents(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
) -> Result<Json<ApiResponse<Vec<DocumentResponse>>>, ApiError> {
    let documents = state
        .db
        .list_documents_by_owner(&identity.user_id)
        .map_err(DocumentError::from)?;

    Ok(ApiResponse::success(
        documents.iter().map(document_to_response).collect(),
        "Documents retrieved",
    ))
}

// ============================================================================
// Helpers
// ============================================================================

fn load_document(state: &AppState, id: &str) -> Result<DocumentRecord, DocumentError> {
    state
        .db
        .get_document(id)?
        .ok_or_else(DocumentError::document_not_found)
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large(e.body_text())
    } else {
        ApiError::bad_request(format!("Invalid multipart data: {}", e.body_text()))
    }
}

fn parse_flag(value: &str) -> Result<bool, ApiError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "0" => Ok(false),
        "true" | "1" => Ok(true),
        other => Err(ApiError::bad_request(format!(
            "is_public must be true or false, got '{other}'"
        ))),
    }
}

fn content_response(
    document: &DocumentRecord,
    range: Option<ByteRange>,
    length: u64,
    body: Body,
) -> Response {
    let status = if range.is_some() {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };
    let mut response = (status, body).into_response();
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        document
            .mime_type
            .parse()
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    if let Some(range) = range {
        if let Ok(value) = range.content_range(document.byte_size).parse() {
            headers.insert(header::CONTENT_RANGE, value);
        }
    }

    if let Ok(value) = content_disposition(&document.filename).parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    response
}

/// `attachment` disposition with an ASCII fallback and the UTF-8 name.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

fn document_to_response(document: &DocumentRecord) -> DocumentResponse {
    DocumentResponse {
        id: document.id.clone(),
        filename: document.filename.clone(),
        file_size: document.byte_size,
        mime_type: document.mime_type.clone(),
        content_hash: document.content_hash.clone(),
        owner_id: document.owner_id.clone(),
        is_public: document.is_public,
        download_count: document.download_count,
        is_shared: document.is_shared,
        share_type: document.share_mode,
        share_token: document.share_token.clone(),
        share_expires_at: document.share_expires_at,
        created_at: document.created_at.to_rfc3339(),
        updated_at: document.updated_at.to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true").unwrap());
        assert!(parse_flag(" 1 ").unwrap());
        assert!(!parse_flag("False").unwrap());
        assert!(!parse_flag("").unwrap());
        assert!(parse_flag("yes").is_err());
    }

    #[test]
    fn test_content_disposition_escapes_filename() {
        assert_eq!(
            content_disposition("report \"final\".pdf"),
            "attachment; filename=\"report _final_.pdf\"; filename*=UTF-8''report%20%22final%22.pdf"
        );
        assert!(content_disposition("résumé.pdf").starts_with("attachment; filename=\"r_sum_.pdf\""));
    }
}
