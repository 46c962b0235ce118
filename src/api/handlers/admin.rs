use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::{ApiError, ApiResponse};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub storage_backend: String,
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub documents_deleted: u64,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthResponse>> {
    ApiResponse::success(
        HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            storage_backend: state.config.storage.backend.as_str().to_string(),
        },
        "Service healthy",
    )
}

/// Drop every document record. Stored objects are left in place.
pub async fn admin_purge(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<PurgeResponse>>, ApiError> {
    let stats = state
        .db
        .purge_all()
        .map_err(|e| ApiError::internal(e.to_string()))?;

    tracing::warn!(documents = stats.documents, "Purged all data");

    Ok(ApiResponse::success(
        PurgeResponse {
            documents_deleted: stats.documents,
        },
        "Purged all data",
    ))
}
