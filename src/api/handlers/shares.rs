use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::api::response::{ApiError, ApiResponse, AppJson, AppQuery};
use crate::auth::AuthUser;
use crate::sharing::{self, ShareDescriptor, ShareKind, SharedAccess, SharedDocumentSummary};
use crate::storage::models::ShareMode;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    pub share_type: ShareMode,
    #[serde(default)]
    pub share_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateShareRequest {
    pub share_type: ShareMode,
    #[serde(default)]
    pub share_code: Option<String>,
    /// Omitted or `null` makes the share permanent
    #[serde(default)]
    pub expire_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AccessShareParams {
    #[serde(default)]
    pub share_code: Option<String>,
}

// ============================================================================
// Owner endpoints
// ============================================================================

pub async fn create_share(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
    AppJson(req): AppJson<ShareRequest>,
) -> Result<Json<ApiResponse<ShareDescriptor>>, ApiError> {
    let descriptor = sharing::share_document(
        &state.db,
        &id,
        req.share_type,
        req.share_code.as_deref(),
        &identity,
    )?;
    Ok(ApiResponse::success(descriptor, "Document shared successfully"))
}

pub async fn update_share(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateShareRequest>,
) -> Result<Json<ApiResponse<ShareDescriptor>>, ApiError> {
    let descriptor = sharing::update_document_share(
        &state.db,
        &id,
        req.share_type,
        req.share_code.as_deref(),
        req.expire_days,
        &identity,
    )?;
    Ok(ApiResponse::success(descriptor, "Share settings updated"))
}

pub async fn cancel_share(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ShareDescriptor>>, ApiError> {
    let descriptor = sharing::cancel_document_share(&state.db, &id, &identity)?;
    Ok(ApiResponse::success(descriptor, "Share cancelled"))
}

pub async fn get_share(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ShareDescriptor>>, ApiError> {
    let descriptor = sharing::document_share_info(&state.db, &id, &identity)?;
    Ok(ApiResponse::success(descriptor, "Share info retrieved"))
}

/// Active shares of the caller's own documents.
pub async fn list_shared(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
) -> Result<Json<ApiResponse<Vec<SharedDocumentSummary>>>, ApiError> {
    let shares = sharing::list_my_shares(&state.db, &identity, Utc::now())?;
    Ok(ApiResponse::success(shares, "Shared documents retrieved"))
}

// ============================================================================
// Anonymous endpoints
// ============================================================================

pub async fn access_shared(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    AppQuery(params): AppQuery<AccessShareParams>,
) -> Result<Json<ApiResponse<SharedAccess>>, ApiError> {
    let access = sharing::access_share(
        &state.db,
        state.object_store.as_ref(),
        &token,
        params.share_code.as_deref(),
        Utc::now(),
    )
    .await?;
    Ok(ApiResponse::success(access, "Access granted"))
}

pub async fn check_shared(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<ApiResponse<ShareKind>>, ApiError> {
    let kind = sharing::check_share_kind(&state.db, &token, Utc::now())?;
    Ok(ApiResponse::success(kind, "Share found"))
}
