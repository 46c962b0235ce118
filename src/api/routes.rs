use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Multipart framing needs headroom beyond the file itself
    let upload_limit = state.config.max_upload_size as usize + 64 * 1024;

    let mut router = Router::new()
        // Documents
        .route(
            "/documents/upload",
            post(handlers::upload_document).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/documents/my-documents", get(handlers::my_documents))
        .route("/documents/preview/:id", get(handlers::preview_document))
        .route("/documents/download/:id", get(handlers::download_document))
        // Share lifecycle (owner)
        .route(
            "/documents/:id/share",
            get(handlers::get_share)
                .post(handlers::create_share)
                .put(handlers::update_share)
                .delete(handlers::cancel_share),
        )
        .route("/documents/shared", get(handlers::list_shared))
        // Anonymous share access
        .route("/documents/shared/:token", get(handlers::access_shared))
        .route("/documents/shared/:token/check", get(handlers::check_shared))
        // Locally signed object URLs
        .route("/_objects/*key", get(handlers::serve_object))
        // Internal
        .route("/_internal/health", get(handlers::health));

    // Test-only routes
    if state.config.test_mode {
        tracing::warn!("Test mode enabled, purge route is available.");
        router = router.route("/admin/purge", axum::routing::delete(handlers::admin_purge));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
