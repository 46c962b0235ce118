use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use anyhow::Context;
use doc_share::{
    api,
    auth::Authenticator,
    config::{Config, StorageBackend},
    object_store as obj,
    storage::Database,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "doc-share starting");

    // Load configuration
    let config = Config::load()?;
    info!(storage = ?config.storage, "Loaded configuration");

    // Initialize database
    let db = Database::open(&config.node.data_dir)?;
    info!("Database opened at: {}", config.node.data_dir);

    // Initialize object store backend
    let mut url_signer = None;
    let object_store: Arc<dyn obj::ObjectStore> = match config.storage.backend {
        StorageBackend::Local => {
            let signer = obj::UrlSigner::new(
                &config.node.public_base_url,
                config.storage.local_signing_secret.as_bytes(),
            );
            let store = obj::LocalStore::new(&config.storage.local_storage_path, signer.clone())?;
            url_signer = Some(signer);
            info!(
                "Using local storage backend at: {}",
                config.storage.local_storage_path
            );
            Arc::new(store)
        }
        StorageBackend::Gcs => {
            let bucket = config
                .storage
                .gcs_bucket
                .as_deref()
                .context("GCS_BUCKET is required for the gcs backend")?;
            let store =
                obj::GcsStore::new(bucket, config.storage.gcs_credentials_file.as_deref()).await?;
            info!("Using GCS storage backend, bucket: {}", bucket);
            Arc::new(store)
        }
        StorageBackend::S3 => {
            let s3 = &config.storage.s3;
            let (Some(endpoint), Some(bucket), Some(access_key), Some(secret_key)) = (
                s3.endpoint.as_deref(),
                s3.bucket.as_deref(),
                s3.access_key.as_deref(),
                s3.secret_key.as_deref(),
            ) else {
                anyhow::bail!("S3 backend requires endpoint, bucket and credentials");
            };
            let credentials = obj::S3Credentials {
                access_key: access_key.to_string(),
                secret_key: secret_key.to_string(),
                region: s3.region.clone(),
            };
            let store =
                obj::S3Store::new(endpoint, s3.external_url.as_deref(), bucket, credentials)
                    .await?;
            info!(endpoint, bucket, "Using S3 storage backend");
            Arc::new(store)
        }
    };

    // Create shared state
    let state = Arc::new(AppState {
        auth: Authenticator::new(&config.auth.jwt_secret),
        config: config.clone(),
        db,
        object_store,
        url_signer,
    });

    // Build and start the HTTP server
    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.node.bind_address).await?;
    info!("Listening on: {}", config.node.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
