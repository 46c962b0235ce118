//! Shared test helpers for in-crate router tests.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::{Authenticator, Identity};
use crate::config::{AuthConfig, Config, NodeConfig, StorageConfig};
use crate::object_store::{LocalStore, UrlSigner};
use crate::storage::Database;
use crate::AppState;

pub const TEST_JWT_SECRET: &str = "test-jwt-secret";
pub const TEST_BASE_URL: &str = "http://localhost:8080";

/// Create a test AppState with a temporary database and local object store.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let data_dir = temp_dir.path().join("data");
    let files_dir = temp_dir.path().join("files");

    let config = Config {
        auth: AuthConfig {
            jwt_secret: TEST_JWT_SECRET.to_string(),
        },
        node: NodeConfig {
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: data_dir.to_string_lossy().to_string(),
            public_base_url: TEST_BASE_URL.to_string(),
        },
        storage: StorageConfig {
            local_storage_path: files_dir.to_string_lossy().to_string(),
            local_signing_secret: "test-signing-secret".to_string(),
            ..StorageConfig::default()
        },
        test_mode: true,
        max_upload_size: 10 * 1024 * 1024, // 10MB for tests
    };

    let db = Database::open(&data_dir).expect("Failed to open test database");
    let signer = UrlSigner::new(
        &config.node.public_base_url,
        config.storage.local_signing_secret.as_bytes(),
    );
    let object_store =
        LocalStore::new(&files_dir, signer.clone()).expect("Failed to create test object store");

    Arc::new(AppState {
        auth: Authenticator::new(&config.auth.jwt_secret),
        config,
        db,
        object_store: Arc::new(object_store),
        url_signer: Some(signer),
    })
}

pub fn identity(user_id: &str, can_upload: bool) -> Identity {
    Identity {
        user_id: user_id.to_string(),
        email: format!("{user_id}@example.com"),
        can_upload,
    }
}

/// `Authorization` header value for `identity`.
pub fn bearer(state: &AppState, identity: &Identity) -> String {
    let token = state
        .auth
        .issue(identity, Duration::from_secs(3600))
        .expect("Failed to issue test token");
    format!("Bearer {token}")
}
