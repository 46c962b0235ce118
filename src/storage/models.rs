use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Visibility policy of a document's share link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareMode {
    #[default]
    None,
    Public,
    WithPassword,
}

impl ShareMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareMode::None => "none",
            ShareMode::Public => "public",
            ShareMode::WithPassword => "with_password",
        }
    }
}

/// A document record stored in redb
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    // System fields
    pub id: String,
    pub filename: String,
    /// SHA-256 of the uploaded bytes (hex)
    pub content_hash: String,
    pub byte_size: u64,
    pub mime_type: String,
    /// Object storage key. Never changes once the record exists.
    pub storage_path: String,
    pub owner_id: String,
    pub is_public: bool,
    pub download_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // Share state
    #[serde(default)]
    pub is_shared: bool,
    #[serde(default)]
    pub share_token: Option<String>,
    #[serde(default)]
    pub share_mode: ShareMode,
    #[serde(default)]
    pub share_code: Option<String>,
    /// `None` while shared means the link never expires
    #[serde(default)]
    pub share_expires_at: Option<DateTime<Utc>>,
}

impl DocumentRecord {
    /// Whether the share link currently grants anonymous access.
    pub fn share_is_active(&self, now: DateTime<Utc>) -> bool {
        self.is_shared && self.share_expires_at.map_or(true, |expires| expires > now)
    }

    /// Reset every share field to the unshared state.
    pub fn clear_share(&mut self) {
        self.is_shared = false;
        self.share_token = None;
        self.share_mode = ShareMode::None;
        self.share_code = None;
        self.share_expires_at = None;
    }
}
