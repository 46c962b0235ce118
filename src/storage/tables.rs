use redb::TableDefinition;

/// Document records: id -> DocumentRecord (msgpack)
pub const DOCUMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");

/// Storage path index: storage path -> document id (uniqueness guard)
pub const STORAGE_PATHS: TableDefinition<&str, &str> = TableDefinition::new("storage_paths");

/// Owner index: owner id -> msgpack Vec of document ids
pub const OWNER_DOCUMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("owner_documents");

/// Share token index: share token -> document id (for anonymous lookups)
pub const SHARE_TOKENS: TableDefinition<&str, &str> = TableDefinition::new("share_tokens");
