use chrono::{Duration, Utc};
use doc_share::storage::models::{DocumentRecord, ShareMode};
use doc_share::storage::{Database, DatabaseError};

fn test_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    (dir, db)
}

fn sample_document(id: &str, owner: &str) -> DocumentRecord {
    let now = Utc::now();
    DocumentRecord {
        id: id.to_string(),
        filename: format!("{id}.pdf"),
        content_hash: "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
            .to_string(),
        byte_size: 1024,
        mime_type: "application/pdf".to_string(),
        storage_path: format!("2024/01/01/abcd0123/{id}.pdf"),
        owner_id: owner.to_string(),
        is_public: false,
        download_count: 0,
        created_at: now,
        updated_at: now,
        is_shared: false,
        share_token: None,
        share_mode: ShareMode::None,
        share_code: None,
        share_expires_at: None,
    }
}

fn shared(mut document: DocumentRecord, token: &str, expires_in: Option<Duration>) -> DocumentRecord {
    document.is_shared = true;
    document.share_token = Some(token.to_string());
    document.share_mode = ShareMode::Public;
    document.share_expires_at = expires_in.map(|ttl| Utc::now() + ttl);
    document
}

#[test]
fn test_create_and_get_document() {
    let (_dir, db) = test_db();
    let document = sample_document("doc-1", "alice");

    db.create_document(&document).unwrap();

    let retrieved = db.get_document("doc-1").unwrap().expect("document should exist");
    assert_eq!(retrieved, document);
}

#[test]
fn test_get_document_not_found() {
    let (_dir, db) = test_db();
    assert!(db.get_document("nonexistent").unwrap().is_none());
}

#[test]
fn test_create_rejects_duplicate_id() {
    let (_dir, db) = test_db();
    db.create_document(&sample_document("doc-1", "alice")).unwrap();

    let mut duplicate = sample_document("doc-1", "bob");
    duplicate.storage_path = "2024/01/01/ffff0000/other.pdf".to_string();
    assert!(matches!(
        db.create_document(&duplicate),
        Err(DatabaseError::DuplicateIdentifier(_))
    ));
    assert_eq!(db.get_document("doc-1").unwrap().unwrap().owner_id, "alice");
}

#[test]
fn test_create_rejects_duplicate_storage_path() {
    let (_dir, db) = test_db();
    let first = sample_document("doc-1", "alice");
    db.create_document(&first).unwrap();

    let mut second = sample_document("doc-2", "alice");
    second.storage_path = first.storage_path.clone();
    assert!(matches!(
        db.create_document(&second),
        Err(DatabaseError::DuplicateIdentifier(_))
    ));
    assert!(db.get_document("doc-2").unwrap().is_none());
}

#[test]
fn test_list_documents_by_owner_newest_first() {
    let (_dir, db) = test_db();
    let base = Utc::now();
    for (i, id) in ["old", "middle", "new"].iter().enumerate() {
        let mut document = sample_document(id, "alice");
        document.created_at = base + Duration::seconds(i as i64);
        db.create_document(&document).unwrap();
    }
    db.create_document(&sample_document("other", "bob")).unwrap();

    let ids: Vec<String> = db
        .list_documents_by_owner("alice")
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(ids, vec!["new", "middle", "old"]);
    assert!(db.list_documents_by_owner("nobody").unwrap().is_empty());
}

#[test]
fn test_save_document_is_idempotent_upsert() {
    let (_dir, db) = test_db();
    let mut document = sample_document("doc-1", "alice");
    db.create_document(&document).unwrap();

    document.is_public = true;
    db.save_document(&document).unwrap();
    db.save_document(&document).unwrap();

    assert!(db.get_document("doc-1").unwrap().unwrap().is_public);
    assert_eq!(db.list_documents_by_owner("alice").unwrap().len(), 1);
}

#[test]
fn test_storage_path_is_immutable() {
    let (_dir, db) = test_db();
    let mut document = sample_document("doc-1", "alice");
    db.create_document(&document).unwrap();

    document.storage_path = "2024/02/02/abcd0123/moved.pdf".to_string();
    assert!(matches!(
        db.save_document(&document),
        Err(DatabaseError::ImmutableStoragePath(_))
    ));

    let result: Result<Option<()>, DatabaseError> = db.modify_document("doc-1", |d| {
        d.storage_path = "elsewhere.pdf".to_string();
        Ok(())
    });
    assert!(matches!(result, Err(DatabaseError::ImmutableStoragePath(_))));
    assert_eq!(
        db.get_document("doc-1").unwrap().unwrap().storage_path,
        "2024/01/01/abcd0123/doc-1.pdf"
    );
}

#[test]
fn test_owner_change_moves_document_between_listings() {
    let (_dir, db) = test_db();
    let mut document = shared(sample_document("doc-1", "alice"), "t-1", None);
    document.share_mode = ShareMode::WithPassword;
    document.share_code = Some("1234".to_string());
    db.create_document(&document).unwrap();
    db.create_document(&sample_document("doc-2", "alice")).unwrap();

    document.owner_id = "bob".to_string();
    db.save_document(&document).unwrap();

    let alice: Vec<String> = db
        .list_documents_by_owner("alice")
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(alice, vec!["doc-2"]);
    assert!(db.list_active_shares("alice", Utc::now()).unwrap().is_empty());

    let bob = db.list_documents_by_owner("bob").unwrap();
    assert_eq!(bob.len(), 1);
    assert_eq!(bob[0].share_code.as_deref(), Some("1234"));

    let result: Result<Option<()>, DatabaseError> = db.modify_document("doc-1", |d| {
        d.owner_id = "carol".to_string();
        Ok(())
    });
    result.unwrap();
    assert!(db.list_documents_by_owner("bob").unwrap().is_empty());
    assert_eq!(db.list_documents_by_owner("carol").unwrap().len(), 1);
}

#[test]
fn test_modify_document_commits_and_bumps_updated_at() {
    let (_dir, db) = test_db();
    let mut document = sample_document("doc-1", "alice");
    document.updated_at = Utc::now() - Duration::hours(1);
    db.create_document(&document).unwrap();

    let result: Result<Option<String>, DatabaseError> = db.modify_document("doc-1", |d| {
        d.filename = "renamed.pdf".to_string();
        Ok(d.filename.clone())
    });
    assert_eq!(result.unwrap(), Some("renamed.pdf".to_string()));

    let stored = db.get_document("doc-1").unwrap().unwrap();
    assert_eq!(stored.filename, "renamed.pdf");
    assert!(stored.updated_at > document.updated_at);
}

#[test]
fn test_modify_document_rolls_back_on_error() {
    let (_dir, db) = test_db();
    db.create_document(&sample_document("doc-1", "alice")).unwrap();

    let result: Result<Option<()>, DatabaseError> = db.modify_document("doc-1", |d| {
        d.filename = "half-done.pdf".to_string();
        d.share_token = Some("leaked-token".to_string());
        Err(DatabaseError::DuplicateIdentifier("forced".to_string()))
    });
    assert!(result.is_err());

    let stored = db.get_document("doc-1").unwrap().unwrap();
    assert_eq!(stored.filename, "doc-1.pdf");
    assert!(db.get_document_by_share_token("leaked-token").unwrap().is_none());
}

#[test]
fn test_modify_missing_document_returns_none() {
    let (_dir, db) = test_db();
    let result: Result<Option<()>, DatabaseError> = db.modify_document("missing", |_| Ok(()));
    assert_eq!(result.unwrap(), None);
}

#[test]
fn test_share_token_index_follows_token_changes() {
    let (_dir, db) = test_db();
    let document = shared(sample_document("doc-1", "alice"), "token-a", None);
    db.create_document(&document).unwrap();
    assert_eq!(
        db.get_document_by_share_token("token-a").unwrap().unwrap().id,
        "doc-1"
    );

    let rotated = shared(document.clone(), "token-b", None);
    db.save_document(&rotated).unwrap();
    assert!(db.get_document_by_share_token("token-a").unwrap().is_none());
    assert_eq!(
        db.get_document_by_share_token("token-b").unwrap().unwrap().id,
        "doc-1"
    );

    let result: Result<Option<()>, DatabaseError> = db.modify_document("doc-1", |d| {
        d.clear_share();
        Ok(())
    });
    result.unwrap();
    assert!(db.get_document_by_share_token("token-b").unwrap().is_none());
}

#[test]
fn test_get_document_by_storage_path() {
    let (_dir, db) = test_db();
    let document = sample_document("doc-1", "alice");
    db.create_document(&document).unwrap();

    let found = db
        .get_document_by_storage_path(&document.storage_path)
        .unwrap()
        .expect("document should be indexed by path");
    assert_eq!(found.id, "doc-1");
    assert_eq!(found.mime_type, "application/pdf");
    assert!(db
        .get_document_by_storage_path("2024/01/01/abcd0123/unknown.pdf")
        .unwrap()
        .is_none());
}

#[test]
fn test_increment_download_count() {
    let (_dir, db) = test_db();
    db.create_document(&sample_document("doc-1", "alice")).unwrap();

    assert_eq!(db.increment_download_count("doc-1").unwrap(), Some(1));
    assert_eq!(db.increment_download_count("doc-1").unwrap(), Some(2));
    assert_eq!(db.get_document("doc-1").unwrap().unwrap().download_count, 2);
    assert_eq!(db.increment_download_count("missing").unwrap(), None);
}

#[test]
fn test_concurrent_increments_are_not_lost() {
    let (_dir, db) = test_db();
    db.create_document(&sample_document("doc-1", "alice")).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let db = db.clone();
            std::thread::spawn(move || {
                for _ in 0..25 {
                    db.increment_download_count("doc-1").unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(db.get_document("doc-1").unwrap().unwrap().download_count, 200);
}

#[test]
fn test_list_active_shares() {
    let (_dir, db) = test_db();
    let now = Utc::now();

    db.create_document(&shared(
        sample_document("active", "alice"),
        "t-active",
        Some(Duration::days(1)),
    ))
    .unwrap();
    db.create_document(&shared(sample_document("permanent", "alice"), "t-permanent", None))
        .unwrap();
    db.create_document(&shared(
        sample_document("expired", "alice"),
        "t-expired",
        Some(Duration::seconds(-5)),
    ))
    .unwrap();
    db.create_document(&sample_document("unshared", "alice")).unwrap();
    db.create_document(&shared(sample_document("bobs", "bob"), "t-bob", None))
        .unwrap();

    let mut ids: Vec<String> = db
        .list_active_shares("alice", now)
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["active", "permanent"]);
}

#[test]
fn test_share_is_active() {
    let now = Utc::now();
    let document = sample_document("doc-1", "alice");
    assert!(!document.share_is_active(now));

    let permanent = shared(document.clone(), "t", None);
    assert!(permanent.share_is_active(now));

    let mut expiring = shared(document, "t", None);
    expiring.share_expires_at = Some(now);
    assert!(!expiring.share_is_active(now));
    assert!(expiring.share_is_active(now - Duration::seconds(1)));
}

#[test]
fn test_purge_all() {
    let (_dir, db) = test_db();
    db.create_document(&shared(sample_document("doc-1", "alice"), "t-1", None))
        .unwrap();
    db.create_document(&sample_document("doc-2", "alice")).unwrap();

    let stats = db.purge_all().unwrap();
    assert_eq!(stats.documents, 2);

    assert!(db.get_document("doc-1").unwrap().is_none());
    assert!(db.list_documents_by_owner("alice").unwrap().is_empty());
    assert!(db.get_document_by_share_token("t-1").unwrap().is_none());

    // Storage paths are free again after a purge
    db.create_document(&sample_document("doc-1", "alice")).unwrap();
}

#[test]
fn test_records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = Database::open(dir.path().join("data")).unwrap();
        db.create_document(&sample_document("doc-1", "alice")).unwrap();
    }
    let db = Database::open(dir.path().join("data")).unwrap();
    assert!(db.get_document("doc-1").unwrap().is_some());
}
