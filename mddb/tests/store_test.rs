//! End-to-end store behaviour: create/get round trips, file format,
//! update/delete semantics, prefix and paged lookups, closed-store
//! sentinels.

mod common;

use common::{open_store, put_note, token, wal_size, Note};
use mddb::error_code;
use mddb::{FieldValue, FrontmatterMap, MddbErrorCode, StoreError};
use tempfile::TempDir;

#[test]
fn create_then_get_round_trips() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    put_note(&store, "01HZA", "Buy milk", "");

    // The file is authoritative and bit-exact.
    let content = std::fs::read_to_string(dir.path().join("01HZA.md")).unwrap();
    let fp = store.schema_fingerprint();
    assert_eq!(
        content,
        format!("---\nid: 01HZA\nschema_version: {fp}\ntitle: Buy milk\n---\n")
    );

    // Quiescent stores keep a zero-size WAL.
    assert_eq!(wal_size(&dir), 0);

    let note = store.get(&token(), "01HZA").unwrap();
    assert_eq!(note.title, "Buy milk");
    assert_eq!(note.body, "");
    assert!(note.frontmatter.is_empty());
    assert!(note.size_bytes > 0);
    assert!(note.mtime_ns > 0);
}

#[test]
fn user_frontmatter_and_body_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let mut fm = FrontmatterMap::new();
    fm.insert("priority", 3i64);
    fm.insert("tags", FieldValue::List(vec!["a".into(), "b".into()]));
    fm.insert("done", false);
    let t = token();
    let mut txn = store.begin(&t).unwrap();
    txn.create(&Note::new("n1", "A note", "line one\nline two\n").with_frontmatter(fm.clone()))
        .unwrap();
    txn.commit(&t).unwrap();

    let note = store.get(&t, "n1").unwrap();
    assert_eq!(note.body, "line one\nline two\n");
    assert_eq!(note.frontmatter.get("priority"), fm.get("priority"));
    assert_eq!(note.frontmatter.get("tags"), fm.get("tags"));
    assert_eq!(note.frontmatter.get("done"), fm.get("done"));
}

#[test]
fn body_gets_exactly_one_trailing_newline() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    put_note(&store, "n1", "T", "no newline");
    let content = std::fs::read_to_string(dir.path().join("n1.md")).unwrap();
    assert!(content.ends_with("---\nno newline\n"));
}

#[test]
fn create_duplicate_fails_update_requires_existing() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    put_note(&store, "n1", "T", "");

    let t = token();
    let mut txn = store.begin(&t).unwrap();
    let err = txn.create(&Note::new("n1", "T", "")).unwrap_err();
    assert_eq!(err.error_code(), error_code::ALREADY_EXISTS);

    let err = txn.update(&Note::new("ghost", "T", "")).unwrap_err();
    assert_eq!(err.error_code(), error_code::NOT_FOUND);
    txn.rollback();
}

#[test]
fn update_replaces_content() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    put_note(&store, "n1", "Old title", "old");

    let t = token();
    let mut txn = store.begin(&t).unwrap();
    txn.update(&Note::new("n1", "New title", "new body"))
        .unwrap();
    txn.commit(&t).unwrap();

    let note = store.get(&t, "n1").unwrap();
    assert_eq!(note.title, "New title");
    assert_eq!(note.body, "new body\n");
}

#[test]
fn delete_removes_file_and_row() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    put_note(&store, "n1", "T", "");

    let t = token();
    let mut txn = store.begin(&t).unwrap();
    txn.delete("n1").unwrap();
    txn.commit(&t).unwrap();

    assert!(!dir.path().join("n1.md").exists());
    let err = store.get(&t, "n1").unwrap_err();
    assert_eq!(err.error_code(), error_code::NOT_FOUND);
}

#[test]
fn delete_of_unknown_id_fails() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let t = token();
    let mut txn = store.begin(&t).unwrap();
    let err = txn.delete("nope").unwrap_err();
    assert_eq!(err.error_code(), error_code::NOT_FOUND);
    txn.rollback();
}

#[test]
fn last_wins_within_a_transaction() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let t = token();
    let mut txn = store.begin(&t).unwrap();
    txn.create(&Note::new("n1", "First", "")).unwrap();
    txn.update(&Note::new("n1", "Second", "")).unwrap();
    assert_eq!(txn.len(), 1);
    txn.commit(&t).unwrap();

    assert_eq!(store.get(&t, "n1").unwrap().title, "Second");
}

#[test]
fn delete_after_create_collapses_to_nothing() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let t = token();
    let mut txn = store.begin(&t).unwrap();
    txn.create(&Note::new("n1", "T", "")).unwrap();
    txn.delete("n1").unwrap();
    assert!(txn.is_empty());
    txn.commit(&t).unwrap();

    assert!(!dir.path().join("n1.md").exists());
    assert!(store.get(&t, "n1").unwrap_err().is_not_found());
}

#[test]
fn rollback_discards_everything() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let t = token();
    let mut txn = store.begin(&t).unwrap();
    txn.create(&Note::new("n1", "T", "")).unwrap();
    txn.rollback();

    assert!(store.get(&t, "n1").unwrap_err().is_not_found());
    assert!(!dir.path().join("n1.md").exists());
    assert_eq!(wal_size(&dir), 0);
}

#[test]
fn buffer_time_validation() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let t = token();
    let mut txn = store.begin(&t).unwrap();

    let err = txn.create(&Note::new("", "T", "")).unwrap_err();
    assert_eq!(err.error_code(), error_code::EMPTY_ID);

    let err = txn.create(&Note::new("n1", "", "")).unwrap_err();
    assert_eq!(err.error_code(), error_code::EMPTY_TITLE);

    let err = txn.create(&Note::new("../escape", "T", "")).unwrap_err();
    assert_eq!(err.error_code(), error_code::INVALID_PATH);

    let mut fm = FrontmatterMap::new();
    fm.insert("id", "sneaky");
    let err = txn
        .create(&Note::new("n1", "T", "").with_frontmatter(fm))
        .unwrap_err();
    assert_eq!(err.error_code(), error_code::INVALID_KEY);

    txn.rollback();
}

#[test]
fn get_by_prefix_matches_id_and_caps_at_fifty() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let t = token();
    let mut txn = store.begin(&t).unwrap();
    for i in 0..60 {
        txn.create(&Note::new(&format!("pre{i:03}"), "T", ""))
            .unwrap();
    }
    txn.create(&Note::new("other", "T", "")).unwrap();
    txn.commit(&t).unwrap();

    let rows = store.get_by_prefix(&t, "pre").unwrap();
    assert_eq!(rows.len(), 50, "prefix results are capped");
    assert!(rows.windows(2).all(|w| w[0].id < w[1].id), "ordered by id");

    let rows = store.get_by_prefix(&t, "other").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].path, "other.md");
}

#[test]
fn list_validates_filter_options() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    put_note(&store, "a", "T", "");
    put_note(&store, "b", "T", "");
    let t = token();

    let rows = store.list(&t, 0, 10).unwrap();
    assert_eq!(rows.len(), 2);
    let rows = store.list(&t, 1, 10).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, "b");

    let err = store.list(&t, 0, 0).unwrap_err();
    assert_eq!(err.error_code(), error_code::INVALID_FILTER_OPTS);
    let err = store.list(&t, 0, 501).unwrap_err();
    assert_eq!(err.error_code(), error_code::INVALID_FILTER_OPTS);
    let err = store.list(&t, 2, 10).unwrap_err();
    assert_eq!(err.error_code(), error_code::OFFSET_OUT_OF_BOUNDS);
}

#[test]
fn query_runs_under_the_read_lock() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    put_note(&store, "a", "T", "");

    let count: i64 = store
        .query(&token(), |conn| {
            conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
                .map_err(|e| mddb::StorageError::sqlite(e.to_string()))
        })
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn closed_store_rejects_everything() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    put_note(&store, "a", "T", "");
    let t = token();

    store.close(&t).unwrap();

    assert!(store.get(&t, "a").unwrap_err().is_closed());
    assert!(store.begin(&t).unwrap_err().is_closed());
    assert!(store.get_by_prefix(&t, "a").unwrap_err().is_closed());
    assert!(store.list(&t, 0, 10).unwrap_err().is_closed());
    assert!(store.reindex(&t).unwrap_err().is_closed());
    assert!(store.reindex_incremental(&t).unwrap_err().is_closed());
    assert!(store.close(&t).unwrap_err().is_closed());
}

#[test]
fn empty_commit_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let t = token();
    let txn = store.begin(&t).unwrap();
    txn.commit(&t).unwrap();
    assert_eq!(wal_size(&dir), 0);
}

#[test]
fn errors_expose_stable_codes() {
    // The classification API is part of the contract.
    assert_eq!(StoreError::Closed.error_code(), "closed");
    assert_eq!(
        StoreError::NotFound { id: "x".into() }.error_code(),
        "not-found"
    );
    assert_eq!(
        StoreError::NotFound { id: "x".into() }
            .with_doc("x", "x.md")
            .error_code(),
        "not-found",
        "context wrapping preserves the code"
    );
}

fn nested_rel_path(id: &str) -> String {
    format!("notes/{id}.md")
}

fn suffix_short_id(id: &str) -> String {
    id.rsplit('-').next().unwrap_or(id).to_string()
}

#[test]
fn custom_derivations_drive_layout_and_prefix_search() {
    let dir = TempDir::new().unwrap();
    let mut opts = mddb::StoreOptions::default();
    opts.rel_path_from_id = nested_rel_path;
    opts.short_id_from_id = suffix_short_id;
    let store: mddb::Store<Note> = mddb::Store::open(dir.path(), opts).unwrap();

    let t = token();
    let mut txn = store.begin(&t).unwrap();
    txn.create(&Note::new("task-9f3b", "Nested", "")).unwrap();
    txn.commit(&t).unwrap();

    // The file lands where the derivation says, in a created subdir.
    assert!(dir.path().join("notes/task-9f3b.md").exists());
    assert_eq!(store.get(&t, "task-9f3b").unwrap().title, "Nested");

    // Prefix search matches the derived short id as well as the id.
    let rows = store.get_by_prefix(&t, "9f3").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].short_id, "9f3b");
    let rows = store.get_by_prefix(&t, "task-").unwrap();
    assert_eq!(rows.len(), 1);

    // Reindex agrees with the custom derivation.
    assert_eq!(store.reindex(&t).unwrap(), 1);
}
