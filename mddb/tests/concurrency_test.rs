//! Concurrency and locking: reader parallelism, writer exclusion
//! across store handles, deadline-exceeded instead of hangs, and
//! cancellation.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use common::{open_store, put_note, token, Note};
use mddb::error_code;
use mddb::{CancellationToken, MddbErrorCode, Store, StoreOptions};
use tempfile::TempDir;

fn open_with_timeout(dir: &TempDir, timeout: Duration) -> Store<Note> {
    let mut opts = StoreOptions::default();
    opts.lock_timeout = timeout;
    Store::open(dir.path(), opts).expect("open store")
}

#[test]
fn concurrent_readers_make_progress() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(open_store(&dir));
    put_note(&store, "shared", "Shared", "");

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..20 {
                    let note = store.get(&token(), "shared").unwrap();
                    assert_eq!(note.title, "Shared");
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn held_write_lock_times_out_other_clients() {
    let dir = TempDir::new().unwrap();
    let writer = open_with_timeout(&dir, Duration::from_secs(5));
    put_note(&writer, "a", "A", "");

    // A second handle on the same base contends through the file lock.
    let other = open_with_timeout(&dir, Duration::from_millis(200));

    let t = token();
    let txn = writer.begin(&t).unwrap();

    let start = Instant::now();
    let err = other.get(&t, "a").unwrap_err();
    assert_eq!(err.error_code(), error_code::DEADLINE_EXCEEDED);
    assert!(
        start.elapsed() < Duration::from_secs(3),
        "timed out instead of hanging"
    );

    let err = other.begin(&t).unwrap_err();
    assert_eq!(err.error_code(), error_code::DEADLINE_EXCEEDED);

    txn.rollback();

    // With the writer gone, the same handle proceeds.
    assert_eq!(other.get(&t, "a").unwrap().title, "A");
}

#[test]
fn writes_from_one_handle_are_visible_to_another() {
    let dir = TempDir::new().unwrap();
    let one = open_with_timeout(&dir, Duration::from_secs(5));
    let two = open_with_timeout(&dir, Duration::from_secs(5));

    put_note(&one, "x", "From one", "");
    assert_eq!(two.get(&token(), "x").unwrap().title, "From one");

    put_note(&two, "y", "From two", "");
    assert_eq!(one.get(&token(), "y").unwrap().title, "From two");
}

#[test]
fn readers_block_while_writer_commits_then_observe_it() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(open_with_timeout(&dir, Duration::from_secs(10)));
    put_note(&store, "doc", "v1", "");

    let (acquired_tx, acquired_rx) = std::sync::mpsc::channel();
    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            let t = token();
            let mut txn = store.begin(&t).unwrap();
            txn.update(&Note::new("doc", "v2", "")).unwrap();
            acquired_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(100));
            txn.commit(&t).unwrap();
        })
    };

    // This read starts while the writer holds the lock; once it
    // returns, it must observe the committed state.
    acquired_rx.recv().unwrap();
    let note = store.get(&token(), "doc").unwrap();
    assert_eq!(note.title, "v2");
    writer.join().unwrap();
}

#[test]
fn cancelled_token_aborts_before_any_effect() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    put_note(&store, "a", "A", "");

    let cancelled = CancellationToken::new();
    cancelled.cancel();

    let err = store.get(&cancelled, "a").unwrap_err();
    assert_eq!(err.error_code(), error_code::DEADLINE_EXCEEDED);
    let err = store.begin(&cancelled).unwrap_err();
    assert_eq!(err.error_code(), error_code::DEADLINE_EXCEEDED);
}

#[test]
fn commit_cancelled_before_fsync_leaves_no_trace() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let t = token();
    let mut txn = store.begin(&t).unwrap();
    txn.create(&Note::new("n1", "T", "")).unwrap();

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let err = txn.commit(&cancelled).unwrap_err();
    assert_eq!(err.error_code(), error_code::DEADLINE_EXCEEDED);

    assert!(!dir.path().join("n1.md").exists());
    assert_eq!(common::wal_size(&dir), 0);
    assert!(store.get(&t, "n1").unwrap_err().is_not_found());
}
