//! Shared test fixture: a minimal document type and store helpers.
#![allow(dead_code)]

use mddb::{
    CancellationToken, Document, DocumentParts, FrontmatterMap, Store, StoreError, StoreOptions,
};
use tempfile::TempDir;

/// The simplest possible document over the base-only schema.
#[derive(Debug)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub frontmatter: FrontmatterMap,
    pub body: String,
    pub mtime_ns: i64,
    pub size_bytes: i64,
}

impl Note {
    pub fn new(id: &str, title: &str, body: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            frontmatter: FrontmatterMap::new(),
            body: body.to_string(),
            mtime_ns: 0,
            size_bytes: 0,
        }
    }

    pub fn with_frontmatter(mut self, frontmatter: FrontmatterMap) -> Self {
        self.frontmatter = frontmatter;
        self
    }
}

impl Document for Note {
    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn frontmatter(&self) -> &FrontmatterMap {
        &self.frontmatter
    }

    fn body(&self) -> &str {
        &self.body
    }

    fn from_parts(parts: DocumentParts) -> Result<Self, StoreError> {
        Ok(Self {
            id: parts.id,
            title: parts.title,
            frontmatter: parts.frontmatter,
            body: parts.body,
            mtime_ns: parts.mtime_ns,
            size_bytes: parts.size_bytes,
        })
    }
}

/// Route store logs through the env-filtered subscriber when
/// `RUST_LOG` is set. Safe to call from every test.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

pub fn open_store(dir: &TempDir) -> Store<Note> {
    init_tracing();
    Store::open(dir.path(), StoreOptions::default()).expect("open store")
}

pub fn token() -> CancellationToken {
    CancellationToken::new()
}

/// Create and commit one document.
pub fn put_note(store: &Store<Note>, id: &str, title: &str, body: &str) {
    let t = token();
    let mut txn = store.begin(&t).expect("begin");
    txn.create(&Note::new(id, title, body)).expect("create");
    txn.commit(&t).expect("commit");
}

pub fn wal_size(dir: &TempDir) -> u64 {
    std::fs::metadata(dir.path().join(".mddb/wal"))
        .expect("wal exists")
        .len()
}
