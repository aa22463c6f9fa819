//! The store: owns the SQL handle and the WAL descriptor, coordinates
//! locks, replays pending WALs, and serves the reader API.

use std::fs::{self, File, OpenOptions};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use mddb_core::cancel::CancellationToken;
use mddb_core::document::{
    Document, DocumentParts, DocumentSummary, FrontmatterMap, RESERVED_KEYS,
};
use mddb_core::errors::{StorageError, StoreError, WalError};
use mddb_core::paths::{check_derivation, validate_rel_path};
use mddb_frontmatter::{marshal_raw, MarshalOptions, Value};
use mddb_storage::connection::{open_index, with_immediate_transaction};
use mddb_storage::{apply as index, queries::documents, schema};

use crate::lock::{LockCoordinator, ReadLock};
use crate::options::StoreOptions;
use crate::txn::Transaction;
use crate::wal::{self, WalOp, WalRecord, WalState};

/// Subdirectory holding the WAL and the index database.
pub const META_DIR: &str = ".mddb";

const WAL_FILE: &str = "wal";
const INDEX_FILE: &str = "index.sqlite";

/// Cap on rows returned by prefix lookups.
const PREFIX_LIMIT: usize = 50;

/// Upper bound on the page size accepted by `list`.
const LIST_MAX_LIMIT: usize = 500;

/// An embedded document store over a directory of Markdown files.
///
/// Generic over the user document type. Safe for concurrent use within
/// a process; concurrent processes are coordinated through the
/// advisory lock on the WAL file.
pub struct Store<D: Document> {
    base: PathBuf,
    pub(crate) opts: StoreOptions,
    fingerprint: u32,
    wal: Arc<File>,
    pub(crate) coord: LockCoordinator,
    conn: Mutex<Option<Connection>>,
    closed: AtomicBool,
    _doc: PhantomData<fn() -> D>,
}

impl<D: Document> std::fmt::Debug for Store<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("base", &self.base)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Owned view of one parsed file.
pub(crate) struct ParsedDoc {
    pub id: String,
    pub title: String,
    pub frontmatter: FrontmatterMap,
    pub body: String,
}

impl<D: Document> Store<D> {
    /// Open (and if necessary create) a store under `base`.
    ///
    /// Recovery runs before this returns: a committed WAL is replayed,
    /// an uncommitted remnant is truncated, a corrupt WAL fails the
    /// open and is left in place, and a schema fingerprint mismatch
    /// triggers a full index rebuild from the files.
    pub fn open(base: impl AsRef<Path>, opts: StoreOptions) -> Result<Self, StoreError> {
        schema::validate_table_name(&opts.table)?;
        let base = base.as_ref().to_path_buf();
        let meta_dir = base.join(META_DIR);
        fs::create_dir_all(&meta_dir).map_err(|e| StoreError::Io {
            op: "create dir",
            path: meta_dir.display().to_string(),
            source: e,
        })?;

        let wal_path = meta_dir.join(WAL_FILE);
        let wal_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&wal_path)
            .map_err(|e| StoreError::Io {
                op: "open wal",
                path: wal_path.display().to_string(),
                source: e,
            })?;
        let wal = Arc::new(wal_file);

        let conn = open_index(&meta_dir.join(INDEX_FILE))?;
        let fingerprint = schema::fingerprint(&opts.table, &opts.schema);
        let timeout = opts.lock_timeout;

        let store = Self {
            base,
            opts,
            fingerprint,
            coord: LockCoordinator::new(Arc::clone(&wal), timeout),
            wal,
            conn: Mutex::new(Some(conn)),
            closed: AtomicBool::new(false),
            _doc: PhantomData,
        };
        store.recover_on_open()?;
        Ok(store)
    }

    /// The base directory this store lives under.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// The fingerprint of the configured index layout.
    pub fn schema_fingerprint(&self) -> u32 {
        self.fingerprint
    }

    /// Close the store. Subsequent operations fail with the closed
    /// sentinel. The WAL descriptor is released when the store value
    /// drops.
    pub fn close(&self, token: &CancellationToken) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut wl = self.coord.write(token)?;
        self.closed.store(true, Ordering::Release);
        *self.conn.lock() = None;
        wl.release();
        Ok(())
    }

    /// Begin a write transaction. Holds the write lock until commit or
    /// rollback; any pending WAL is replayed first.
    pub fn begin(&self, token: &CancellationToken) -> Result<Transaction<'_, D>, StoreError> {
        self.ensure_open()?;
        let lock = self.coord.write(token)?;
        self.replay_pending()?;
        Ok(Transaction::new(self, lock))
    }

    /// Fetch one document by id.
    pub fn get(&self, token: &CancellationToken, id: &str) -> Result<D, StoreError> {
        self.ensure_open()?;
        if id.is_empty() {
            return Err(StoreError::EmptyId);
        }
        let mut rl = self.read_locked(token)?;
        let result = self.get_locked(id);
        rl.release();
        result
    }

    fn get_locked(&self, id: &str) -> Result<D, StoreError> {
        let Some(path) = self.with_conn(|c| documents::path_by_id(c, &self.opts.table, id))?
        else {
            return Err(StoreError::NotFound { id: id.to_string() });
        };
        validate_rel_path(&path).map_err(|e| StoreError::from(e).with_doc(id, &path))?;
        let derived = self.rel_path_of(id)?;
        check_derivation(id, &derived, &path)?;

        let abs = self.base.join(&path);
        let bytes = match fs::read(&abs) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound { id: id.to_string() })
            }
            Err(e) => {
                return Err(StoreError::Io {
                    op: "read",
                    path: path.clone(),
                    source: e,
                })
            }
        };
        let (mtime_ns, size_bytes) = self.stat_file(&path)?;
        let parsed = self.parse_file(&bytes, Some(id), &path)?;
        let short_id = self.short_id_of(id)?;
        D::from_parts(DocumentParts {
            id: id.to_string(),
            short_id,
            rel_path: path,
            title: parsed.title,
            frontmatter: parsed.frontmatter,
            body: parsed.body,
            mtime_ns,
            size_bytes,
        })
    }

    /// Summary rows whose id or short id starts with `prefix`, ordered
    /// by id, at most 50.
    pub fn get_by_prefix(
        &self,
        token: &CancellationToken,
        prefix: &str,
    ) -> Result<Vec<DocumentSummary>, StoreError> {
        self.ensure_open()?;
        let mut rl = self.read_locked(token)?;
        let result =
            self.with_conn(|c| documents::by_prefix(c, &self.opts.table, prefix, PREFIX_LIMIT));
        rl.release();
        result
    }

    /// A page of summary rows ordered by id.
    pub fn list(
        &self,
        token: &CancellationToken,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<DocumentSummary>, StoreError> {
        self.ensure_open()?;
        if limit == 0 || limit > LIST_MAX_LIMIT {
            return Err(StoreError::InvalidFilterOpts {
                reason: format!("limit must be in 1..={LIST_MAX_LIMIT}, got {limit}"),
            });
        }
        let mut rl = self.read_locked(token)?;
        let result = (|| {
            let rows = self.with_conn(|c| documents::count_rows(c, &self.opts.table))?;
            if offset > 0 && offset >= rows {
                return Err(StoreError::OffsetOutOfBounds { offset, rows });
            }
            self.with_conn(|c| documents::list_page(c, &self.opts.table, offset, limit))
        })();
        rl.release();
        result
    }

    /// Run an arbitrary read against the index under the read lock.
    pub fn query<T>(
        &self,
        token: &CancellationToken,
        f: impl FnOnce(&Connection) -> Result<T, StorageError>,
    ) -> Result<T, StoreError> {
        self.ensure_open()?;
        let mut rl = self.read_locked(token)?;
        let result = self.with_conn(f);
        rl.release();
        result
    }

    // ── lock plumbing ──────────────────────────────────────────────

    pub(crate) fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Take the read lock, upgrading to replay whenever a pending WAL
    /// is observed. Loops until the WAL is empty at inspection time.
    fn read_locked(&self, token: &CancellationToken) -> Result<ReadLock<'_>, StoreError> {
        loop {
            let mut rl = self.coord.read(token)?;
            if wal::size(&self.wal)? == 0 {
                return Ok(rl);
            }
            rl.release();
            let mut wl = self.coord.write(token)?;
            self.replay_pending()?;
            wl.release();
        }
    }

    /// Replay or discard whatever the WAL holds. Caller must hold the
    /// write lock.
    pub(crate) fn replay_pending(&self) -> Result<(), StoreError> {
        match wal::classify(&self.wal)? {
            WalState::Empty => Ok(()),
            WalState::Uncommitted => {
                warn!("discarding uncommitted wal remnant");
                wal::truncate(&self.wal)?;
                Ok(())
            }
            WalState::Committed(records) => {
                info!(ops = records.len(), "replaying committed wal");
                self.apply_committed(&records)
                    .map_err(|e| WalError::Replay {
                        source: Box::new(e),
                    })?;
                Ok(())
            }
        }
    }

    // ── commit/replay apply ────────────────────────────────────────

    /// Steps 3–5 of the commit pipeline: files, index, WAL truncate.
    /// Idempotent; replay and commit share it.
    pub(crate) fn apply_committed(&self, records: &[WalRecord]) -> Result<(), StoreError> {
        let mut applier = crate::apply::FileApplier::new(&self.base, self.opts.durability);
        applier.apply(records)?;
        self.apply_index(records)?;
        wal::truncate(&self.wal)?;
        Ok(())
    }

    /// Roll only the file side forward. Used when the index is about
    /// to be rebuilt from the tree anyway.
    pub(crate) fn roll_files_forward(&self, records: &[WalRecord]) -> Result<(), StoreError> {
        let mut applier = crate::apply::FileApplier::new(&self.base, self.opts.durability);
        applier.apply(records)?;
        wal::truncate(&self.wal)?;
        Ok(())
    }

    fn apply_index(&self, records: &[WalRecord]) -> Result<(), StoreError> {
        self.with_index_tx(|tx| {
            for rec in records {
                validate_rel_path(&rec.path)
                    .map_err(|e| StoreError::from(e).with_doc(&rec.id, &rec.path))?;
                match rec.op {
                    WalOp::Delete => {
                        index::delete_row(tx, &self.opts.table, &rec.id)?;
                        if let Some(hook) = &self.opts.after_delete {
                            hook(tx, &rec.id)?;
                        }
                    }
                    WalOp::Put => {
                        let content = rec.content.as_deref().ok_or_else(|| {
                            StoreError::from(WalError::Corrupt {
                                reason: format!("put {} without content", rec.id),
                            })
                        })?;
                        let parsed = self.parse_file(content.as_bytes(), Some(&rec.id), &rec.path)?;
                        let (mtime_ns, size_bytes) = self.stat_file(&rec.path)?;
                        let short_id = self.short_id_of(&rec.id)?;
                        let doc = D::from_parts(DocumentParts {
                            id: rec.id.clone(),
                            short_id: short_id.clone(),
                            rel_path: rec.path.clone(),
                            title: parsed.title.clone(),
                            frontmatter: parsed.frontmatter,
                            body: parsed.body,
                            mtime_ns,
                            size_bytes,
                        })?;
                        let row = index::IndexRow {
                            id: &rec.id,
                            short_id: &short_id,
                            path: &rec.path,
                            mtime_ns,
                            size_bytes,
                            title: &parsed.title,
                            user: doc.column_values(),
                        };
                        index::upsert_row(tx, &self.opts.table, &self.opts.schema.columns, &row)?;
                        if let Some(hook) = &self.opts.after_put {
                            hook(tx, &rec.id)?;
                        }
                    }
                }
            }
            Ok(())
        })
    }

    // ── open-time recovery ─────────────────────────────────────────

    fn recover_on_open(&self) -> Result<(), StoreError> {
        let token = CancellationToken::new();
        let mut wl = self.coord.write(&token)?;
        let result = self.recover_locked();
        wl.release();
        result
    }

    fn recover_locked(&self) -> Result<(), StoreError> {
        let state = wal::classify(&self.wal)?;
        let stored = self.with_conn(schema::read_user_version)?;
        if stored != self.fingerprint {
            // The index layout changed (or this is a fresh store):
            // roll the files forward, then rebuild from the tree.
            match state {
                WalState::Committed(records) => self.roll_files_forward(&records)?,
                WalState::Uncommitted => {
                    warn!("discarding uncommitted wal remnant");
                    wal::truncate(&self.wal)?;
                }
                WalState::Empty => {}
            }
            let count = self.rebuild_index_locked()?;
            info!(
                stored,
                fingerprint = self.fingerprint,
                documents = count,
                "schema fingerprint changed, index rebuilt"
            );
        } else {
            match state {
                WalState::Committed(records) => {
                    info!(ops = records.len(), "replaying committed wal on open");
                    self.apply_committed(&records)
                        .map_err(|e| WalError::Replay {
                            source: Box::new(e),
                        })?;
                }
                WalState::Uncommitted => {
                    warn!("discarding uncommitted wal remnant");
                    wal::truncate(&self.wal)?;
                }
                WalState::Empty => {}
            }
        }
        Ok(())
    }

    // ── shared internals ───────────────────────────────────────────

    pub(crate) fn wal_file(&self) -> &File {
        &self.wal
    }

    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StorageError>,
    ) -> Result<T, StoreError> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        f(conn).map_err(StoreError::from)
    }

    pub(crate) fn with_index_tx<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        with_immediate_transaction(conn, f)
    }

    pub(crate) fn rel_path_of(&self, id: &str) -> Result<String, StoreError> {
        let rel = (self.opts.rel_path_from_id)(id);
        if rel.is_empty() {
            return Err(StoreError::EmptyPath { id: id.to_string() });
        }
        validate_rel_path(&rel).map_err(|e| StoreError::from(e).with_doc(id, &rel))?;
        Ok(rel)
    }

    pub(crate) fn short_id_of(&self, id: &str) -> Result<String, StoreError> {
        let short = (self.opts.short_id_from_id)(id);
        if short.is_empty() {
            return Err(StoreError::EmptyShortId { id: id.to_string() });
        }
        Ok(short)
    }

    pub(crate) fn stat_file(&self, rel: &str) -> Result<(i64, i64), StoreError> {
        let meta = fs::metadata(self.base.join(rel)).map_err(|e| StoreError::Io {
            op: "stat",
            path: rel.to_string(),
            source: e,
        })?;
        let mtime_ns = meta
            .modified()
            .map_err(|e| StoreError::Io {
                op: "stat",
                path: rel.to_string(),
                source: e,
            })?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        Ok((mtime_ns, meta.len() as i64))
    }

    /// Render a document to its file bytes: frontmatter with the
    /// reserved keys injected, then the body with a trailing newline.
    pub(crate) fn render_document(
        &self,
        id: &str,
        title: &str,
        user_fm: &FrontmatterMap,
        body: &str,
    ) -> Result<String, StoreError> {
        let mut fm = FrontmatterMap::new();
        fm.insert("id", id);
        fm.insert("schema_version", i64::from(self.fingerprint));
        fm.insert("title", title);
        for (key, value) in user_fm.iter() {
            if RESERVED_KEYS.contains(&key) {
                return Err(StoreError::from(
                    mddb_core::errors::MarshalError::ReservedKey {
                        key: key.to_string(),
                    },
                ));
            }
            fm.insert(key.to_string(), value.clone());
        }
        let opts = MarshalOptions {
            priority: &RESERVED_KEYS,
            order: None,
        };
        let mut out = marshal_raw(&fm, &opts).map_err(StoreError::from)?;
        out.push_str(body);
        if !body.is_empty() && !body.ends_with('\n') {
            out.push('\n');
        }
        Ok(out)
    }

    /// Parse file bytes into the owned document pieces, asserting the
    /// expected id when given. `schema_version` is read for diagnostics
    /// only and never validated.
    pub(crate) fn parse_file(
        &self,
        bytes: &[u8],
        expected_id: Option<&str>,
        rel_path: &str,
    ) -> Result<ParsedDoc, StoreError> {
        let parsed = mddb_frontmatter::parse(bytes, &self.opts.parse)
            .map_err(|e| StoreError::from(e).with_doc(expected_id.unwrap_or(""), rel_path))?;

        let id = match parsed.frontmatter.get("id").and_then(Value::as_str) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => return Err(StoreError::EmptyId.with_doc("", rel_path)),
        };
        if let Some(expected) = expected_id {
            if id != expected {
                return Err(StoreError::IdMismatch {
                    expected: expected.to_string(),
                    actual: id,
                    path: rel_path.to_string(),
                });
            }
        }
        let title = match parsed.frontmatter.get("title").and_then(Value::as_str) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => return Err(StoreError::EmptyTitle { id: id.clone() }),
        };
        if let Some(version) = parsed.frontmatter.get("schema_version").and_then(Value::as_int) {
            debug!(id = %id, schema_version = version, "parsed document");
        }

        let frontmatter: FrontmatterMap = parsed
            .frontmatter
            .iter()
            .filter(|(k, _)| !RESERVED_KEYS.contains(k))
            .map(|(k, v)| (k.to_string(), v.to_owned_value()))
            .collect();

        let body = std::str::from_utf8(parsed.tail)
            .map_err(|_| {
                StoreError::from(mddb_core::errors::ParseError::InvalidUtf8 { line: 0 })
                    .with_doc(&id, rel_path)
            })?
            .to_string();

        Ok(ParsedDoc {
            id,
            title,
            frontmatter,
            body,
        })
    }
}
