//! Write transactions: an id-keyed operation buffer and the commit
//! pipeline. The irrevocable part of a commit begins at the WAL fsync;
//! everything after it runs to completion regardless of cancellation.

use tracing::debug;

use mddb_core::cancel::CancellationToken;
use mddb_core::document::{Document, FrontmatterMap, RESERVED_KEYS};
use mddb_core::errors::{MarshalError, StoreError};
use mddb_storage::queries::documents;

use crate::lock::WriteLock;
use crate::store::Store;
use crate::wal::{self, WalOp, WalRecord};

enum Pending {
    Put {
        title: String,
        frontmatter: FrontmatterMap,
        body: String,
    },
    Delete,
}

struct Entry {
    id: String,
    rel_path: String,
    op: Pending,
}

/// A single-writer transaction. Holds the write lock from `begin`
/// until commit or rollback; dropping it without committing discards
/// the buffer and releases the lock.
///
/// Operations are keyed by id with last-writer-wins semantics inside
/// the transaction.
pub struct Transaction<'s, D: Document> {
    store: &'s Store<D>,
    lock: WriteLock<'s>,
    pending: Vec<Entry>,
}

impl<'s, D: Document> std::fmt::Debug for Transaction<'s, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("pending_len", &self.pending.len())
            .finish()
    }
}

impl<'s, D: Document> Transaction<'s, D> {
    pub(crate) fn new(store: &'s Store<D>, lock: WriteLock<'s>) -> Self {
        Self {
            store,
            lock,
            pending: Vec::new(),
        }
    }

    fn find(&self, id: &str) -> Option<usize> {
        self.pending.iter().position(|e| e.id == id)
    }

    /// True when the document exists outside this transaction, in the
    /// index or on disk.
    fn exists_outside(&self, id: &str) -> Result<bool, StoreError> {
        let in_index = self
            .store
            .with_conn(|c| documents::id_exists(c, &self.store.opts.table, id))?;
        if in_index {
            return Ok(true);
        }
        let rel = self.store.rel_path_of(id)?;
        Ok(self.store.base().join(rel).exists())
    }

    fn validate_doc(&self, doc: &D) -> Result<Entry, StoreError> {
        let id = doc.id();
        if id.is_empty() {
            return Err(StoreError::EmptyId);
        }
        let title = doc.title();
        if title.is_empty() {
            return Err(StoreError::EmptyTitle { id: id.to_string() });
        }
        let rel_path = self.store.rel_path_of(id)?;
        self.store.short_id_of(id)?;
        for (key, _) in doc.frontmatter().iter() {
            if RESERVED_KEYS.contains(&key) {
                return Err(StoreError::from(MarshalError::ReservedKey {
                    key: key.to_string(),
                })
                .with_doc(id, &rel_path));
            }
        }
        if let Some(idx) = self.find(id) {
            if self.pending[idx].rel_path != rel_path {
                return Err(StoreError::from(mddb_core::errors::PathError::DerivationMismatch {
                    id: id.to_string(),
                    derived: rel_path.clone(),
                    actual: self.pending[idx].rel_path.clone(),
                }));
            }
        }
        Ok(Entry {
            id: id.to_string(),
            rel_path,
            op: Pending::Put {
                title: title.to_string(),
                frontmatter: doc.frontmatter().clone(),
                body: doc.body().to_string(),
            },
        })
    }

    /// Replace the entry for an id in place, or append.
    fn upsert_entry(&mut self, entry: Entry) {
        match self.find(&entry.id) {
            Some(idx) => self.pending[idx] = entry,
            None => self.pending.push(entry),
        }
    }

    /// Buffer the creation of a new document. Fails if the id already
    /// exists in the index, on disk, or as a buffered put.
    pub fn create(&mut self, doc: &D) -> Result<(), StoreError> {
        self.store.ensure_open()?;
        let entry = self.validate_doc(doc)?;
        let buffered_put = self
            .find(&entry.id)
            .is_some_and(|idx| matches!(self.pending[idx].op, Pending::Put { .. }));
        if buffered_put || self.exists_outside(&entry.id)? {
            return Err(StoreError::AlreadyExists { id: entry.id });
        }
        self.upsert_entry(entry);
        Ok(())
    }

    /// Buffer an update. Fails if the id is absent from the index, the
    /// filesystem, and the buffer.
    pub fn update(&mut self, doc: &D) -> Result<(), StoreError> {
        self.store.ensure_open()?;
        let entry = self.validate_doc(doc)?;
        let known = match self.find(&entry.id) {
            Some(idx) if matches!(self.pending[idx].op, Pending::Put { .. }) => true,
            _ => self.exists_outside(&entry.id)?,
        };
        if !known {
            return Err(StoreError::NotFound { id: entry.id });
        }
        self.upsert_entry(entry);
        Ok(())
    }

    /// Buffer a delete. Deleting a buffered put of a document that
    /// never existed outside the transaction collapses to a no-op.
    pub fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        self.store.ensure_open()?;
        if id.is_empty() {
            return Err(StoreError::EmptyId);
        }
        let rel_path = self.store.rel_path_of(id)?;
        let outside = self.exists_outside(id)?;
        match self.find(id) {
            Some(idx) => {
                if matches!(self.pending[idx].op, Pending::Put { .. }) && !outside {
                    self.pending.remove(idx);
                    return Ok(());
                }
                self.pending[idx].op = Pending::Delete;
                Ok(())
            }
            None => {
                if !outside {
                    return Err(StoreError::NotFound { id: id.to_string() });
                }
                self.pending.push(Entry {
                    id: id.to_string(),
                    rel_path,
                    op: Pending::Delete,
                });
                Ok(())
            }
        }
    }

    /// Number of buffered operations.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Discard the buffer and release the write lock. Only possible
    /// before commit; after the WAL fsync the only path is forward.
    pub fn rollback(mut self) {
        self.pending.clear();
        self.lock.release();
    }

    /// Run the commit pipeline: materialise, fsync the WAL, apply
    /// files, apply the index diff, truncate the WAL.
    ///
    /// Cancellation is honoured up to the WAL fsync. A failure after
    /// the fsync returns commit-incomplete; the WAL remains and is
    /// replayed on the next read, write, or open.
    pub fn commit(mut self, token: &CancellationToken) -> Result<(), StoreError> {
        self.store.ensure_open()?;
        if self.pending.is_empty() {
            self.lock.release();
            return Ok(());
        }

        // Step 1: materialise every put into its file bytes.
        let mut records = Vec::with_capacity(self.pending.len());
        for entry in &self.pending {
            match &entry.op {
                Pending::Put {
                    title,
                    frontmatter,
                    body,
                } => {
                    let content = self
                        .store
                        .render_document(&entry.id, title, frontmatter, body)
                        .map_err(|e| e.with_doc(&entry.id, &entry.rel_path))?;
                    records.push(WalRecord {
                        op: WalOp::Put,
                        id: entry.id.clone(),
                        path: entry.rel_path.clone(),
                        content: Some(content),
                    });
                }
                Pending::Delete => records.push(WalRecord {
                    op: WalOp::Delete,
                    id: entry.id.clone(),
                    path: entry.rel_path.clone(),
                    content: None,
                }),
            }
        }

        if token.is_cancelled() {
            return Err(StoreError::from(mddb_core::errors::LockError::DeadlineExceeded {
                op: "commit",
            }));
        }

        // Step 2: write and fsync the WAL. This is the durable point;
        // from here on the commit must roll forward.
        let frame = wal::encode_frame(&records)?;
        wal::write_frame(self.store.wal_file(), &frame)?;
        debug!(ops = records.len(), bytes = frame.len(), "wal frame durable");

        // Steps 3–5, immune to cancellation: completing the apply is
        // the fastest path back to consistency.
        self.store
            .apply_committed(&records)
            .map_err(|e| StoreError::CommitIncomplete {
                source: Box::new(e),
            })?;

        self.lock.release();
        Ok(())
    }
}
