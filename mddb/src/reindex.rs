//! Reindex engine: full rebuild from the tree and incremental
//! reconciliation using `(mtime_ns, size_bytes)` as the change witness.

use std::collections::HashMap;

use tracing::{info, warn};
use walkdir::WalkDir;

use mddb_core::cancel::CancellationToken;
use mddb_core::document::{Document, DocumentParts, SqlValue};
use mddb_core::errors::{ScanIssue, StoreError};
use mddb_core::paths::validate_rel_path;
use mddb_storage::{apply as index, queries::documents, schema};

use crate::store::{Store, META_DIR};

/// Upserts per batch during a full rebuild.
const BULK_BATCH: usize = 50;

/// Counts reported by an incremental reindex. `total` is the number of
/// `.md` files scanned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReindexStats {
    pub total: usize,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
}

/// One fully parsed file, ready to upsert.
struct ScannedRow {
    id: String,
    short_id: String,
    rel_path: String,
    title: String,
    mtime_ns: i64,
    size_bytes: i64,
    user: Vec<SqlValue>,
}

impl<D: Document> Store<D> {
    /// Rebuild the index from the filesystem. Replays any pending WAL
    /// first, then drops and recreates the tables inside one SQL
    /// transaction. Returns the number of indexed documents.
    pub fn reindex(&self, token: &CancellationToken) -> Result<usize, StoreError> {
        self.ensure_open()?;
        let mut wl = self.coord.write(token)?;
        let result = (|| {
            self.replay_files_only()?;
            self.rebuild_index_locked()
        })();
        wl.release();
        result
    }

    /// Reconcile the index against the filesystem. Files whose
    /// `(mtime_ns, size_bytes)` differ from their row are re-parsed;
    /// rows whose file disappeared are removed.
    pub fn reindex_incremental(
        &self,
        token: &CancellationToken,
    ) -> Result<ReindexStats, StoreError> {
        self.ensure_open()?;
        let mut wl = self.coord.write(token)?;
        let result = (|| {
            self.replay_pending()?;
            self.reconcile_locked()
        })();
        wl.release();
        result
    }

    /// Replay a pending WAL without touching the index; the caller is
    /// about to rebuild it from the tree.
    fn replay_files_only(&self) -> Result<(), StoreError> {
        match crate::wal::classify(self.wal_file())? {
            crate::wal::WalState::Empty => Ok(()),
            crate::wal::WalState::Uncommitted => {
                warn!("discarding uncommitted wal remnant");
                crate::wal::truncate(self.wal_file())?;
                Ok(())
            }
            crate::wal::WalState::Committed(records) => self.roll_files_forward(&records),
        }
    }

    /// Drop, recreate, and refill the index tables in one SQL
    /// transaction. Caller holds the write lock and has already dealt
    /// with the WAL.
    pub(crate) fn rebuild_index_locked(&self) -> Result<usize, StoreError> {
        let files = self.scan_tree()?;
        let mut rows = Vec::with_capacity(files.len());
        let mut issues = Vec::new();
        for (rel, _, _) in &files {
            match self.load_row(rel) {
                Ok(row) => rows.push(row),
                Err(e) => issues.push(ScanIssue {
                    path: rel.clone(),
                    error: e.to_string(),
                }),
            }
        }
        if !issues.is_empty() {
            return Err(StoreError::IndexScan { issues });
        }

        let table = &self.opts.table;
        let count = rows.len();
        self.with_index_tx(|tx| {
            schema::drop_schema(tx, table)?;
            schema::create_schema(tx, table, &self.opts.schema)?;
            if let Some(hook) = &self.opts.after_recreate_schema {
                hook(tx)?;
            }
            for batch in rows.chunks(BULK_BATCH) {
                for row in batch {
                    upsert_scanned(tx, table, &self.opts.schema.columns, row)?;
                }
                if let Some(hook) = &self.opts.after_bulk_index {
                    let ids: Vec<String> = batch.iter().map(|r| r.id.clone()).collect();
                    hook(tx, &ids)?;
                }
            }
            schema::write_user_version(tx, self.schema_fingerprint())?;
            Ok(())
        })?;
        info!(documents = count, "full reindex complete");
        Ok(count)
    }

    fn reconcile_locked(&self) -> Result<ReindexStats, StoreError> {
        let files = self.scan_tree()?;
        let existing = self.with_conn(|c| documents::all_summaries(c, &self.opts.table))?;
        let by_path: HashMap<&str, &mddb_core::document::DocumentSummary> =
            existing.iter().map(|s| (s.path.as_str(), s)).collect();

        let mut stats = ReindexStats {
            total: files.len(),
            ..ReindexStats::default()
        };
        let mut upserts: Vec<ScannedRow> = Vec::new();
        for (rel, mtime_ns, size_bytes) in &files {
            match by_path.get(rel.as_str()) {
                Some(row) if row.mtime_ns == *mtime_ns && row.size_bytes == *size_bytes => {
                    stats.skipped += 1;
                }
                Some(_) => {
                    upserts.push(self.load_row(rel)?);
                    stats.updated += 1;
                }
                None => {
                    upserts.push(self.load_row(rel)?);
                    stats.inserted += 1;
                }
            }
        }
        let on_disk: std::collections::HashSet<&str> =
            files.iter().map(|(rel, _, _)| rel.as_str()).collect();
        let deletes: Vec<&str> = existing
            .iter()
            .filter(|s| !on_disk.contains(s.path.as_str()))
            .map(|s| s.id.as_str())
            .collect();
        stats.deleted = deletes.len();

        self.with_index_tx(|tx| {
            for row in &upserts {
                upsert_scanned(tx, &self.opts.table, &self.opts.schema.columns, row)?;
            }
            for id in &deletes {
                index::delete_row(tx, &self.opts.table, id)?;
            }
            if let Some(hook) = &self.opts.after_incremental_index {
                hook(tx, &stats)?;
            }
            Ok(())
        })?;
        info!(
            total = stats.total,
            inserted = stats.inserted,
            updated = stats.updated,
            deleted = stats.deleted,
            skipped = stats.skipped,
            "incremental reindex complete"
        );
        Ok(stats)
    }

    /// Every `.md` file under the base with its stat witness, sorted
    /// by path. The `.mddb` subtree is skipped.
    fn scan_tree(&self) -> Result<Vec<(String, i64, i64)>, StoreError> {
        let mut files = Vec::new();
        let walker = WalkDir::new(self.base())
            .into_iter()
            .filter_entry(|e| !(e.file_type().is_dir() && e.file_name() == META_DIR));
        for entry in walker {
            let entry = entry.map_err(|e| StoreError::Io {
                op: "walk",
                path: self.base().display().to_string(),
                source: std::io::Error::other(e),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("md") {
                continue;
            }
            let rel = path
                .strip_prefix(self.base())
                .ok()
                .and_then(|p| p.to_str())
                .map(str::to_string);
            let Some(rel) = rel else {
                continue;
            };
            let (mtime_ns, size_bytes) = self.stat_file(&rel)?;
            files.push((rel, mtime_ns, size_bytes));
        }
        files.sort();
        Ok(files)
    }

    /// Read, validate, and parse one file into an upsertable row.
    fn load_row(&self, rel: &str) -> Result<ScannedRow, StoreError> {
        validate_rel_path(rel)?;
        let bytes = std::fs::read(self.base().join(rel)).map_err(|e| StoreError::Io {
            op: "read",
            path: rel.to_string(),
            source: e,
        })?;
        let parsed = self.parse_file(&bytes, None, rel)?;

        // Canonical check: the file must live where its id derives to.
        let derived = self.rel_path_of(&parsed.id)?;
        mddb_core::paths::check_derivation(&parsed.id, &derived, rel)?;

        let short_id = self.short_id_of(&parsed.id)?;
        let (mtime_ns, size_bytes) = self.stat_file(rel)?;
        let doc = D::from_parts(DocumentParts {
            id: parsed.id.clone(),
            short_id: short_id.clone(),
            rel_path: rel.to_string(),
            title: parsed.title.clone(),
            frontmatter: parsed.frontmatter,
            body: parsed.body,
            mtime_ns,
            size_bytes,
        })?;
        Ok(ScannedRow {
            id: parsed.id,
            short_id,
            rel_path: rel.to_string(),
            title: parsed.title,
            mtime_ns,
            size_bytes,
            user: doc.column_values(),
        })
    }
}

fn upsert_scanned(
    tx: &rusqlite::Transaction<'_>,
    table: &str,
    user_columns: &[mddb_core::config::SqlColumn],
    row: &ScannedRow,
) -> Result<(), StoreError> {
    index::upsert_row(
        tx,
        table,
        user_columns,
        &index::IndexRow {
            id: &row.id,
            short_id: &row.short_id,
            path: &row.rel_path,
            mtime_ns: row.mtime_ns,
            size_bytes: row.size_bytes,
            title: &row.title,
            user: row.user.clone(),
        },
    )
    .map_err(StoreError::from)
}
