//! Filesystem side of the apply engine: atomic writes via
//! same-directory temp files, delete tolerating absence, and one fsync
//! per touched directory.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use mddb_core::config::Durability;
use mddb_core::errors::StoreError;
use mddb_core::paths::validate_rel_path;

use crate::wal::{WalOp, WalRecord};

pub(crate) struct FileApplier<'a> {
    base: &'a Path,
    durability: Durability,
    /// Directories already created this batch; each is stat-ed once.
    seen_dirs: HashSet<PathBuf>,
    touched_dirs: HashSet<PathBuf>,
    synced_dirs: HashSet<PathBuf>,
}

impl<'a> FileApplier<'a> {
    pub(crate) fn new(base: &'a Path, durability: Durability) -> Self {
        Self {
            base,
            durability,
            seen_dirs: HashSet::new(),
            touched_dirs: HashSet::new(),
            synced_dirs: HashSet::new(),
        }
    }

    /// Apply every record in commit order, then fsync each touched
    /// directory exactly once.
    pub(crate) fn apply(&mut self, records: &[WalRecord]) -> Result<(), StoreError> {
        for rec in records {
            validate_rel_path(&rec.path)
                .map_err(|e| StoreError::from(e).with_doc(&rec.id, &rec.path))?;
            let target = self.base.join(&rec.path);
            match rec.op {
                WalOp::Put => self.put(&target, rec)?,
                WalOp::Delete => self.delete(&target, rec)?,
            }
        }
        self.sync_touched_dirs()
    }

    fn put(&mut self, target: &Path, rec: &WalRecord) -> Result<(), StoreError> {
        let content = rec.content.as_deref().ok_or_else(|| {
            StoreError::from(mddb_core::errors::WalError::Corrupt {
                reason: format!("put {} without content", rec.id),
            })
        })?;
        let parent = target.parent().unwrap_or(self.base).to_path_buf();
        if !self.seen_dirs.contains(&parent) {
            fs::create_dir_all(&parent).map_err(|e| StoreError::Io {
                op: "create dir",
                path: parent.display().to_string(),
                source: e,
            })?;
            self.seen_dirs.insert(parent.clone());
        }

        let mut tmp = NamedTempFile::new_in(&parent).map_err(|e| StoreError::Io {
            op: "create temp",
            path: rec.path.clone(),
            source: e,
        })?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| StoreError::Io {
                op: "write temp",
                path: rec.path.clone(),
                source: e,
            })?;
        if !matches!(self.durability, Durability::None) {
            tmp.as_file().sync_data().map_err(|e| StoreError::Io {
                op: "fsync temp",
                path: rec.path.clone(),
                source: e,
            })?;
        }
        tmp.persist(target).map_err(|e| StoreError::Io {
            op: "rename",
            path: rec.path.clone(),
            source: e.error,
        })?;
        debug!(id = %rec.id, path = %rec.path, "applied put");

        if matches!(self.durability, Durability::FileAndDir) {
            sync_dir(&parent)?;
            self.synced_dirs.insert(parent.clone());
        }
        self.touched_dirs.insert(parent);
        Ok(())
    }

    fn delete(&mut self, target: &Path, rec: &WalRecord) -> Result<(), StoreError> {
        match fs::remove_file(target) {
            Ok(()) => debug!(id = %rec.id, path = %rec.path, "applied delete"),
            // Replay hits files that are already gone.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(StoreError::Io {
                    op: "remove",
                    path: rec.path.clone(),
                    source: e,
                })
            }
        }
        let parent = target.parent().unwrap_or(self.base).to_path_buf();
        self.touched_dirs.insert(parent);
        Ok(())
    }

    fn sync_touched_dirs(&mut self) -> Result<(), StoreError> {
        for dir in self.touched_dirs.drain() {
            if self.synced_dirs.contains(&dir) {
                continue;
            }
            sync_dir(&dir)?;
        }
        Ok(())
    }
}

fn sync_dir(dir: &Path) -> Result<(), StoreError> {
    let handle = File::open(dir).map_err(|e| StoreError::Io {
        op: "open dir",
        path: dir.display().to_string(),
        source: e,
    })?;
    handle.sync_all().map_err(|e| StoreError::Io {
        op: "fsync dir",
        path: dir.display().to_string(),
        source: e,
    })
}
