//! File-backed leaderboard store.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use flyswat_core::leaderboard::{EntryId, LeaderboardEntry, NewEntry};

use super::store::{Inserted, LeaderboardStore, Result, StoreError, Table};

/// Stores the whole table as one JSON document.
///
/// Every operation runs under a single mutex and rewrites the document via a
/// temp file plus atomic rename, so a crash leaves either the old or the new
/// table on disk, never a half-written one.
pub struct FileLeaderboardStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileLeaderboardStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_table(&self) -> Result<Table> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::MissingSchema);
            },
            Err(e) => return Err(StoreError::Io(e)),
        };
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn write_table(&self, table: &Table) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(table)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, bytes)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn modify<T>(&self, f: impl FnOnce(&mut Table) -> T) -> Result<T> {
        let _guard = self.lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut table = self.read_table()?;
        let out = f(&mut table);
        self.write_table(&table)?;
        Ok(out)
    }
}

impl LeaderboardStore for FileLeaderboardStore {
    fn ensure_schema(&self) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        self.write_table(&Table::default())?;
        tracing::info!(path = %self.path.display(), "Created leaderboard file");
        Ok(())
    }

    fn insert(&self, entry: NewEntry) -> Result<EntryId> {
        self.modify(|table| table.insert(entry))
    }

    fn retain_top(&self, n: usize) -> Result<usize> {
        let _guard = self.lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut table = self.read_table()?;
        let deleted = table.retain_top(n);
        if deleted > 0 {
            self.write_table(&table)?;
        }
        Ok(deleted)
    }

    fn insert_top(&self, entry: NewEntry, n: usize) -> Result<Inserted> {
        self.modify(|table| table.insert_top(entry, n))
    }

    fn ranked(&self) -> Result<Vec<LeaderboardEntry>> {
        let _guard = self.lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(self.read_table()?.ranked())
    }

    fn count(&self) -> Result<usize> {
        let _guard = self.lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(self.read_table()?.entries.len())
    }
}
