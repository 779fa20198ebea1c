//! Storage contract for leaderboard entries plus the in-memory backend.

use std::sync::RwLock;

use thiserror::Error;

use flyswat_core::leaderboard::{EntryId, LeaderboardEntry, NewEntry, sort_ranked, top_n_ids};

/// Errors surfaced by leaderboard stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("leaderboard store lock was poisoned")]
    LockPoisoned,

    #[error("leaderboard table does not exist")]
    MissingSchema,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Result of [`LeaderboardStore::insert_top`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inserted {
    pub id: EntryId,
    /// Entries deleted by the prune, possibly including the new one.
    pub pruned: usize,
    /// The table after the prune, in ranking order.
    pub ranked: Vec<LeaderboardEntry>,
}

/// A durable, shared table of leaderboard entries.
///
/// Entries are only ever inserted or deleted, never updated. Implementations
/// must make [`retain_top`](Self::retain_top) and
/// [`insert_top`](Self::insert_top) single atomic operations: the top-N id
/// set is computed from the store's current contents inside the same
/// critical section that deletes the complement.
pub trait LeaderboardStore: Send + Sync {
    /// Create the table if it does not exist. Repeated calls are no-ops.
    fn ensure_schema(&self) -> Result<()>;

    /// Append an entry and return its assigned id.
    fn insert(&self, entry: NewEntry) -> Result<EntryId>;

    /// Delete every entry whose id is not among the top `n`. Returns the
    /// number of deleted entries.
    fn retain_top(&self, n: usize) -> Result<usize>;

    /// Insert, prune to the top `n` and read back the ranking in one
    /// critical section. On error the table is left as it was.
    fn insert_top(&self, entry: NewEntry, n: usize) -> Result<Inserted>;

    /// All stored entries in ranking order.
    fn ranked(&self) -> Result<Vec<LeaderboardEntry>>;

    /// Number of stored entries.
    fn count(&self) -> Result<usize> {
        Ok(self.ranked()?.len())
    }
}

/// The leaderboard table: a sequence of entries plus the id counter.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct Table {
    pub next_id: EntryId,
    pub entries: Vec<LeaderboardEntry>,
}

impl Table {
    pub fn insert(&mut self, entry: NewEntry) -> EntryId {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.push(entry.into_entry(id));
        id
    }

    pub fn retain_top(&mut self, n: usize) -> usize {
        let keep = top_n_ids(&self.entries, n);
        let before = self.entries.len();
        self.entries.retain(|e| keep.contains(&e.id));
        before - self.entries.len()
    }

    pub fn insert_top(&mut self, entry: NewEntry, n: usize) -> Inserted {
        let id = self.insert(entry);
        let pruned = self.retain_top(n);
        Inserted {
            id,
            pruned,
            ranked: self.ranked(),
        }
    }

    pub fn ranked(&self) -> Vec<LeaderboardEntry> {
        let mut entries = self.entries.clone();
        sort_ranked(&mut entries);
        entries
    }
}

/// In-memory store guarded by one lock. The table only exists after
/// `ensure_schema`, mirroring a relational `CREATE TABLE IF NOT EXISTS`.
pub struct InMemoryLeaderboardStore {
    table: RwLock<Option<Table>>,
}

impl InMemoryLeaderboardStore {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(None),
        }
    }
}

impl Default for InMemoryLeaderboardStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaderboardStore for InMemoryLeaderboardStore {
    fn ensure_schema(&self) -> Result<()> {
        let mut table = self.table.write().map_err(|_| StoreError::LockPoisoned)?;
        if table.is_none() {
            *table = Some(Table::default());
            tracing::debug!("Created in-memory leaderboard table");
        }
        Ok(())
    }

    fn insert(&self, entry: NewEntry) -> Result<EntryId> {
        let mut table = self.table.write().map_err(|_| StoreError::LockPoisoned)?;
        let table = table.as_mut().ok_or(StoreError::MissingSchema)?;
        Ok(table.insert(entry))
    }

    fn retain_top(&self, n: usize) -> Result<usize> {
        let mut table = self.table.write().map_err(|_| StoreError::LockPoisoned)?;
        let table = table.as_mut().ok_or(StoreError::MissingSchema)?;
        Ok(table.retain_top(n))
    }

    fn insert_top(&self, entry: NewEntry, n: usize) -> Result<Inserted> {
        let mut table = self.table.write().map_err(|_| StoreError::LockPoisoned)?;
        let table = table.as_mut().ok_or(StoreError::MissingSchema)?;
        Ok(table.insert_top(entry, n))
    }

    fn ranked(&self) -> Result<Vec<LeaderboardEntry>> {
        let table = self.table.read().map_err(|_| StoreError::LockPoisoned)?;
        let table = table.as_ref().ok_or(StoreError::MissingSchema)?;
        Ok(table.ranked())
    }

    fn count(&self) -> Result<usize> {
        let table = self.table.read().map_err(|_| StoreError::LockPoisoned)?;
        let table = table.as_ref().ok_or(StoreError::MissingSchema)?;
        Ok(table.entries.len())
    }
}
