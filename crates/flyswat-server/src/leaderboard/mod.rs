//! Global leaderboard: validated submissions, top-N pruning, change fan-out.

pub mod file_store;
pub mod store;

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

use flyswat_core::leaderboard::{
    EntryId, LeaderboardEntry, NewEntry, RankedEntry, ValidationError, parse_score, sort_ranked,
    validate_name,
};
use flyswat_core::time::timestamp_millis;

pub use file_store::FileLeaderboardStore;
pub use store::{InMemoryLeaderboardStore, Inserted, LeaderboardStore, StoreError};

/// Default broadcast channel capacity for leaderboard change fan-out.
const DEFAULT_BROADCAST_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum LeaderboardError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("query failed: {0}")]
    QueryFailure(String),
}

impl LeaderboardError {
    /// Short tag reported to clients.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::QueryFailure(_) => "query_failure",
        }
    }
}

/// Acknowledgement of a stored submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitAck {
    pub id: EntryId,
    /// 1-based rank, or `None` if the entry was pruned straight away.
    pub rank: Option<u32>,
}

/// Broadcast after every successful submission so views can refresh.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardUpdate {
    pub entries: Vec<RankedEntry>,
}

pub struct LeaderboardService {
    store: Arc<dyn LeaderboardStore>,
    size: usize,
    updates_tx: broadcast::Sender<LeaderboardUpdate>,
}

impl LeaderboardService {
    pub fn new(store: Arc<dyn LeaderboardStore>, size: usize) -> Self {
        Self::with_capacity(store, size, DEFAULT_BROADCAST_CAPACITY)
    }

    pub fn with_capacity(
        store: Arc<dyn LeaderboardStore>,
        size: usize,
        broadcast_capacity: usize,
    ) -> Self {
        let (updates_tx, _) = broadcast::channel(broadcast_capacity);
        Self {
            store,
            size,
            updates_tx,
        }
    }

    /// Maximum number of entries kept.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LeaderboardUpdate> {
        self.updates_tx.subscribe()
    }

    /// Validate and store a raw submission (score as sent by the client).
    pub async fn submit(
        &self,
        name: &str,
        score: &serde_json::Value,
    ) -> Result<SubmitAck, LeaderboardError> {
        let name = validate_name(name)?;
        let score = parse_score(score)?;
        self.commit(name, score).await
    }

    /// Store a score that is already known to be valid (the final score of
    /// a server-run session). The name is still validated.
    pub async fn submit_score(&self, name: &str, score: u32) -> Result<SubmitAck, LeaderboardError> {
        let name = validate_name(name)?;
        self.commit(name, score).await
    }

    async fn commit(&self, name: String, score: u32) -> Result<SubmitAck, LeaderboardError> {
        let entry = NewEntry {
            name,
            score,
            created_at_ms: timestamp_millis(),
        };
        let store = Arc::clone(&self.store);
        let size = self.size;

        let result = tokio::task::spawn_blocking(move || {
            store.ensure_schema()?;
            store.insert_top(entry, size)
        })
        .await;

        let Inserted { id, pruned, ranked } = match result {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                tracing::error!(error = %e, score, "Leaderboard submit failed");
                return Err(LeaderboardError::StorageUnavailable(e.to_string()));
            },
            Err(e) => {
                tracing::error!(error = %e, score, "Leaderboard submit task failed");
                return Err(LeaderboardError::StorageUnavailable(e.to_string()));
            },
        };

        let entries = self.to_ranked(ranked);
        let rank = entries
            .iter()
            .position(|e| e.id == id)
            .and_then(|i| u32::try_from(i + 1).ok());

        tracing::info!(entry_id = id, score, ?rank, pruned, "Score submitted");

        // No subscribers is fine
        let _ = self.updates_tx.send(LeaderboardUpdate { entries });

        Ok(SubmitAck { id, rank })
    }

    /// Ranked entries, or an empty board if the store cannot be read.
    pub async fn query(&self) -> Vec<RankedEntry> {
        match self.try_query().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "Leaderboard query failed, returning empty board");
                Vec::new()
            },
        }
    }

    /// Ranked entries, surfacing storage errors as `QueryFailure`.
    pub async fn try_query(&self) -> Result<Vec<RankedEntry>, LeaderboardError> {
        let store = Arc::clone(&self.store);
        let ranked = tokio::task::spawn_blocking(move || {
            store.ensure_schema()?;
            store.ranked()
        })
        .await
        .map_err(|e| LeaderboardError::QueryFailure(e.to_string()))?
        .map_err(|e| LeaderboardError::QueryFailure(e.to_string()))?;
        Ok(self.to_ranked(ranked))
    }

    /// Number of stored entries, if the store is readable.
    pub async fn stored_count(&self) -> Option<usize> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            store.ensure_schema()?;
            store.count()
        })
        .await
        .ok()?
        .ok()
    }

    /// Re-sort and re-limit to `size`, guarding against older data that was
    /// written before the bound was enforced.
    fn to_ranked(&self, mut entries: Vec<LeaderboardEntry>) -> Vec<RankedEntry> {
        sort_ranked(&mut entries);
        entries
            .iter()
            .take(self.size)
            .map(RankedEntry::from)
            .collect()
    }
}
