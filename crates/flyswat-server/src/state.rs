use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::{ServerConfig, StoreKind};
use crate::leaderboard::{
    FileLeaderboardStore, InMemoryLeaderboardStore, LeaderboardService, LeaderboardStore,
};

#[derive(Clone)]
pub struct AppState {
    pub leaderboard: Arc<LeaderboardService>,
    pub config: Arc<ServerConfig>,
    pub ws_connection_count: Arc<AtomicUsize>,
    pub sse_subscriber_count: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let store: Arc<dyn LeaderboardStore> = match config.leaderboard.store {
            StoreKind::Memory => Arc::new(InMemoryLeaderboardStore::new()),
            StoreKind::File => Arc::new(FileLeaderboardStore::new(&config.leaderboard.path)),
        };
        Self::with_store(config, store)
    }

    /// Build state around an explicit store.
    pub fn with_store(config: ServerConfig, store: Arc<dyn LeaderboardStore>) -> Self {
        let leaderboard = LeaderboardService::with_capacity(
            store,
            config.leaderboard.size,
            config.limits.broadcast_capacity,
        );
        Self {
            leaderboard: Arc::new(leaderboard),
            config: Arc::new(config),
            ws_connection_count: Arc::new(AtomicUsize::new(0)),
            sse_subscriber_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Counts a live connection for as long as it is held.
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    pub fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self { counter }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}
