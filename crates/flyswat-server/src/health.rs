use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use crate::state::AppState;

/// Structured health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub connections: ConnectionInfo,
    pub leaderboard: LeaderboardInfo,
}

#[derive(Serialize)]
pub struct ConnectionInfo {
    pub websocket: usize,
    pub sse: usize,
}

#[derive(Serialize)]
pub struct LeaderboardInfo {
    pub capacity: usize,
    /// `None` when the store cannot be read.
    pub entries: Option<usize>,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let ws = state.ws_connection_count.load(Ordering::Relaxed);
    let sse = state.sse_subscriber_count.load(Ordering::Relaxed);
    let entries = state.leaderboard.stored_count().await;

    Json(HealthResponse {
        status: if entries.is_some() { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        connections: ConnectionInfo { websocket: ws, sse },
        leaderboard: LeaderboardInfo {
            capacity: state.leaderboard.size(),
            entries,
        },
    })
}

/// Readiness check: the leaderboard store must be reachable.
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, &'static str) {
    match state.leaderboard.try_query().await {
        Ok(_) => (StatusCode::OK, "ready"),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "not ready: leaderboard store unavailable")
        },
    }
}
