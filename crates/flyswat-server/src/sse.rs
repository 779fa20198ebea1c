use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::leaderboard::LeaderboardUpdate;
use crate::state::{AppState, ConnectionGuard};

/// GET /api/v1/leaderboard/stream: pushes the ranked board after every
/// stored submission.
pub async fn leaderboard_stream(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, StatusCode> {
    let max_sse = state.config.limits.max_sse_subscribers;
    let current = state.sse_subscriber_count.load(Ordering::Relaxed);
    if current >= max_sse {
        tracing::warn!(current, max = max_sse, "SSE subscriber limit reached");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let guard = ConnectionGuard::new(Arc::clone(&state.sse_subscriber_count));
    let rx = state.leaderboard.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result: Result<LeaderboardUpdate, _>| {
        let _guard = &guard;
        match result {
            Ok(update) => match serde_json::to_string(&update.entries) {
                Ok(json) => Some(Ok(SseEvent::default().event("leaderboard").data(json))),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to serialize leaderboard update");
                    None
                },
            },
            Err(e) => {
                tracing::warn!("SSE broadcast receive error: {e}");
                None
            },
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
