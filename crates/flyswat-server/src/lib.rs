pub mod api;
pub mod config;
pub mod error;
pub mod health;
pub mod leaderboard;
pub mod session_loop;
pub mod sse;
pub mod state;
pub mod ws;

use std::time::Duration;

use axum::Router;
use axum::http::Method;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;

use config::ServerConfig;
use state::AppState;

/// Build the Axum router and application state from a config.
pub fn build_app(config: ServerConfig) -> (Router<()>, AppState) {
    let state = AppState::new(config);
    (build_router(state.clone()), state)
}

/// Build the router around existing state (tests inject their own store).
pub fn build_router(state: AppState) -> Router<()> {
    let web_root = state.config.web_root.clone();
    let timeout = Duration::from_secs(state.config.limits.request_timeout_secs);

    // Request timeout only applies to plain HTTP; streams are excluded
    let api_routes = Router::new()
        .route(
            "/leaderboard",
            get(api::get_leaderboard).post(api::submit_score),
        )
        .layer(TimeoutLayer::new(timeout))
        .route("/leaderboard/stream", get(sse::leaderboard_stream));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .nest("/api/v1", api_routes)
        .fallback_service(ServeDir::new(&web_root))
        .layer(cors)
        .with_state(state)
}
