use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use flyswat_core::leaderboard::{EntryId, RankedEntry};

use crate::error::AppError;
use crate::state::AppState;

/// Request body for a score submission. The score may arrive as a number
/// or as a numeric string (form posts send strings).
#[derive(Debug, Deserialize)]
pub struct SubmitScoreBody {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub score: serde_json::Value,
}

/// Response for a stored submission.
#[derive(Debug, Serialize)]
pub struct SubmitScoreResponse {
    pub success: bool,
    pub id: EntryId,
    /// 1-based rank, `null` if the score did not make the board.
    pub rank: Option<u32>,
}

/// POST /api/v1/leaderboard: record a score.
pub async fn submit_score(
    State(state): State<AppState>,
    body: Result<Json<SubmitScoreBody>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitScoreResponse>), AppError> {
    let Json(body) = body.map_err(|e| {
        tracing::debug!(error = %e, "Rejected malformed submission");
        AppError::BadRequest("invalid_input")
    })?;

    let ack = state.leaderboard.submit(&body.name, &body.score).await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitScoreResponse {
            success: true,
            id: ack.id,
            rank: ack.rank,
        }),
    ))
}

/// GET /api/v1/leaderboard: ranked entries, empty on storage failure.
pub async fn get_leaderboard(State(state): State<AppState>) -> Json<Vec<RankedEntry>> {
    Json(state.leaderboard.query().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServerConfig, StoreKind};
    use serde_json::json;

    fn memory_state() -> AppState {
        let mut config = ServerConfig::default();
        config.leaderboard.store = StoreKind::Memory;
        AppState::new(config)
    }

    fn body(name: &str, score: serde_json::Value) -> Result<Json<SubmitScoreBody>, JsonRejection> {
        Ok(Json(SubmitScoreBody {
            name: name.to_string(),
            score,
        }))
    }

    #[tokio::test]
    async fn submit_returns_created_with_rank() {
        let state = memory_state();
        let (status, Json(resp)) = submit_score(State(state.clone()), body("Ann", json!(12)))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert!(resp.success);
        assert_eq!(resp.rank, Some(1));

        let Json(board) = get_leaderboard(State(state)).await;
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].id, resp.id);
        assert_eq!(board[0].name, "Ann");
    }

    #[tokio::test]
    async fn submit_accepts_string_score() {
        let state = memory_state();
        let result = submit_score(State(state.clone()), body("Bo", json!("7"))).await;
        assert!(result.is_ok());
        let Json(board) = get_leaderboard(State(state)).await;
        assert_eq!(board[0].score, 7);
    }

    #[tokio::test]
    async fn submit_rejects_blank_name() {
        let state = memory_state();
        let err = submit_score(State(state.clone()), body("   ", json!(5)))
            .await
            .unwrap_err();
        assert_eq!(err.tag(), "invalid_input");
        let Json(board) = get_leaderboard(State(state)).await;
        assert!(board.is_empty());
    }

    #[tokio::test]
    async fn submit_rejects_missing_score() {
        let state = memory_state();
        let err = submit_score(State(state), body("Cy", serde_json::Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest("invalid_input")));
    }

    #[tokio::test]
    async fn empty_board_is_empty_array() {
        let Json(board) = get_leaderboard(State(memory_state())).await;
        assert!(board.is_empty());
    }

    #[test]
    fn response_shape() {
        let resp = SubmitScoreResponse {
            success: true,
            id: 4,
            rank: None,
        };
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value, json!({"success": true, "id": 4, "rank": null}));
    }
}
