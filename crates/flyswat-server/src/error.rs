use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::leaderboard::LeaderboardError;

#[derive(Debug)]
pub enum AppError {
    /// Rejected submission; the tag names the reason.
    BadRequest(&'static str),
    /// The leaderboard store could not be reached.
    Unavailable(&'static str),
}

impl AppError {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::BadRequest(t) | Self::Unavailable(t) => t,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl From<LeaderboardError> for AppError {
    fn from(err: LeaderboardError) -> Self {
        match err {
            LeaderboardError::InvalidInput(_) => Self::BadRequest(err.tag()),
            LeaderboardError::StorageUnavailable(_) | LeaderboardError::QueryFailure(_) => {
                Self::Unavailable(err.tag())
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (
            status,
            Json(serde_json::json!({ "success": false, "error": self.tag() })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flyswat_core::leaderboard::ValidationError;

    #[test]
    fn leaderboard_errors_map_to_status() {
        let cases = [
            (
                LeaderboardError::InvalidInput(ValidationError::EmptyName),
                StatusCode::BAD_REQUEST,
                "invalid_input",
            ),
            (
                LeaderboardError::StorageUnavailable("disk".into()),
                StatusCode::SERVICE_UNAVAILABLE,
                "storage_unavailable",
            ),
            (
                LeaderboardError::QueryFailure("disk".into()),
                StatusCode::SERVICE_UNAVAILABLE,
                "query_failure",
            ),
        ];
        for (err, status, tag) in cases {
            let app: AppError = err.into();
            assert_eq!(app.tag(), tag);
            assert_eq!(app.into_response().status(), status);
        }
    }
}
