//! Typed error surface for the HTTP layer

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::judge::JudgeError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("problem not found: {0}")]
    ProblemNotFound(String),
    #[error("contest not found: {0}")]
    ContestNotFound(String),
    #[error("contest is not open for submissions")]
    ContestClosed,
    #[error("rate limited; retry after {retry_after}s")]
    RateLimited { retry_after: u64 },
    #[error(transparent)]
    Judge(#[from] JudgeError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, retry_after) = match &self {
            ApiError::MissingField(_) | ApiError::UnsupportedLanguage(_) => {
                (StatusCode::BAD_REQUEST, None)
            }
            ApiError::ProblemNotFound(_) | ApiError::ContestNotFound(_) => {
                (StatusCode::NOT_FOUND, None)
            }
            ApiError::ContestClosed => (StatusCode::CONFLICT, None),
            ApiError::RateLimited { retry_after } => {
                (StatusCode::TOO_MANY_REQUESTS, Some(*retry_after))
            }
            ApiError::Judge(JudgeError::Timeout(_)) => (StatusCode::GATEWAY_TIMEOUT, None),
            ApiError::Judge(_) => (StatusCode::BAD_GATEWAY, None),
            ApiError::Internal(e) => {
                error!("Internal error: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
        };

        let mut body = json!({ "error": self.to_string() });
        if let Some(retry) = retry_after {
            body["retry_after"] = json!(retry);
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (ApiError::MissingField("code"), StatusCode::BAD_REQUEST),
            (
                ApiError::UnsupportedLanguage("brainfuck".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::ProblemNotFound("p1".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::RateLimited { retry_after: 7 },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                ApiError::Judge(JudgeError::Unavailable("down".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ApiError::Judge(JudgeError::Timeout(60)),
                StatusCode::GATEWAY_TIMEOUT,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    async fn body_json(err: ApiError) -> serde_json::Value {
        let response = err.into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn retry_after_only_present_when_rate_limited() {
        let body = body_json(ApiError::RateLimited { retry_after: 7 }).await;
        assert_eq!(body["retry_after"], 7);

        let body = body_json(ApiError::MissingField("code")).await;
        assert!(body.get("retry_after").is_none());
        assert_eq!(body["error"], "missing required field: code");
    }
}
