//! HTTP surface of the gateway
//!
//! Authentication is handled upstream; authenticated routes read the
//! user id from the `x-user-id` header the auth middleware injects.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::models::{Contest, ContestParticipant, Problem, SubmissionAttempt};
use crate::rate_limit::{Admission, RateLimiter};
use crate::submission::{SubmissionService, SubmitResponse, TrialResponse};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SubmissionService>,
    pub limiter: Arc<RateLimiter>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/problems/{id}", put(put_problem))
        .route("/problems/{id}/run", post(run_problem))
        .route("/problems/{id}/submit", post(submit_problem))
        .route("/problems/{id}/submissions", get(list_submissions))
        .route("/contests/{id}", put(put_contest))
        .route("/contests/{id}/register", post(register_contest))
        .route("/contests/{id}/registered/{user_id}", get(is_registered))
        .route("/contests/{id}/leaderboard", get(leaderboard))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub language: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub contest_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Trial run against visible test cases, gated by the rate limiter
async fn run_problem(
    State(state): State<AppState>,
    Path(problem_id): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<RunRequest>,
) -> Result<Json<TrialResponse>, ApiError> {
    let client_key = addr.ip().to_string();
    if let Admission::Limited { retry_after } = state
        .limiter
        .admit(&client_key)
        .await
        .map_err(ApiError::Internal)?
    {
        return Err(ApiError::RateLimited { retry_after });
    }

    let response = state
        .service
        .run_trial(&problem_id, &req.code, &req.language)
        .await?;
    Ok(Json(response))
}

/// Scoring submission against hidden test cases
async fn submit_problem(
    State(state): State<AppState>,
    Path(problem_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let user_id = authenticated_user(&headers)?;
    let response = state
        .service
        .submit_for_scoring(
            &user_id,
            &problem_id,
            &req.code,
            &req.language,
            req.contest_id.as_deref(),
        )
        .await?;
    Ok(Json(response))
}

/// The caller's judging attempts for a problem, oldest first
async fn list_submissions(
    State(state): State<AppState>,
    Path(problem_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<SubmissionAttempt>>, ApiError> {
    let user_id = authenticated_user(&headers)?;
    let attempts = state
        .service
        .store()
        .fetch_submissions(&user_id, &problem_id)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(attempts))
}

async fn put_problem(
    State(state): State<AppState>,
    Path(problem_id): Path<String>,
    Json(mut problem): Json<Problem>,
) -> Result<Json<Value>, ApiError> {
    problem.id = problem_id;
    state
        .service
        .store()
        .put_problem(&problem)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(json!({ "saved": true })))
}

async fn put_contest(
    State(state): State<AppState>,
    Path(contest_id): Path<String>,
    Json(mut contest): Json<Contest>,
) -> Result<Json<Value>, ApiError> {
    contest.id = contest_id;
    state
        .service
        .store()
        .put_contest(&contest)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(json!({ "saved": true })))
}

async fn register_contest(
    State(state): State<AppState>,
    Path(contest_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<Value>, ApiError> {
    let user_id = authenticated_user(&headers)?;

    if state
        .service
        .store()
        .fetch_contest(&contest_id)
        .await
        .map_err(ApiError::Internal)?
        .is_none()
    {
        return Err(ApiError::ContestNotFound(contest_id));
    }

    let registered = state
        .service
        .contests()
        .register(&contest_id, &user_id, &req.username)
        .await
        .map_err(ApiError::Internal)?;

    Ok(Json(json!({
        "registered": registered,
        "already_registered": !registered,
    })))
}

async fn is_registered(
    State(state): State<AppState>,
    Path((contest_id, user_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let registered = state
        .service
        .contests()
        .is_registered(&contest_id, &user_id)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(json!({ "is_registered": registered })))
}

async fn leaderboard(
    State(state): State<AppState>,
    Path(contest_id): Path<String>,
) -> Result<Json<Vec<ContestParticipant>>, ApiError> {
    let rows = state
        .service
        .contests()
        .leaderboard(&contest_id)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(rows))
}

fn authenticated_user(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ApiError::MissingField("x-user-id"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticated_user_requires_header() {
        let headers = HeaderMap::new();
        assert!(matches!(
            authenticated_user(&headers),
            Err(ApiError::MissingField("x-user-id"))
        ));

        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", "u42".parse().unwrap());
        assert_eq!(authenticated_user(&headers).unwrap(), "u42");
    }
}
