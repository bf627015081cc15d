// HTTP route handlers for the judge server

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

use judge_common::traits::{ResultStore, ScoreStore, StatusReporter};
use judge_common::types::Submission;

use crate::pool::DispatchPool;

const LEADERBOARD_LIMIT: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<DispatchPool>,
    pub results: Arc<dyn ResultStore>,
    pub scores: Arc<dyn ScoreStore>,
    pub reporter: Arc<dyn StatusReporter>,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/results/:commit", get(handle_commit_results))
        .route("/health", get(health_check))
        .route("/scoreboard/leaderboard", get(handle_leaderboard))
        .route("/scoreboard/user/:username", get(handle_user_progress))
        .route(
            "/scoreboard/workshop/:workshop/:task",
            get(handle_workshop_stats),
        )
}

/// Gitea push event, reduced to the fields the judge needs.
#[derive(Debug, Deserialize)]
pub struct PushEvent {
    pub r#ref: String,
    pub after: String,
    pub repository: PushRepository,
}

#[derive(Debug, Deserialize)]
pub struct PushRepository {
    pub full_name: String,
    pub clone_url: String,
}

/// POST /webhook - accept a push event and enqueue it for judging
pub async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    Json(event): Json<PushEvent>,
) -> impl IntoResponse {
    let submission = Submission {
        repo_full_name: event.repository.full_name,
        commit_id: event.after,
        branch_ref: event.r#ref,
        clone_url: event.repository.clone_url,
        reporter: Arc::clone(&state.reporter),
    };

    if submission.split_repo().is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "Invalid repository name"
            })),
        );
    }

    info!(
        repo = %submission.repo_full_name,
        commit = %submission.commit_id,
        "webhook received"
    );

    // Blocks only while the queue is full; that backpressure is
    // intentional.
    match state.pool.submit(submission).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "status": "submission accepted"
            })),
        ),
        Err(e) => {
            error!(error = %e, "failed to enqueue submission");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "error": "Judge is shutting down"
                })),
            )
        }
    }
}

/// GET /results/{commit} - fetch the stored summary for a commit
pub async fn handle_commit_results(
    State(state): State<Arc<AppState>>,
    Path(commit): Path<String>,
) -> impl IntoResponse {
    match state.results.get_summary(&commit).await {
        Ok(Some(summary)) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "commit": commit,
                "summary": summary
            })),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": "Results not found for this commit"
            })),
        ),
        Err(e) => {
            error!(commit = %commit, error = %e, "failed to fetch results");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Internal server error"
                })),
            )
        }
    }
}

/// GET /health - liveness check
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /scoreboard/leaderboard - top users by completed exercises
pub async fn handle_leaderboard(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.scores.get_leaderboard(LEADERBOARD_LIMIT).await {
        Ok(entries) => (StatusCode::OK, Json(serde_json::json!(entries))),
        Err(e) => {
            error!(error = %e, "failed to fetch leaderboard");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Internal server error"
                })),
            )
        }
    }
}

/// GET /scoreboard/user/{username} - one user's passed exercises
pub async fn handle_user_progress(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> impl IntoResponse {
    match state.scores.get_user_progress(&username).await {
        Ok(Some(progress)) => (StatusCode::OK, Json(serde_json::json!(progress))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": "No progress recorded for this user"
            })),
        ),
        Err(e) => {
            error!(username = %username, error = %e, "failed to fetch user progress");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Internal server error"
                })),
            )
        }
    }
}

/// GET /scoreboard/workshop/{workshop}/{task} - per-exercise stats
pub async fn handle_workshop_stats(
    State(state): State<Arc<AppState>>,
    Path((workshop, task)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.scores.get_workshop_stats(&workshop, &task).await {
        Ok(Some(stats)) => (StatusCode::OK, Json(serde_json::json!(stats))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": "No submissions recorded for this exercise"
            })),
        ),
        Err(e) => {
            error!(workshop = %workshop, task = %task, error = %e, "failed to fetch workshop stats");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Internal server error"
                })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_event_deserialization() {
        let payload = serde_json::json!({
            "ref": "refs/heads/develop",
            "before": "28e1879d029cb852e4844d9c718537df08844e03",
            "after": "bffeb74224043ba2feb48d137756c8a9331c449a",
            "repository": {
                "name": "alice",
                "full_name": "workshop/alice",
                "clone_url": "http://localhost:3000/workshop/alice.git"
            }
        });
        let event: PushEvent = serde_json::from_value(payload).unwrap();
        assert_eq!(event.r#ref, "refs/heads/develop");
        assert_eq!(event.after, "bffeb74224043ba2feb48d137756c8a9331c449a");
        assert_eq!(event.repository.full_name, "workshop/alice");
        assert_eq!(
            event.repository.clone_url,
            "http://localhost:3000/workshop/alice.git"
        );
    }

    #[test]
    fn test_push_event_rejects_missing_fields() {
        let payload = serde_json::json!({
            "ref": "refs/heads/main",
            "repository": { "full_name": "a/b", "clone_url": "u" }
        });
        assert!(serde_json::from_value::<PushEvent>(payload).is_err());
    }
}
