//! REST API routes.
//!
//! Thin handlers over the store and the assignment engine. Every failure
//! becomes a JSON body `{"error": {"code", "message"}}` with a status code
//! chosen from the error kind.

use crate::db::DbError;
use crate::error::{AppError, AssignmentError};
use crate::models::{PullRequest, PullRequestShort, PullRequestStatus, Team, User};
use crate::services::assignment::{Directory, Ledger};
use crate::services::server::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

// ── Error handling ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

/// Wrapper to make AppError usable as an axum error response.
pub struct ApiErr(pub AppError);

impl ApiErr {
    fn status(&self) -> StatusCode {
        match &self.0 {
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::InvalidInput { .. } | AppError::TeamExists { .. } => StatusCode::BAD_REQUEST,
            AppError::PullRequestExists { .. }
            | AppError::PullRequestMerged
            | AppError::NotAssigned
            | AppError::NoCandidate => StatusCode::CONFLICT,
            AppError::Database { .. } | AppError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("[api] {}", self.0);
        }

        let message = match &self.0 {
            AppError::NotFound { .. } => "resource not found".to_string(),
            other => other.to_string(),
        };

        (
            status,
            Json(ErrorBody {
                error: ErrorDetail {
                    code: self.0.code(),
                    message,
                },
            }),
        )
            .into_response()
    }
}

impl From<AppError> for ApiErr {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<DbError> for ApiErr {
    fn from(err: DbError) -> Self {
        Self(AppError::from(err))
    }
}

impl From<AssignmentError> for ApiErr {
    fn from(err: AssignmentError) -> Self {
        Self(AppError::from(err))
    }
}

/// Unwrap a JSON body, turning extractor rejections into INVALID_INPUT.
fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiErr> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiErr(AppError::invalid_input(rejection.body_text())))
}

/// Reject missing or blank identifiers.
fn required(value: Option<String>, field: &str) -> Result<String, ApiErr> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ApiErr(AppError::invalid_input_field(
            format!("{} is required", field),
            field,
        ))),
    }
}

// ── Request / response types ─────────────────────────────────────────────────

#[derive(Deserialize)]
struct TeamQuery {
    team_name: Option<String>,
}

#[derive(Deserialize)]
struct UserQuery {
    user_id: Option<String>,
}

#[derive(Deserialize)]
struct SetActiveRequest {
    user_id: String,
    is_active: bool,
}

#[derive(Deserialize)]
struct CreatePullRequest {
    pull_request_id: String,
    pull_request_name: String,
    author_id: String,
}

#[derive(Deserialize)]
struct MergeRequest {
    pull_request_id: String,
}

#[derive(Deserialize)]
struct ReassignRequest {
    pull_request_id: String,
    old_user_id: String,
}

#[derive(Serialize)]
struct TeamEnvelope {
    team: Team,
}

#[derive(Serialize)]
struct UserEnvelope {
    user: User,
}

#[derive(Serialize)]
struct ReviewsResponse {
    user_id: String,
    pull_requests: Vec<PullRequestShort>,
}

#[derive(Serialize)]
struct PullRequestEnvelope {
    pr: PullRequest,
}

#[derive(Serialize)]
struct ReassignResponse {
    pr: PullRequest,
    replaced_by: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

// ── Route builder ────────────────────────────────────────────────────────────

/// Build the team, user and pull request routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/team/add", post(add_team))
        .route("/team/get", get(get_team))
        .route("/users/setIsActive", post(set_user_active))
        .route("/users/getReview", get(get_user_reviews))
        .route("/pullRequest/create", post(create_pull_request))
        .route("/pullRequest/merge", post(merge_pull_request))
        .route("/pullRequest/reassign", post(reassign_reviewer))
        .route("/health", get(health))
}

// ── Team & user handlers ─────────────────────────────────────────────────────

/// POST /team/add: create a team and upsert its members.
async fn add_team(
    State(state): State<AppState>,
    body: Result<Json<Team>, JsonRejection>,
) -> Result<(StatusCode, Json<TeamEnvelope>), ApiErr> {
    let mut team = parse_body(body)?;
    team.team_name = required(Some(team.team_name), "team_name")?;

    state.store.create_team(&team).await?;

    // Duplicate member ids collapse to the last entry on insert.
    let team = state
        .store
        .get_team(&team.team_name)
        .await?
        .ok_or_else(|| AppError::internal(format!("team {} missing after insert", team.team_name)))?;

    Ok((StatusCode::CREATED, Json(TeamEnvelope { team })))
}

/// GET /team/get?team_name=X: a team with its members.
async fn get_team(
    State(state): State<AppState>,
    Query(params): Query<TeamQuery>,
) -> Result<Json<Team>, ApiErr> {
    let team_name = required(params.team_name, "team_name")?;

    let team = state
        .store
        .get_team(&team_name)
        .await?
        .ok_or_else(|| AppError::not_found_with_id("Team", &team_name))?;

    Ok(Json(team))
}

/// POST /users/setIsActive: toggle a user's eligibility for review.
async fn set_user_active(
    State(state): State<AppState>,
    body: Result<Json<SetActiveRequest>, JsonRejection>,
) -> Result<Json<UserEnvelope>, ApiErr> {
    let req = parse_body(body)?;

    let user = state
        .store
        .set_user_active(&req.user_id, req.is_active)
        .await?
        .ok_or_else(|| AppError::not_found_with_id("User", &req.user_id))?;

    log::info!("[api] User {} is_active = {}", user.user_id, user.is_active);
    Ok(Json(UserEnvelope { user }))
}

/// GET /users/getReview?user_id=X: pull requests the user reviews.
async fn get_user_reviews(
    State(state): State<AppState>,
    Query(params): Query<UserQuery>,
) -> Result<Json<ReviewsResponse>, ApiErr> {
    let user_id = required(params.user_id, "user_id")?;

    if state.store.get_user(&user_id).await?.is_none() {
        return Err(AppError::not_found_with_id("User", &user_id).into());
    }

    let pull_requests = state.store.reviews_for_user(&user_id).await?;

    Ok(Json(ReviewsResponse {
        user_id,
        pull_requests,
    }))
}

// ── Pull request handlers ────────────────────────────────────────────────────

/// POST /pullRequest/create: open a pull request with assigned reviewers.
async fn create_pull_request(
    State(state): State<AppState>,
    body: Result<Json<CreatePullRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PullRequestEnvelope>), ApiErr> {
    let req = parse_body(body)?;
    let pull_request_id = required(Some(req.pull_request_id), "pull_request_id")?;

    let reviewers = state.engine.assign_reviewers(&req.author_id).await?;

    let pr = PullRequest {
        pull_request_id,
        pull_request_name: req.pull_request_name,
        author_id: req.author_id,
        status: PullRequestStatus::Open,
        assigned_reviewers: reviewers,
        created_at: chrono::Utc::now(),
        merged_at: None,
    };

    let pr = state.store.create_pull_request(&pr).await?;

    Ok((StatusCode::CREATED, Json(PullRequestEnvelope { pr })))
}

/// POST /pullRequest/merge: mark a pull request merged (idempotent).
async fn merge_pull_request(
    State(state): State<AppState>,
    body: Result<Json<MergeRequest>, JsonRejection>,
) -> Result<Json<PullRequestEnvelope>, ApiErr> {
    let req = parse_body(body)?;
    let _guard = state
        .store
        .pull_request_locks()
        .lock(&req.pull_request_id)
        .await;

    let pr = state
        .store
        .merge_pull_request(&req.pull_request_id)
        .await?
        .ok_or_else(|| AppError::not_found_with_id("PullRequest", &req.pull_request_id))?;

    Ok(Json(PullRequestEnvelope { pr }))
}

/// POST /pullRequest/reassign: swap one reviewer for an eligible teammate.
async fn reassign_reviewer(
    State(state): State<AppState>,
    body: Result<Json<ReassignRequest>, JsonRejection>,
) -> Result<Json<ReassignResponse>, ApiErr> {
    let req = parse_body(body)?;
    let _guard = state
        .store
        .pull_request_locks()
        .lock(&req.pull_request_id)
        .await;

    let replaced_by = state
        .engine
        .reassign_reviewer(&req.pull_request_id, &req.old_user_id)
        .await?;

    let pr = state
        .store
        .get_pull_request(&req.pull_request_id)
        .await?
        .ok_or_else(|| {
            AppError::internal(format!(
                "pull request {} missing after reassignment",
                req.pull_request_id
            ))
        })?;

    Ok(Json(ReassignResponse { pr, replaced_by }))
}

/// GET /health: liveness check.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
