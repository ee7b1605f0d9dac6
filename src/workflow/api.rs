use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        FromRequestParts, Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::errors::{ErrorCategory, WorkflowError};

use super::fields::parse_fields;
use super::models::{Principal, RawFields, Role, SpaceFilter, SubmitReview};
use super::orchestrator::ReviewService;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub service: ReviewService,
    pub ws_tx: broadcast::Sender<String>,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateSpaceRequest {
    #[serde(default)]
    pub fields: RawFields,
}

#[derive(Deserialize)]
pub struct ResubmitRequest {
    pub fields: RawFields,
}

#[derive(Deserialize, Default)]
pub struct IssuesQuery {
    /// Include resolved issues as well as open ones.
    #[serde(default)]
    pub all: bool,
}

// ── Identity ──────────────────────────────────────────────────────────

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The caller as established by the upstream auth layer. Every `/api` route
/// requires it.
impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let user_id = header(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {} header", USER_ID_HEADER)))?
            .parse::<i64>()
            .map_err(|_| ApiError::Unauthorized(format!("Invalid {} header", USER_ID_HEADER)))?;
        let role = match header(USER_ROLE_HEADER) {
            Some(raw) => raw.parse::<Role>().map_err(ApiError::Unauthorized)?,
            None => Role::Member,
        };
        Ok(Principal { user_id, role })
    }
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    Unauthorized(String),
    /// The request could not be decoded: bad JSON, query or path segment.
    Malformed(String),
    Workflow(WorkflowError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Malformed(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Malformed(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Malformed(rejection.body_text())
    }
}

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        ApiError::Workflow(e)
    }
}

pub fn status_for(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::Validation => StatusCode::BAD_REQUEST,
        ErrorCategory::StateConflict | ErrorCategory::LedgerConflict => StatusCode::CONFLICT,
        ErrorCategory::Authorization => StatusCode::FORBIDDEN,
        ErrorCategory::NotFound => StatusCode::NOT_FOUND,
        ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, kind, retryable) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, "unauthenticated", false),
            ApiError::Malformed(msg) => (StatusCode::BAD_REQUEST, msg, "malformed_request", false),
            ApiError::Workflow(e) => {
                let status = status_for(e.category());
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(error = %e, "request failed");
                }
                (status, e.to_string(), e.kind(), e.is_retryable())
            }
        };
        (
            status,
            Json(serde_json::json!({
                "error": message,
                "kind": kind,
                "retryable": retryable,
            })),
        )
            .into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/spaces", get(list_spaces).post(create_space))
        .route("/api/spaces/{id}", get(get_space).patch(resubmit))
        .route("/api/spaces/{id}/claim", post(claim_for_review))
        .route(
            "/api/spaces/{id}/reviews",
            get(get_review_history).post(submit_review),
        )
        .route("/api/spaces/{id}/issues", get(get_issues))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn create_space(
    State(state): State<SharedState>,
    caller: Principal,
    req: Result<Json<CreateSpaceRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = req?;
    let fields = parse_fields(req.fields)?;
    let space = state.service.create_space(&caller, fields).await?;
    Ok((StatusCode::CREATED, Json(space)))
}

async fn list_spaces(
    State(state): State<SharedState>,
    _caller: Principal,
    filter: Result<Query<SpaceFilter>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(filter) = filter?;
    let spaces = state.service.list_spaces(filter).await?;
    Ok(Json(spaces))
}

async fn get_space(
    State(state): State<SharedState>,
    _caller: Principal,
    id: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id?;
    let space = state.service.get_space(id).await?;
    Ok(Json(space))
}

async fn claim_for_review(
    State(state): State<SharedState>,
    caller: Principal,
    id: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id?;
    let space = state.service.claim_for_review(id, &caller).await?;
    Ok(Json(space))
}

async fn submit_review(
    State(state): State<SharedState>,
    caller: Principal,
    id: Result<Path<i64>, PathRejection>,
    req: Result<Json<SubmitReview>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id?;
    let Json(req) = req?;
    let record = state.service.submit_review(id, &caller, req).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn get_review_history(
    State(state): State<SharedState>,
    _caller: Principal,
    id: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id?;
    let history = state.service.get_review_history(id).await?;
    Ok(Json(history))
}

async fn resubmit(
    State(state): State<SharedState>,
    caller: Principal,
    id: Result<Path<i64>, PathRejection>,
    req: Result<Json<ResubmitRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id?;
    let Json(req) = req?;
    let outcome = state.service.resubmit(id, &caller, req.fields).await?;
    Ok(Json(outcome))
}

async fn get_issues(
    State(state): State<SharedState>,
    _caller: Principal,
    id: Result<Path<i64>, PathRejection>,
    query: Result<Query<IssuesQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id?;
    let Query(query) = query?;
    let issues = if query.all {
        state.service.get_all_issues(id).await?
    } else {
        state.service.get_open_issues(id).await?
    };
    Ok(Json(issues))
}

// ── Tests ─────────────────────────────────────────────────────────────
