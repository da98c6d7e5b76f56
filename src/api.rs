//! HTTP API handlers for CivicSense.
//!
//! Handlers stay thin: authenticate, delegate to [`crate::service`], wrap the
//! result. All authorization decisions live in the lifecycle module and the
//! service layer, never inline here.
//!
//! Bearer tokens are read from the `Authorization` header and are never
//! logged; log lines carry ids and statuses only.

use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router, extract::Path, extract::State};
use tracing::{info, instrument};

use crate::auth::{TokenVerifier, authenticate};
use crate::classify::HintClient;
use crate::directory::DepartmentDirectory;
use crate::error::ApiError;
use crate::model::{
    Complaint, CreateComplaintRequest, HistoryEntry, SignupRequest, StatusUpdateRequest, User,
};
use crate::service;
use crate::storage::Storage;

/// Application state shared across handlers.
///
/// Explicitly constructed and passed in; there is no ambient global
/// connection or singleton.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub directory: DepartmentDirectory,
    pub verifier: TokenVerifier,
    /// Advisory classifier; `None` disables classification entirely.
    pub hints: Option<HintClient>,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/signup", post(post_signup))
        .route("/api/auth/me", get(get_me))
        .route(
            "/api/complaints",
            post(post_complaint).get(get_my_complaints),
        )
        .route("/api/complaints/assigned", get(get_assigned_complaints))
        .route("/api/complaints/:id/status", patch(patch_complaint_status))
        .route("/api/complaints/:id/history", get(get_complaint_history))
        .route("/health", get(health_check))
        .with_state(state)
}

/// POST /api/auth/signup - Register a user after external identity signup.
#[instrument(skip(state, request))]
pub async fn post_signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = service::signup(&state.storage, &request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/auth/me - The authenticated user's own record.
#[instrument(skip(state, headers))]
pub async fn get_me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<User>, ApiError> {
    let user = authenticate(&state.storage, &state.verifier, &headers).await?;
    Ok(Json(user))
}

/// POST /api/complaints - File a new complaint.
///
/// The complaint is routed to its owning department before it is persisted;
/// the response carries the assigned `department_id` and the initial
/// `submitted` status.
#[instrument(skip(state, headers, request))]
pub async fn post_complaint(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateComplaintRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = authenticate(&state.storage, &state.verifier, &headers).await?;

    let complaint = service::create_complaint(
        &state.storage,
        &state.directory,
        state.hints.as_ref(),
        &owner,
        &request,
    )
    .await?;

    info!(
        complaint_id = %complaint.complaint_id,
        department_id = complaint.department_id,
        "complaint accepted"
    );

    Ok((StatusCode::CREATED, Json(complaint)))
}

/// GET /api/complaints - The authenticated user's own complaints.
#[instrument(skip(state, headers))]
pub async fn get_my_complaints(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Complaint>>, ApiError> {
    let owner = authenticate(&state.storage, &state.verifier, &headers).await?;
    let complaints = service::list_for_user(&state.storage, &owner).await?;
    Ok(Json(complaints))
}

/// GET /api/complaints/assigned - Complaints assigned to the caller
/// (staff/admin only).
#[instrument(skip(state, headers))]
pub async fn get_assigned_complaints(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Complaint>>, ApiError> {
    let actor = authenticate(&state.storage, &state.verifier, &headers).await?;
    let complaints = service::list_assigned(&state.storage, &actor).await?;
    Ok(Json(complaints))
}

/// PATCH /api/complaints/{id}/status - Move a complaint through its
/// lifecycle (staff/admin only).
#[instrument(skip(state, headers, request), fields(complaint_id = %complaint_id))]
pub async fn patch_complaint_status(
    State(state): State<AppState>,
    Path(complaint_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<Complaint>, ApiError> {
    let actor = authenticate(&state.storage, &state.verifier, &headers).await?;
    let complaint =
        service::transition_complaint(&state.storage, &actor, &complaint_id, &request).await?;
    Ok(Json(complaint))
}

/// GET /api/complaints/{id}/history - Audit trail, oldest first.
#[instrument(skip(state, headers), fields(complaint_id = %complaint_id))]
pub async fn get_complaint_history(
    State(state): State<AppState>,
    Path(complaint_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let actor = authenticate(&state.storage, &state.verifier, &headers).await?;
    let history = service::complaint_history(&state.storage, &actor, &complaint_id).await?;
    Ok(Json(history))
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
