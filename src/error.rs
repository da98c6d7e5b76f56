//! Request-level error taxonomy for CivicSense.
//!
//! Every failure a handler can surface is one of the variants below, mapped to
//! a stable status code and a JSON body of the form
//! `{"error": "<kind>", "message": "..."}`. Validation and authorization
//! errors are raised before any mutation, so they never leave partial state;
//! `Conflict` is the only variant a caller is expected to retry.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::model::ComplaintStatus;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, malformed, or unverifiable credential.
    #[error("missing or invalid credential")]
    Unauthenticated,

    /// Authenticated, but the actor's role does not permit the operation.
    #[error("insufficient role for this operation")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("latitude must be within [-90, 90] and longitude within [-180, 180]")]
    InvalidLocation,

    /// The requested move is not in the transition table.
    #[error("cannot move a complaint from '{from}' to '{to}'")]
    InvalidTransition {
        from: ComplaintStatus,
        to: ComplaintStatus,
    },

    /// A concurrent writer won the race on this complaint. Retryable.
    #[error("complaint was modified concurrently; retry the request")]
    Conflict,

    /// The department directory could not produce a routing decision.
    #[error("failed to assign a department")]
    DepartmentAssignmentFailed(#[source] anyhow::Error),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Stable machine-readable kind, used as the `error` field of the body.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::Forbidden => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Validation(_) => "validation_error",
            ApiError::InvalidLocation => "invalid_location",
            ApiError::InvalidTransition { .. } => "invalid_transition",
            ApiError::Conflict => "conflict",
            ApiError::DepartmentAssignmentFailed(_) => "department_assignment_failed",
            ApiError::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) | ApiError::InvalidLocation => StatusCode::BAD_REQUEST,
            ApiError::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::DepartmentAssignmentFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Server-side faults carry their source chain into the log, never
        // into the response body.
        if status.is_server_error() {
            match &self {
                ApiError::DepartmentAssignmentFailed(source) | ApiError::Internal(source) => {
                    warn!(error = %self, source = %source, "request failed");
                }
                _ => warn!(error = %self, "request failed"),
            }
        }

        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}
