//! Complaint service orchestration.
//!
//! Free functions over the storage handle and collaborators, one per API
//! operation. Creation validates, consults the advisory classifier, routes
//! through the department directory, and persists; transitions authorize,
//! plan against the lifecycle table, and commit status plus audit row
//! atomically, retrying once from a fresh read when a concurrent writer wins
//! the race.

use std::future::Future;

use chrono::{DateTime, TimeZone, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::classify::{self, ClassificationHint, HintClient};
use crate::directory::DepartmentDirectory;
use crate::error::ApiError;
use crate::geo;
use crate::lifecycle::{self, TransitionPlan};
use crate::model::{
    Complaint, ComplaintStatus, CreateComplaintRequest, HistoryEntry, SignupRequest,
    StatusUpdateRequest, User,
};
use crate::storage::{self, Storage};

/// One fresh-read retry after a lost race, then the conflict goes to the
/// caller.
const TRANSITION_ATTEMPTS: u32 = 2;

/// Register a new user after external signup.
pub async fn signup(storage: &Storage, req: &SignupRequest) -> Result<User, ApiError> {
    for (field, value) in [
        ("subject", &req.subject),
        ("name", &req.name),
        ("email", &req.email),
    ] {
        if value.trim().is_empty() {
            return Err(ApiError::Validation(format!("{field} is required")));
        }
    }

    // The UNIQUE constraints on subject and email are the authority here;
    // an exists-then-insert check would race with concurrent signups.
    let user = match storage
        .insert_user(&req.subject, &req.name, &req.email, req.role, Utc::now())
        .await
    {
        Ok(user) => user,
        Err(err) if storage::is_unique_violation(&err) => {
            return Err(ApiError::Validation("user already exists".to_string()));
        }
        Err(err) => return Err(err.into()),
    };

    info!(user_id = user.user_id, role = %user.role, "user registered");
    Ok(user)
}

/// Create a complaint: validate, classify (advisory), route, persist.
pub async fn create_complaint(
    storage: &Storage,
    directory: &DepartmentDirectory,
    hints: Option<&HintClient>,
    owner: &User,
    req: &CreateComplaintRequest,
) -> Result<Complaint, ApiError> {
    validate_create(req)?;

    let hint = resolve_hint(hints, req).await;
    let priority = req.priority.or(hint.priority).unwrap_or_default();
    let category = req
        .category
        .clone()
        .filter(|c| !c.trim().is_empty())
        .or(hint.category)
        .unwrap_or_else(|| classify::DEFAULT_CATEGORY.to_string());

    let snapshot = directory.snapshot().ok_or_else(|| {
        ApiError::DepartmentAssignmentFailed(anyhow::anyhow!(
            "department directory has not been loaded"
        ))
    })?;
    let department_id = geo::resolve_department(
        &snapshot.departments,
        snapshot.default_department_id,
        req.location_lat,
        req.location_lng,
    );

    let now = Utc::now();
    let complaint = Complaint {
        complaint_id: Uuid::new_v4().to_string(),
        user_id: owner.user_id,
        department_id,
        assigned_worker_id: None,
        title: req.title.clone(),
        description: req.description.clone(),
        issue_type: req.issue_type.clone(),
        category,
        image_url: req.image_url.clone(),
        location_lat: req.location_lat,
        location_lng: req.location_lng,
        priority,
        status: ComplaintStatus::Submitted,
        created_at: now,
        updated_at: now,
    };

    storage.insert_complaint(&complaint).await?;

    info!(
        complaint_id = %complaint.complaint_id,
        department_id,
        priority = complaint.priority.as_str(),
        "complaint created"
    );

    Ok(complaint)
}

/// Move a complaint through its lifecycle.
///
/// Checks run in contract order: existence, authorization, transition
/// validity. A request that matches the current status is an idempotent
/// success; see [`lifecycle::plan_transition`].
pub async fn transition_complaint(
    storage: &Storage,
    actor: &User,
    complaint_id: &str,
    req: &StatusUpdateRequest,
) -> Result<Complaint, ApiError> {
    transition_with(storage, actor, complaint_id, req, |write| async move {
        storage
            .apply_transition(
                write.expected_updated_at,
                write.new_status,
                write.new_updated_at,
                write.assign_worker,
                &write.entry,
            )
            .await
    })
    .await
}

/// One prepared write against the optimistic guard.
struct TransitionWrite {
    expected_updated_at: DateTime<Utc>,
    new_status: ComplaintStatus,
    new_updated_at: DateTime<Utc>,
    assign_worker: Option<i64>,
    entry: HistoryEntry,
}

/// The transition loop with the committing step factored out, so the
/// lost-race and exhausted-retries paths are reachable without a live
/// concurrent writer. `apply` returns whether the guarded write landed.
async fn transition_with<F, Fut>(
    storage: &Storage,
    actor: &User,
    complaint_id: &str,
    req: &StatusUpdateRequest,
    mut apply: F,
) -> Result<Complaint, ApiError>
where
    F: FnMut(TransitionWrite) -> Fut,
    Fut: Future<Output = anyhow::Result<bool>>,
{
    let has_amendment = req.remarks.as_deref().is_some_and(|r| !r.trim().is_empty())
        || req.assigned_to.is_some();

    for _ in 0..TRANSITION_ATTEMPTS {
        let complaint = storage
            .select_complaint(complaint_id)
            .await?
            .ok_or(ApiError::NotFound("complaint"))?;

        lifecycle::authorize_transition(actor, &complaint)?;
        let plan = lifecycle::plan_transition(complaint.status, req.status, has_amendment)?;

        if plan == TransitionPlan::Noop {
            return Ok(complaint);
        }

        let new_updated_at = next_updated_at(complaint.updated_at);
        let entry = HistoryEntry {
            complaint_id: complaint.complaint_id.clone(),
            from_status: complaint.status,
            to_status: req.status,
            remarks: req.remarks.clone(),
            changed_by: actor.user_id,
            created_at: new_updated_at,
        };

        let applied = apply(TransitionWrite {
            expected_updated_at: complaint.updated_at,
            new_status: req.status,
            new_updated_at,
            assign_worker: req.assigned_to,
            entry,
        })
        .await?;

        if applied {
            info!(
                complaint_id = %complaint.complaint_id,
                from = %complaint.status,
                to = %req.status,
                changed_by = actor.user_id,
                "complaint transitioned"
            );

            let mut updated = complaint;
            updated.status = req.status;
            updated.updated_at = new_updated_at;
            if req.assigned_to.is_some() {
                updated.assigned_worker_id = req.assigned_to;
            }
            return Ok(updated);
        }

        warn!(complaint_id, "lost a concurrent transition race; retrying from a fresh read");
    }

    Err(ApiError::Conflict)
}

/// A user's own complaints.
pub async fn list_for_user(storage: &Storage, owner: &User) -> Result<Vec<Complaint>, ApiError> {
    Ok(storage.select_complaints_by_owner(owner.user_id).await?)
}

/// Complaints assigned to the calling staff member.
pub async fn list_assigned(storage: &Storage, actor: &User) -> Result<Vec<Complaint>, ApiError> {
    if !lifecycle::role_may_transition(actor.role) {
        return Err(ApiError::Forbidden);
    }
    Ok(storage.select_complaints_by_assignee(actor.user_id).await?)
}

/// Audit trail for a complaint, readable by its owner and by staff.
pub async fn complaint_history(
    storage: &Storage,
    actor: &User,
    complaint_id: &str,
) -> Result<Vec<HistoryEntry>, ApiError> {
    let complaint = storage
        .select_complaint(complaint_id)
        .await?
        .ok_or(ApiError::NotFound("complaint"))?;

    if complaint.user_id != actor.user_id && !lifecycle::role_may_transition(actor.role) {
        return Err(ApiError::Forbidden);
    }

    Ok(storage.list_history(complaint_id).await?)
}

fn validate_create(req: &CreateComplaintRequest) -> Result<(), ApiError> {
    for (field, value) in [
        ("title", &req.title),
        ("description", &req.description),
        ("issue_type", &req.issue_type),
    ] {
        if value.trim().is_empty() {
            return Err(ApiError::Validation(format!("{field} is required")));
        }
    }

    if !geo::valid_coordinates(req.location_lat, req.location_lng) {
        return Err(ApiError::InvalidLocation);
    }

    Ok(())
}

/// Consult the classifier when the reporter left priority or category blank.
/// Provider failures are logged and swallowed; creation proceeds on the
/// fixed fallback.
async fn resolve_hint(
    hints: Option<&HintClient>,
    req: &CreateComplaintRequest,
) -> ClassificationHint {
    let wants_hint = req.priority.is_none() || req.category.is_none();
    if !wants_hint {
        return ClassificationHint::default();
    }

    match hints {
        Some(client) => match client.suggest(&req.description).await {
            Ok(hint) => hint,
            Err(err) => {
                warn!(error = %err, "classifier unavailable; using fixed defaults");
                classify::fallback_hint()
            }
        },
        None => classify::fallback_hint(),
    }
}

/// Next value of the optimistic-concurrency token: wall clock, but always
/// strictly after the previous value even within one millisecond.
fn next_updated_at(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    let ms = now.timestamp_millis().max(previous.timestamp_millis() + 1);
    Utc.timestamp_millis_opt(ms).single().unwrap_or(now)
}
