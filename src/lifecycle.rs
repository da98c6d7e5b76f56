//! The complaint lifecycle machine.
//!
//! One closed transition table, one authorization function. Handlers and the
//! service layer never re-implement these checks; they ask
//! [`authorize_transition`] and [`plan_transition`] and act on the answer.
//!
//! Planning is pure: it looks at the current status, the requested status, and
//! whether the request carries anything else to record (remarks, a worker
//! assignment), and returns what the storage layer should do (apply the move,
//! record a same-state amendment, or nothing at all).

use crate::error::ApiError;
use crate::model::{Complaint, ComplaintStatus, Role, User};

/// Legal `(from, to)` pairs. Everything else is an invalid transition;
/// same-state requests are handled separately in [`plan_transition`].
const TRANSITION_TABLE: &[(ComplaintStatus, ComplaintStatus)] = &[
    (ComplaintStatus::Submitted, ComplaintStatus::Acknowledged),
    (ComplaintStatus::Submitted, ComplaintStatus::Rejected),
    (ComplaintStatus::Acknowledged, ComplaintStatus::InProgress),
    (ComplaintStatus::Acknowledged, ComplaintStatus::Rejected),
    (ComplaintStatus::InProgress, ComplaintStatus::Resolved),
    (ComplaintStatus::Resolved, ComplaintStatus::Closed),
];

/// What a validated transition request amounts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPlan {
    /// Move to the target status and append a history row.
    Apply,

    /// Status unchanged, but remarks or a worker assignment are recorded as
    /// a `from == to` history row and `updated_at` advances.
    Amend,

    /// Already in the target status with nothing to record. A retried
    /// request lands here: success, no duplicate history row, no
    /// `updated_at` bump.
    Noop,
}

/// Whether a role may initiate lifecycle transitions at all.
pub fn role_may_transition(role: Role) -> bool {
    matches!(role, Role::Staff | Role::Admin)
}

/// Gate a transition attempt on the actor.
///
/// Citizens may never transition a complaint, and owners cannot move their
/// own complaints regardless of role.
pub fn authorize_transition(actor: &User, complaint: &Complaint) -> Result<(), ApiError> {
    if !role_may_transition(actor.role) {
        return Err(ApiError::Forbidden);
    }
    if actor.user_id == complaint.user_id {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

/// Validate a requested move against the transition table.
///
/// `has_amendment` distinguishes a same-state update with something to
/// record (remarks or a worker assignment, non-terminal) from an idempotent
/// retry (same state, nothing new to say). Terminal states never gain
/// history rows, so a bare retry into one still succeeds as a no-op.
pub fn plan_transition(
    current: ComplaintStatus,
    target: ComplaintStatus,
    has_amendment: bool,
) -> Result<TransitionPlan, ApiError> {
    if current == target {
        if has_amendment && !current.is_terminal() {
            return Ok(TransitionPlan::Amend);
        }
        return Ok(TransitionPlan::Noop);
    }

    if TRANSITION_TABLE.contains(&(current, target)) {
        Ok(TransitionPlan::Apply)
    } else {
        Err(ApiError::InvalidTransition {
            from: current,
            to: target,
        })
    }
}
