//! Data models for CivicSense.
//!
//! The domain revolves around three persisted entities:
//!
//! - [`Department`]: an administrative body with a geographic jurisdiction
//! - [`Complaint`]: a citizen-filed issue report routed to one department
//! - [`HistoryEntry`]: one audit row per lifecycle transition
//!
//! plus [`User`], the externally-identified actor referenced by complaints and
//! history rows. Enums carry their wire form via serde and their storage form
//! via `as_str`/`FromStr`, so the database never sees an unvalidated string.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error for parsing an enum out of its stored string form.
#[derive(Debug, Error)]
#[error("unknown value '{0}'")]
pub struct UnknownVariant(pub String);

/// Authorization role of an actor.
///
/// Roles are a closed set; ad-hoc role strings are rejected at the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May file complaints and read their own; may never transition one.
    Citizen,
    /// Department staff; may transition complaints and view assignments.
    Staff,
    /// Administrator; same transition powers as staff.
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Citizen => "citizen",
            Role::Staff => "staff",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "citizen" => Ok(Role::Citizen),
            "staff" => Ok(Role::Staff),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complaint urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl FromStr for Priority {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Lifecycle state of a complaint.
///
/// The normal path is `submitted → acknowledged → in_progress → resolved →
/// closed`; `rejected` is an alternative terminal state reachable only early in
/// the lifecycle. Which moves are legal is decided by the transition table in
/// [`crate::lifecycle`], never ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    Submitted,
    Acknowledged,
    InProgress,
    Resolved,
    Closed,
    Rejected,
}

impl ComplaintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintStatus::Submitted => "submitted",
            ComplaintStatus::Acknowledged => "acknowledged",
            ComplaintStatus::InProgress => "in_progress",
            ComplaintStatus::Resolved => "resolved",
            ComplaintStatus::Closed => "closed",
            ComplaintStatus::Rejected => "rejected",
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ComplaintStatus::Closed | ComplaintStatus::Rejected)
    }
}

impl FromStr for ComplaintStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(ComplaintStatus::Submitted),
            "acknowledged" => Ok(ComplaintStatus::Acknowledged),
            "in_progress" => Ok(ComplaintStatus::InProgress),
            "resolved" => Ok(ComplaintStatus::Resolved),
            "closed" => Ok(ComplaintStatus::Closed),
            "rejected" => Ok(ComplaintStatus::Rejected),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl fmt::Display for ComplaintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An administrative department with a geographic jurisdiction.
///
/// Departments are seeded and administered externally; this service only reads
/// them. Every department carries either a jurisdiction polygon or a centroid
/// coordinate so the geo-resolver always has something to work with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    pub department_id: i64,

    pub name: String,

    /// Closed boundary as an ordered `(lat, lng)` vertex sequence.
    /// The last vertex is implicitly connected back to the first.
    #[serde(default)]
    pub jurisdiction_polygon: Option<Vec<(f64, f64)>>,

    /// Centroid used by the nearest-department fallback when no polygon
    /// contains a point.
    #[serde(default)]
    pub centroid_lat: Option<f64>,

    #[serde(default)]
    pub centroid_lng: Option<f64>,

    /// Explicitly designated default department. At most one department
    /// should carry this flag; without it the lowest id acts as the default.
    #[serde(default)]
    pub is_default: bool,
}

/// A registered actor, keyed by the subject id minted by the external
/// identity provider.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub user_id: i64,

    /// Stable subject identifier from the identity provider.
    pub subject: String,

    pub name: String,

    pub email: String,

    pub role: Role,

    pub is_active: bool,

    pub created_at: DateTime<Utc>,
}

/// Request body for POST /api/auth/signup.
#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub subject: String,

    pub name: String,

    pub email: String,

    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Citizen
}

/// A citizen-filed issue report.
#[derive(Debug, Clone, Serialize)]
pub struct Complaint {
    /// Opaque unique identifier, minted at creation.
    pub complaint_id: String,

    /// Owner of the complaint.
    pub user_id: i64,

    /// Owning department, assigned exactly once at creation by the
    /// geo-resolver and immutable thereafter.
    pub department_id: i64,

    /// Staff member working the complaint, if one has been assigned.
    pub assigned_worker_id: Option<i64>,

    pub title: String,

    pub description: String,

    pub issue_type: String,

    /// Coarse classification. Supplied by the reporter or, failing that,
    /// by the advisory classifier; defaults to "other".
    pub category: String,

    pub image_url: Option<String>,

    pub location_lat: f64,

    pub location_lng: f64,

    pub priority: Priority,

    pub status: ComplaintStatus,

    pub created_at: DateTime<Utc>,

    /// Advances strictly on every mutation; doubles as the
    /// optimistic-concurrency token for transitions.
    pub updated_at: DateTime<Utc>,
}

/// Request body for POST /api/complaints.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateComplaintRequest {
    pub title: String,

    pub description: String,

    pub issue_type: String,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub image_url: Option<String>,

    pub location_lat: f64,

    pub location_lng: f64,

    /// Optional; when omitted, the advisory classifier's suggestion is used,
    /// and failing that, `medium`.
    #[serde(default)]
    pub priority: Option<Priority>,
}

/// Request body for PATCH /api/complaints/{id}/status.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: ComplaintStatus,

    #[serde(default)]
    pub remarks: Option<String>,

    /// Optionally (re)assign a staff member in the same transaction.
    #[serde(default)]
    pub assigned_to: Option<i64>,
}

/// One audit row per lifecycle transition, append-only.
///
/// Replaying the `to_status` column for a complaint, oldest first, from the
/// initial `submitted` state reproduces its current status.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub complaint_id: String,

    pub from_status: ComplaintStatus,

    pub to_status: ComplaintStatus,

    pub remarks: Option<String>,

    /// User id of the actor who performed the transition.
    pub changed_by: i64,

    pub created_at: DateTime<Utc>,
}
