//! CivicSense - complaint intake with geographic routing and an audited
//! lifecycle.
//!
//! # Overview
//!
//! Citizens file location-tagged issue reports. Each report is routed to the
//! administrative department that owns the location (polygon containment,
//! falling back to nearest centroid, falling back to a configured default)
//! and then moves through a closed, role-gated status lifecycle. Every
//! transition is paired atomically with an append-only audit row, so a
//! complaint's history always replays to its current status.
//!
//! # Modules
//!
//! - [`model`]: Domain types (departments, complaints, users, history)
//! - [`geo`]: Point-in-polygon and nearest-centroid routing
//! - [`directory`]: Read-mostly department directory cache
//! - [`lifecycle`]: The transition table and authorization rules
//! - [`storage`]: SQLite storage layer, including the transactional
//!   transition commit
//! - [`service`]: Orchestration of create/transition/list operations
//! - [`auth`]: Bearer-token verification and role lookup
//! - [`classify`]: Optional advisory classification hints
//! - [`error`]: The request-level error taxonomy
//! - [`api`]: HTTP API handlers and router

pub mod api;
pub mod auth;
pub mod classify;
pub mod directory;
pub mod error;
pub mod geo;
pub mod lifecycle;
pub mod model;
pub mod service;
pub mod storage;
