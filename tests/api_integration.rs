//! Integration tests for the CivicSense API.
//!
//! These exercise the full request/response cycle through the HTTP router:
//! signup, authentication, complaint creation with geographic routing, the
//! lifecycle transitions, and the audit trail.

use std::collections::HashMap;

use axum_test::TestServer;
use serde_json::json;

use civicsense::api::{AppState, router};
use civicsense::auth::TokenVerifier;
use civicsense::directory::DepartmentDirectory;
use civicsense::model::Department;
use civicsense::storage::Storage;

const CITIZEN_TOKEN: &str = "citizen-token";
const OTHER_CITIZEN_TOKEN: &str = "other-citizen-token";
const STAFF_TOKEN: &str = "staff-token";

/// Department 1 covers central Bengaluru with a polygon; department 2 only
/// has a centroid roughly 50 km north.
async fn seed_departments(storage: &Storage) {
    storage
        .insert_department(&Department {
            department_id: 1,
            name: "Roads and Infrastructure".to_string(),
            jurisdiction_polygon: Some(vec![
                (12.8, 77.4),
                (12.8, 77.8),
                (13.2, 77.8),
                (13.2, 77.4),
            ]),
            centroid_lat: None,
            centroid_lng: None,
            is_default: true,
        })
        .await
        .unwrap();
    storage
        .insert_department(&Department {
            department_id: 2,
            name: "Sanitation".to_string(),
            jurisdiction_polygon: None,
            centroid_lat: Some(13.42),
            centroid_lng: Some(77.59),
            is_default: false,
        })
        .await
        .unwrap();
}

async fn create_test_server() -> TestServer {
    let storage = Storage::new("sqlite::memory:").await.unwrap();
    seed_departments(&storage).await;

    let directory = DepartmentDirectory::new();
    directory.load(&storage).await.unwrap();

    let verifier = TokenVerifier::static_tokens(HashMap::from([
        (CITIZEN_TOKEN.to_string(), "uid-citizen".to_string()),
        (OTHER_CITIZEN_TOKEN.to_string(), "uid-other".to_string()),
        (STAFF_TOKEN.to_string(), "uid-staff".to_string()),
    ]));

    let state = AppState {
        storage,
        directory,
        verifier,
        hints: None, // Classifier not needed for core API tests
    };

    TestServer::new(router(state)).unwrap()
}

/// Register the standard cast: two citizens and one staff member.
async fn signup_users(server: &TestServer) {
    for (subject, name, role) in [
        ("uid-citizen", "Asha", "citizen"),
        ("uid-other", "Ravi", "citizen"),
        ("uid-staff", "Meera", "staff"),
    ] {
        server
            .post("/api/auth/signup")
            .json(&json!({
                "subject": subject,
                "name": name,
                "email": format!("{subject}@example.com"),
                "role": role
            }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);
    }
}

fn complaint_body() -> serde_json::Value {
    json!({
        "title": "Pothole on 5th Main",
        "description": "Deep pothole near the bus stop",
        "issue_type": "infrastructure",
        "location_lat": 12.9716,
        "location_lng": 77.5946
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = create_test_server().await;

    server.get("/health").await.assert_status_ok();
}

#[tokio::test]
async fn test_signup_and_me() {
    let server = create_test_server().await;
    signup_users(&server).await;

    let response = server
        .get("/api/auth/me")
        .authorization_bearer(CITIZEN_TOKEN)
        .await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["subject"], "uid-citizen");
    assert_eq!(body["role"], "citizen");
}

#[tokio::test]
async fn test_signup_duplicate_rejected() {
    let server = create_test_server().await;
    signup_users(&server).await;

    let response = server
        .post("/api/auth/signup")
        .json(&json!({
            "subject": "uid-citizen",
            "name": "Asha Again",
            "email": "asha2@example.com"
        }))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_requests_without_token_are_unauthenticated() {
    let server = create_test_server().await;
    signup_users(&server).await;

    server
        .post("/api/complaints")
        .json(&complaint_body())
        .await
        .assert_status(axum::http::StatusCode::UNAUTHORIZED);

    server
        .get("/api/complaints")
        .authorization_bearer("bogus-token")
        .await
        .assert_status(axum::http::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_complaint_routes_to_containing_department() {
    let server = create_test_server().await;
    signup_users(&server).await;

    let response = server
        .post("/api/complaints")
        .authorization_bearer(CITIZEN_TOKEN)
        .json(&complaint_body())
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);

    let body: serde_json::Value = response.json();
    assert_eq!(body["department_id"], 1);
    assert_eq!(body["status"], "submitted");
    assert_eq!(body["priority"], "medium");
    assert_eq!(body["category"], "other");
    assert!(body["complaint_id"].as_str().unwrap().len() > 10);
}

#[tokio::test]
async fn test_create_complaint_outside_polygon_uses_nearest_centroid() {
    let server = create_test_server().await;
    signup_users(&server).await;

    let response = server
        .post("/api/complaints")
        .authorization_bearer(CITIZEN_TOKEN)
        .json(&json!({
            "title": "Overflowing bin",
            "description": "Garbage bin not collected for days",
            "issue_type": "sanitation",
            "location_lat": 13.40,
            "location_lng": 77.60
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);

    let body: serde_json::Value = response.json();
    assert_eq!(body["department_id"], 2);
}

#[tokio::test]
async fn test_create_complaint_invalid_location() {
    let server = create_test_server().await;
    signup_users(&server).await;

    let mut body = complaint_body();
    body["location_lat"] = json!(91.0);

    let response = server
        .post("/api/complaints")
        .authorization_bearer(CITIZEN_TOKEN)
        .json(&body)
        .await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);

    let error: serde_json::Value = response.json();
    assert_eq!(error["error"], "invalid_location");
}

#[tokio::test]
async fn test_create_complaint_missing_fields() {
    let server = create_test_server().await;
    signup_users(&server).await;

    let response = server
        .post("/api/complaints")
        .authorization_bearer(CITIZEN_TOKEN)
        .json(&json!({
            "title": "  ",
            "description": "something",
            "issue_type": "infrastructure",
            "location_lat": 12.9,
            "location_lng": 77.6
        }))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);

    let error: serde_json::Value = response.json();
    assert_eq!(error["error"], "validation_error");
}

#[tokio::test]
async fn test_own_complaint_listing() {
    let server = create_test_server().await;
    signup_users(&server).await;

    server
        .post("/api/complaints")
        .authorization_bearer(CITIZEN_TOKEN)
        .json(&complaint_body())
        .await
        .assert_status(axum::http::StatusCode::CREATED);

    let mine: serde_json::Value = server
        .get("/api/complaints")
        .authorization_bearer(CITIZEN_TOKEN)
        .await
        .json();
    assert_eq!(mine.as_array().unwrap().len(), 1);

    // Another citizen sees nothing.
    let theirs: serde_json::Value = server
        .get("/api/complaints")
        .authorization_bearer(OTHER_CITIZEN_TOKEN)
        .await
        .json();
    assert!(theirs.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_assigned_listing_is_staff_only() {
    let server = create_test_server().await;
    signup_users(&server).await;

    server
        .get("/api/complaints/assigned")
        .authorization_bearer(CITIZEN_TOKEN)
        .await
        .assert_status(axum::http::StatusCode::FORBIDDEN);

    server
        .get("/api/complaints/assigned")
        .authorization_bearer(STAFF_TOKEN)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_citizen_cannot_transition() {
    let server = create_test_server().await;
    signup_users(&server).await;

    let created: serde_json::Value = server
        .post("/api/complaints")
        .authorization_bearer(CITIZEN_TOKEN)
        .json(&complaint_body())
        .await
        .json();
    let id = created["complaint_id"].as_str().unwrap();

    for target in ["acknowledged", "in_progress", "resolved", "closed", "rejected"] {
        server
            .patch(&format!("/api/complaints/{id}/status"))
            .authorization_bearer(OTHER_CITIZEN_TOKEN)
            .json(&json!({ "status": target }))
            .await
            .assert_status(axum::http::StatusCode::FORBIDDEN);
    }
}

#[tokio::test]
async fn test_skip_ahead_transition_rejected() {
    let server = create_test_server().await;
    signup_users(&server).await;

    let created: serde_json::Value = server
        .post("/api/complaints")
        .authorization_bearer(CITIZEN_TOKEN)
        .json(&complaint_body())
        .await
        .json();
    let id = created["complaint_id"].as_str().unwrap();

    let response = server
        .patch(&format!("/api/complaints/{id}/status"))
        .authorization_bearer(STAFF_TOKEN)
        .json(&json!({ "status": "in_progress" }))
        .await;
    response.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);

    let error: serde_json::Value = response.json();
    assert_eq!(error["error"], "invalid_transition");
}

#[tokio::test]
async fn test_transition_unknown_complaint_is_not_found() {
    let server = create_test_server().await;
    signup_users(&server).await;

    server
        .patch("/api/complaints/no-such-id/status")
        .authorization_bearer(STAFF_TOKEN)
        .json(&json!({ "status": "acknowledged" }))
        .await
        .assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_repeated_transition_is_idempotent() {
    let server = create_test_server().await;
    signup_users(&server).await;

    let created: serde_json::Value = server
        .post("/api/complaints")
        .authorization_bearer(CITIZEN_TOKEN)
        .json(&complaint_body())
        .await
        .json();
    let id = created["complaint_id"].as_str().unwrap();

    for _ in 0..2 {
        server
            .patch(&format!("/api/complaints/{id}/status"))
            .authorization_bearer(STAFF_TOKEN)
            .json(&json!({ "status": "acknowledged" }))
            .await
            .assert_status_ok();
    }

    let history: serde_json::Value = server
        .get(&format!("/api/complaints/{id}/history"))
        .authorization_bearer(STAFF_TOKEN)
        .await
        .json();
    assert_eq!(history.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_full_lifecycle_with_audit_trail() {
    let server = create_test_server().await;
    signup_users(&server).await;

    // Citizen files a complaint inside department 1's jurisdiction.
    let created: serde_json::Value = server
        .post("/api/complaints")
        .authorization_bearer(CITIZEN_TOKEN)
        .json(&complaint_body())
        .await
        .json();
    let id = created["complaint_id"].as_str().unwrap();
    assert_eq!(created["department_id"], 1);
    assert_eq!(created["status"], "submitted");

    // Staff acknowledges with remarks.
    let acked: serde_json::Value = server
        .patch(&format!("/api/complaints/{id}/status"))
        .authorization_bearer(STAFF_TOKEN)
        .json(&json!({
            "status": "acknowledged",
            "remarks": "field visit scheduled"
        }))
        .await
        .json();
    assert_eq!(acked["status"], "acknowledged");

    let created_at: chrono::DateTime<chrono::Utc> =
        serde_json::from_value(created["updated_at"].clone()).unwrap();
    let acked_at: chrono::DateTime<chrono::Utc> =
        serde_json::from_value(acked["updated_at"].clone()).unwrap();
    assert!(acked_at > created_at, "updated_at must advance");

    // Walk it to closed.
    for target in ["in_progress", "resolved", "closed"] {
        let response = server
            .patch(&format!("/api/complaints/{id}/status"))
            .authorization_bearer(STAFF_TOKEN)
            .json(&json!({ "status": target }))
            .await;
        response.assert_status_ok();
    }

    // The owner can read the audit trail; it replays to the current status.
    let history: serde_json::Value = server
        .get(&format!("/api/complaints/{id}/history"))
        .authorization_bearer(CITIZEN_TOKEN)
        .await
        .json();
    let entries = history.as_array().unwrap();
    assert_eq!(entries.len(), 4);
    assert_eq!(entries[0]["from_status"], "submitted");
    assert_eq!(entries[0]["to_status"], "acknowledged");
    assert_eq!(entries[0]["remarks"], "field visit scheduled");
    assert_eq!(entries[3]["to_status"], "closed");

    // A terminal complaint accepts no further moves.
    server
        .patch(&format!("/api/complaints/{id}/status"))
        .authorization_bearer(STAFF_TOKEN)
        .json(&json!({ "status": "in_progress" }))
        .await
        .assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_transition_can_assign_worker() {
    let server = create_test_server().await;
    signup_users(&server).await;

    let created: serde_json::Value = server
        .post("/api/complaints")
        .authorization_bearer(CITIZEN_TOKEN)
        .json(&complaint_body())
        .await
        .json();
    let id = created["complaint_id"].as_str().unwrap();

    let staff: serde_json::Value = server
        .get("/api/auth/me")
        .authorization_bearer(STAFF_TOKEN)
        .await
        .json();
    let staff_id = staff["user_id"].as_i64().unwrap();

    let updated: serde_json::Value = server
        .patch(&format!("/api/complaints/{id}/status"))
        .authorization_bearer(STAFF_TOKEN)
        .json(&json!({
            "status": "acknowledged",
            "assigned_to": staff_id
        }))
        .await
        .json();
    assert_eq!(updated["assigned_worker_id"], staff_id);

    // Now it shows up in the staff member's assigned listing.
    let assigned: serde_json::Value = server
        .get("/api/complaints/assigned")
        .authorization_bearer(STAFF_TOKEN)
        .await
        .json();
    assert_eq!(assigned.as_array().unwrap().len(), 1);
    assert_eq!(assigned[0]["complaint_id"], id);
}

#[tokio::test]
async fn test_history_hidden_from_unrelated_citizens() {
    let server = create_test_server().await;
    signup_users(&server).await;

    let created: serde_json::Value = server
        .post("/api/complaints")
        .authorization_bearer(CITIZEN_TOKEN)
        .json(&complaint_body())
        .await
        .json();
    let id = created["complaint_id"].as_str().unwrap();

    server
        .get(&format!("/api/complaints/{id}/history"))
        .authorization_bearer(OTHER_CITIZEN_TOKEN)
        .await
        .assert_status(axum::http::StatusCode::FORBIDDEN);
}
