//! Health, login and integrity endpoints.

mod common;

use admin_service::integrity::TrackedTable;
use admin_service::middleware::claims;
use admin_service::models::{AuditEventType, Customer};
use axum::http::{Method, StatusCode};
use chrono::Utc;
use common::{TestApp, TEST_PASSWORD};
use serde_json::json;

fn customer(id: i64, email: &str, blocked: bool) -> Customer {
    Customer {
        id,
        email: email.to_string(),
        full_name: "Grace Hopper".to_string(),
        phone: Some("+1 555 0100".to_string()),
        blocked,
        created_utc: Utc::now(),
        dvh: None,
    }
}

#[tokio::test]
async fn health_and_readiness_report_ok() {
    let app = TestApp::spawn();

    let (status, body) = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "admin-service");

    let (status, _) = app.request(Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn metrics_are_exposed_as_text() {
    let app = TestApp::spawn();
    admin_service::services::init_metrics();
    admin_service::services::metrics::record_violation("modified");

    let (status, body) = app.request(Method::GET, "/metrics", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body
        .as_str()
        .unwrap_or_default()
        .contains("admin_integrity_violations_total"));
}

#[tokio::test]
async fn login_rejects_bad_credentials_and_blocked_users() {
    let app = TestApp::spawn();
    let id = app.users.add_user("ops", TEST_PASSWORD).unwrap();

    let (status, body) = app
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "username": "ops", "password": "wrong" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");

    let (status, _) = app
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "username": "", "password": "x" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    app.users.set_blocked(id, true);
    let (status, _) = app
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "username": "ops", "password": TEST_PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        app.audit.events_of(AuditEventType::UserLoginFailed).len(),
        2
    );
}

#[tokio::test]
async fn login_without_grants_issues_an_empty_role_set() {
    let app = TestApp::spawn();
    app.users.add_user("viewer", TEST_PASSWORD).unwrap();

    let (status, body) = app
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "username": "viewer", "password": TEST_PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 900);
    assert_eq!(body["roles"], json!([]));
}

#[tokio::test]
async fn protected_routes_reject_missing_or_forged_tokens() {
    let app = TestApp::spawn();

    let (status, _) = app
        .request(Method::GET, "/integrity/verify", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .request(Method::GET, "/integrity/verify", Some("not.a.token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid or expired token");
}

#[tokio::test]
async fn recalculate_then_verify_over_http() {
    let app = TestApp::spawn();
    let token = app.admin().await;
    app.integrity_store
        .upsert_record(TrackedTable::Customers, &customer(1, "grace@example.com", false));

    let (status, body) = app
        .request(Method::GET, "/integrity/verify", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);

    let (status, body) = app
        .request(Method::POST, "/integrity/recalculate", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "accepted");
    app.wait_for_recalculation().await;

    let (status, body) = app
        .request(Method::GET, "/integrity/verify", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["violations"], json!([]));
    assert_eq!(body["errors"], json!([]));

    app.integrity_store
        .upsert_record(TrackedTable::Customers, &customer(1, "grace@example.com", true));
    let (_, body) = app
        .request(Method::GET, "/integrity/verify", Some(&token), None)
        .await;
    assert_eq!(body["valid"], false);
    assert!(body["violations"]
        .as_array()
        .unwrap()
        .iter()
        .any(|v| v["table"] == "customers"
            && v["record_or_column"] == "1"
            && v["kind"] == "modified"));

    assert_eq!(
        app.audit.events_of(AuditEventType::IntegrityVerified).len(),
        3
    );
}

#[tokio::test]
async fn integrity_endpoints_check_their_own_claims() {
    let app = TestApp::spawn();
    let token = app
        .operator("auditor", &[claims::INTEGRITY_VERIFY])
        .await;

    let (status, _) = app
        .request(Method::GET, "/integrity/verify", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .request(Method::POST, "/integrity/recalculate", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains(claims::INTEGRITY_RECALCULATE));
    assert!(!app.state.integrity.is_recalculating());
}
