//! Test harness for admin-service integration tests.
//!
//! Builds the full router over in-memory collaborators, so no database is needed.

#![allow(dead_code)]

use admin_service::{
    build_router,
    config::JwtConfig,
    integrity::{InMemoryIntegrityStore, IntegrityEngine},
    middleware::claims,
    models::PermissionNode,
    permissions::{InMemoryPermissionStore, PermissionService},
    services::{AuthService, InMemoryAuditSink, InMemoryUserDirectory, JwtService},
    AppState,
};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

pub const TEST_JWT_SECRET: &str = "integration-test-secret-at-least-32-bytes";
pub const TEST_PASSWORD: &str = "correct horse battery staple";

/// Every claim the admin endpoints check.
pub const ALL_CLAIMS: [&str; 3] = [
    claims::INTEGRITY_RECALCULATE,
    claims::INTEGRITY_VERIFY,
    claims::PERMISSIONS_MANAGE,
];

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub integrity_store: Arc<InMemoryIntegrityStore>,
    pub permission_store: Arc<InMemoryPermissionStore>,
    pub audit: Arc<InMemoryAuditSink>,
    pub users: Arc<InMemoryUserDirectory>,
}

impl TestApp {
    pub fn spawn() -> Self {
        let integrity_store = Arc::new(InMemoryIntegrityStore::new());
        let permission_store = Arc::new(InMemoryPermissionStore::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let users = Arc::new(InMemoryUserDirectory::new());

        let jwt = JwtService::new(&JwtConfig {
            secret: TEST_JWT_SECRET.to_string(),
            issuer: "admin-service".to_string(),
            session_ttl_minutes: 15,
        });
        let integrity = IntegrityEngine::new(integrity_store.clone(), audit.clone());
        let permissions = PermissionService::new(permission_store.clone(), audit.clone());
        let auth = AuthService::new(
            users.clone(),
            permissions.clone(),
            jwt.clone(),
            audit.clone(),
        );

        let state = AppState {
            integrity,
            permissions,
            auth,
            jwt,
            audit: audit.clone(),
        };

        Self {
            router: build_router(state.clone()),
            state,
            integrity_store,
            permission_store,
            audit,
            users,
        }
    }

    /// Create a user holding a composite of the given leaf claims and log them in.
    /// Returns the bearer token.
    pub async fn operator(&self, username: &str, granted: &[&str]) -> String {
        let user_id = self
            .users
            .add_user(username, TEST_PASSWORD)
            .expect("Failed to add user");

        if !granted.is_empty() {
            let role = PermissionNode::composite(
                0,
                format!("{}-role", username),
                granted.iter().map(|c| PermissionNode::leaf(0, *c)).collect(),
            );
            let role = self
                .state
                .permissions
                .create(role, "bootstrap")
                .await
                .expect("Failed to create role");
            self.state
                .permissions
                .assign_to_user(user_id, vec![role], "bootstrap")
                .await
                .expect("Failed to assign role");
        }

        let (status, body) = self
            .request(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "username": username, "password": TEST_PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["access_token"]
            .as_str()
            .expect("Missing access_token")
            .to_string()
    }

    /// An operator holding every admin claim.
    pub async fn admin(&self) -> String {
        self.operator("admin", &ALL_CLAIMS).await
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, json)
    }

    /// Wait for a background recalculation to finish.
    pub async fn wait_for_recalculation(&self) {
        for _ in 0..200 {
            if !self.state.integrity.is_recalculating() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("recalculation did not finish");
    }
}
