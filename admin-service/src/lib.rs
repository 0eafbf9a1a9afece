pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod integrity;
pub mod middleware;
pub mod models;
pub mod permissions;
pub mod services;
pub mod startup;
pub mod utils;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::integrity::IntegrityEngine;
use crate::permissions::PermissionService;
use crate::services::{AuditSink, AuthService, JwtService};

/// Shared application state. Every collaborator is injected at construction.
#[derive(Clone)]
pub struct AppState {
    pub integrity: IntegrityEngine,
    pub permissions: PermissionService,
    pub auth: AuthService,
    pub jwt: JwtService,
    pub audit: Arc<dyn AuditSink>,
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/integrity/recalculate", post(handlers::integrity::recalculate))
        .route("/integrity/verify", get(handlers::integrity::verify))
        .route(
            "/permissions",
            get(handlers::permissions::list_permissions)
                .post(handlers::permissions::create_permission),
        )
        .route(
            "/permissions/:id",
            get(handlers::permissions::get_permission)
                .put(handlers::permissions::update_permission)
                .delete(handlers::permissions::delete_permission),
        )
        .route(
            "/users/:user_id/permissions",
            get(handlers::permissions::get_user_permissions)
                .put(handlers::permissions::assign_user_permissions),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route("/auth/login", post(handlers::auth::login))
        .merge(protected)
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
}
