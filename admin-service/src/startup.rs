//! Application startup and lifecycle management.

use std::net::SocketAddr;
use std::sync::Arc;

use service_core::error::AppError;
use tokio::net::TcpListener;

use crate::config::AdminConfig;
use crate::db::{create_pool, run_migrations};
use crate::integrity::IntegrityEngine;
use crate::permissions::PermissionService;
use crate::services::{init_metrics, AuthService, Database, JwtService};
use crate::{build_router, AppState};

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: AdminConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: AdminConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: AdminConfig, migrate: bool) -> Result<Self, AppError> {
        init_metrics();

        let pool = create_pool(&config.database).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            AppError::from(e)
        })?;

        if migrate {
            run_migrations(&pool).await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                AppError::DatabaseError(anyhow::Error::new(e))
            })?;
        }

        let db = Arc::new(Database::new(pool));
        let jwt = JwtService::new(&config.jwt);
        let integrity = IntegrityEngine::new(db.clone(), db.clone());
        let permissions = PermissionService::new(db.clone(), db.clone());
        let auth = AuthService::new(db.clone(), permissions.clone(), jwt.clone(), db.clone());

        let state = AppState {
            integrity,
            permissions,
            auth,
            jwt,
            audit: db,
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Admin service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);

        tracing::info!(port = self.port, "Starting HTTP server");
        axum::serve(
            self.listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
    }
}
