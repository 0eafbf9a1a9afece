//! HTTP handlers for admin-service.

pub mod auth;
pub mod health;
pub mod integrity;
pub mod metrics;
pub mod permissions;
