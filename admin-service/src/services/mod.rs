//! Services layer for admin-service.
//!
//! Collaborator seams (audit sink, user directory) with their Postgres and in-memory
//! implementations, plus login and token issuance.

mod audit;
mod auth;
mod database;
pub mod error;
mod jwt;
pub mod metrics;
mod users;

pub use audit::{AuditSink, InMemoryAuditSink};
pub use auth::AuthService;
pub use database::Database;
pub use error::ServiceError;
pub use jwt::{JwtService, SessionClaims, TokenResponse};
pub use metrics::{get_metrics, init_metrics};
pub use users::{InMemoryUserDirectory, UserDirectory};
