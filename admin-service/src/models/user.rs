//! Back-office staff account.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Staff user able to log in to the admin surface.
#[derive(Debug, Clone, FromRow)]
pub struct AdminUser {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub is_blocked: bool,
    pub created_utc: DateTime<Utc>,
}
