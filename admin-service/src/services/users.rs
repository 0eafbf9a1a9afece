use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;

use crate::models::AdminUser;
use crate::utils::{hash_password, Password};

/// Lookup of staff accounts for login.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<AdminUser>, anyhow::Error>;
}

/// In-memory directory for tests and local runs.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: Mutex<Vec<AdminUser>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user with an argon2 hash of `password`. Returns the new user's id.
    pub fn add_user(&self, username: &str, password: &str) -> Result<i64, anyhow::Error> {
        let hash = hash_password(&Password::new(password.to_string()))?;
        let mut users = self
            .users
            .lock()
            .map_err(|_| anyhow::anyhow!("user directory lock poisoned"))?;

        let id = users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        users.push(AdminUser {
            id,
            username: username.to_string(),
            password_hash: hash.into_string(),
            is_blocked: false,
            created_utc: Utc::now(),
        });
        Ok(id)
    }

    pub fn set_blocked(&self, user_id: i64, blocked: bool) {
        if let Ok(mut users) = self.users.lock() {
            if let Some(user) = users.iter_mut().find(|u| u.id == user_id) {
                user.is_blocked = blocked;
            }
        }
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_username(&self, username: &str) -> Result<Option<AdminUser>, anyhow::Error> {
        let users = self
            .users
            .lock()
            .map_err(|_| anyhow::anyhow!("user directory lock poisoned"))?;
        Ok(users.iter().find(|u| u.username == username).cloned())
    }
}
