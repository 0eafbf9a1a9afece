//! Storefront customer - tracked by the integrity engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::integrity::{Digestible, FieldValue};

/// Customer row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub blocked: bool,
    pub created_utc: DateTime<Utc>,
    pub dvh: Option<String>,
}

impl Digestible for Customer {
    fn record_id(&self) -> i64 {
        self.id
    }

    fn digest_fields(&self) -> Vec<(&'static str, FieldValue)> {
        vec![
            ("id", self.id.into()),
            ("email", self.email.as_str().into()),
            ("full_name", self.full_name.as_str().into()),
            ("phone", self.phone.as_deref().into()),
            ("blocked", self.blocked.into()),
            ("created_utc", self.created_utc.into()),
        ]
    }
}
