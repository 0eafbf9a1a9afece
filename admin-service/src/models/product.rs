//! Catalog product - tracked by the integrity engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::integrity::{Digestible, FieldValue};

/// Product row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub category: Option<String>,
    pub active: bool,
    pub updated_utc: DateTime<Utc>,
    /// Free-form search tags; a collection, so never part of the digest.
    pub tags: Vec<String>,
    /// Stored horizontal digest (DVH).
    pub dvh: Option<String>,
}

impl Digestible for Product {
    fn record_id(&self) -> i64 {
        self.id
    }

    fn digest_fields(&self) -> Vec<(&'static str, FieldValue)> {
        vec![
            ("id", self.id.into()),
            ("sku", self.sku.as_str().into()),
            ("name", self.name.as_str().into()),
            ("description", self.description.as_deref().into()),
            ("price", self.price.into()),
            ("stock", self.stock.into()),
            ("category", self.category.as_deref().into()),
            ("active", self.active.into()),
            ("updated_utc", self.updated_utc.into()),
        ]
    }
}
