//! Customer order - tracked by the integrity engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::integrity::{Digestible, FieldValue};

/// Order header row. Line items live in `order_items`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub customer_id: i64,
    pub status: String,
    pub total: Decimal,
    pub placed_utc: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(default)]
    pub items: Vec<OrderItem>,
    pub dvh: Option<String>,
}

/// Order line item.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl Digestible for Order {
    fn record_id(&self) -> i64 {
        self.id
    }

    fn digest_fields(&self) -> Vec<(&'static str, FieldValue)> {
        vec![
            ("id", self.id.into()),
            ("customer_id", self.customer_id.into()),
            ("status", self.status.as_str().into()),
            ("total", self.total.into()),
            ("placed_utc", self.placed_utc.into()),
        ]
    }
}
