//! Registry of tables covered by integrity digests.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A table whose rows carry horizontal digests and whose listed columns carry
/// vertical digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedTable {
    Products,
    Customers,
    Orders,
}

impl TrackedTable {
    pub const ALL: [TrackedTable; 3] = [
        TrackedTable::Products,
        TrackedTable::Customers,
        TrackedTable::Orders,
    ];

    /// Physical table name. Also the `table_name` key in the digest tables.
    pub fn name(&self) -> &'static str {
        match self {
            TrackedTable::Products => "products",
            TrackedTable::Customers => "customers",
            TrackedTable::Orders => "orders",
        }
    }

    /// Columns protected by a vertical digest.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            TrackedTable::Products => &["name", "price", "stock", "active"],
            TrackedTable::Customers => &["email", "blocked"],
            TrackedTable::Orders => &["customer_id", "status", "total"],
        }
    }
}

impl fmt::Display for TrackedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TrackedTable {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrackedTable::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| anyhow::anyhow!("'{}' is not a tracked table", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::{Digestible, RecordSnapshot};
    use crate::models::{Customer, Order, Product};
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn field_names<T: Digestible>(entity: &T) -> Vec<String> {
        RecordSnapshot::capture(entity)
            .field_names()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn tracked_columns_are_significant_fields() {
        let product = Product {
            id: 1,
            sku: "SKU-1".to_string(),
            name: "Atlas".to_string(),
            description: None,
            price: Decimal::new(999, 2),
            stock: 3,
            category: None,
            active: true,
            updated_utc: Utc::now(),
            tags: vec![],
            dvh: None,
        };
        let customer = Customer {
            id: 1,
            email: "a@example.com".to_string(),
            full_name: "Ada".to_string(),
            phone: None,
            blocked: false,
            created_utc: Utc::now(),
            dvh: None,
        };
        let order = Order {
            id: 1,
            customer_id: 1,
            status: "placed".to_string(),
            total: Decimal::new(999, 2),
            placed_utc: Utc::now(),
            items: vec![],
            dvh: None,
        };

        let fields = [
            (TrackedTable::Products, field_names(&product)),
            (TrackedTable::Customers, field_names(&customer)),
            (TrackedTable::Orders, field_names(&order)),
        ];
        for (table, names) in fields {
            for column in table.columns() {
                assert!(
                    names.iter().any(|n| n == column),
                    "{}.{} is not a digest field",
                    table,
                    column
                );
            }
            assert!(!names.iter().any(|n| n == "dvh"));
        }
    }

    #[test]
    fn parses_table_names() {
        assert_eq!("orders".parse::<TrackedTable>().unwrap(), TrackedTable::Orders);
        assert!("audit_events".parse::<TrackedTable>().is_err());
    }
}
