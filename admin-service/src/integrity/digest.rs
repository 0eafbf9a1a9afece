//! Canonical digest computation for records and columns.
//!
//! A record digest is SHA-256 over the concatenation of its significant field values,
//! taken in ascending field-name order, rendered upper-case hex. Rendering never
//! consults the host locale: decimals are normalized, timestamps are RFC 3339 UTC with
//! microsecond precision, and absent values render as the empty string.
//!
//! A column digest hashes one column across a table in ascending record id, with each
//! value length-prefixed.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

/// Scalar value contributing to a digest.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(Decimal),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// Canonical, locale-independent rendering.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Int(i) => i.to_string(),
            FieldValue::Decimal(d) => d.normalize().to_string(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v.into())
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<Decimal> for FieldValue {
    fn from(v: Decimal) -> Self {
        FieldValue::Decimal(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// A persisted entity covered by horizontal and vertical digests.
///
/// Implementations list every significant scalar field. The entity's own digest
/// column and any collection-valued field must not be listed.
pub trait Digestible {
    fn record_id(&self) -> i64;

    fn digest_fields(&self) -> Vec<(&'static str, FieldValue)>;
}

/// Upper-case hex SHA-256 of `input`.
pub fn hash_hex(input: &str) -> String {
    hex::encode_upper(Sha256::digest(input.as_bytes()))
}

/// Digest an entity through its [`Digestible`] contract.
pub fn digest_entity<T: Digestible + ?Sized>(entity: &T) -> String {
    RecordSnapshot::capture(entity).digest()
}

/// Rendered significant fields of one record, sorted by field name.
///
/// Snapshots are what the integrity store hands to the verifier, so every table is
/// digested the same way regardless of its concrete row type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSnapshot {
    pub id: i64,
    fields: Vec<(String, String)>,
}

impl RecordSnapshot {
    pub fn capture<T: Digestible + ?Sized>(entity: &T) -> Self {
        Self::from_fields(
            entity.record_id(),
            entity
                .digest_fields()
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.render())),
        )
    }

    /// Build from already-rendered values.
    pub fn from_fields(id: i64, fields: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut fields: Vec<(String, String)> = fields.into_iter().collect();
        // Ordinal byte order of the names, independent of declaration order.
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        debug_assert!(
            fields.windows(2).all(|w| w[0].0 != w[1].0),
            "duplicate digest field name"
        );
        Self { id, fields }
    }

    pub fn value(&self, field: &str) -> Option<&str> {
        self.fields
            .binary_search_by(|(name, _)| name.as_str().cmp(field))
            .ok()
            .map(|i| self.fields[i].1.as_str())
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Horizontal digest of this record.
    pub fn digest(&self) -> String {
        let canonical: String = self.fields.iter().map(|(_, v)| v.as_str()).collect();
        hash_hex(&canonical)
    }
}

/// Vertical digest of `column` across `records`, taken in ascending id order.
///
/// Each value is framed as `{byte_len}:{value}` so characters cannot move across a
/// row boundary without changing the digest. A record lacking the column contributes
/// an empty value.
pub fn column_digest(column: &str, records: &[RecordSnapshot]) -> String {
    let mut ordered: Vec<&RecordSnapshot> = records.iter().collect();
    ordered.sort_by_key(|r| r.id);
    let canonical: String = ordered
        .iter()
        .map(|r| {
            let value = r.value(column).unwrap_or_default();
            format!("{}:{}", value.len(), value)
        })
        .collect();
    hash_hex(&canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    struct Item {
        id: i64,
        name: String,
        price: Decimal,
        note: Option<String>,
        // Excluded: the stored digest and a collection field.
        dvh: Option<String>,
        tags: Vec<String>,
    }

    impl Digestible for Item {
        fn record_id(&self) -> i64 {
            self.id
        }

        fn digest_fields(&self) -> Vec<(&'static str, FieldValue)> {
            vec![
                ("price", self.price.into()),
                ("name", self.name.as_str().into()),
                ("id", self.id.into()),
                ("note", self.note.as_deref().into()),
            ]
        }
    }

    fn atlas() -> Item {
        Item {
            id: 7,
            name: "Atlas".to_string(),
            price: Decimal::from_str("9.99").unwrap(),
            note: None,
            dvh: None,
            tags: vec![],
        }
    }

    #[test]
    fn digest_is_sha256_of_sorted_concatenation() {
        // id, name, note, price -> "7" + "Atlas" + "" + "9.99"
        assert_eq!(digest_entity(&atlas()), hash_hex("7Atlas9.99"));
        assert_eq!(digest_entity(&atlas()).len(), 64);
        assert!(digest_entity(&atlas())
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn digest_is_deterministic() {
        let first = digest_entity(&atlas());
        let _unrelated = digest_entity(&Item {
            id: 8,
            ..atlas()
        });
        assert_eq!(first, digest_entity(&atlas()));
    }

    #[test]
    fn changing_a_significant_field_changes_digest() {
        let before = digest_entity(&atlas());
        let mut item = atlas();
        item.price = Decimal::from_str("12.99").unwrap();
        assert_ne!(before, digest_entity(&item));

        let mut item = atlas();
        item.note = Some("clearance".to_string());
        assert_ne!(before, digest_entity(&item));
    }

    #[test]
    fn digest_and_collection_fields_are_excluded() {
        let mut item = atlas();
        item.dvh = Some("ANYTHING".to_string());
        item.tags = vec!["maps".to_string(), "travel".to_string()];
        assert_eq!(digest_entity(&atlas()), digest_entity(&item));
    }

    #[test]
    fn decimals_render_without_scale_noise() {
        assert_eq!(
            FieldValue::from(Decimal::from_str("9.990").unwrap()).render(),
            "9.99"
        );
        assert_eq!(
            FieldValue::from(Decimal::from_str("10.00").unwrap()).render(),
            "10"
        );
        assert_eq!(
            FieldValue::from(Decimal::from_str("-0.50").unwrap()).render(),
            "-0.5"
        );
    }

    #[test]
    fn timestamps_render_as_utc_micros() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(
            FieldValue::from(ts).render(),
            "2024-03-01T12:30:00.000000Z"
        );
    }

    #[test]
    fn null_renders_empty() {
        assert_eq!(FieldValue::from(None::<&str>).render(), "");
        assert_eq!(FieldValue::Null.render(), "");
    }

    #[test]
    fn snapshot_lookup_by_field_name() {
        let snapshot = RecordSnapshot::capture(&atlas());
        assert_eq!(snapshot.value("name"), Some("Atlas"));
        assert_eq!(snapshot.value("note"), Some(""));
        assert_eq!(snapshot.value("dvh"), None);
        assert_eq!(
            snapshot.field_names().collect::<Vec<_>>(),
            vec!["id", "name", "note", "price"]
        );
    }

    #[test]
    fn column_digest_ignores_input_order() {
        let a = RecordSnapshot::from_fields(1, [("price".to_string(), "5".to_string())]);
        let b = RecordSnapshot::from_fields(2, [("price".to_string(), "7".to_string())]);
        assert_eq!(column_digest("price", &[b.clone(), a.clone()]), hash_hex("1:51:7"));
        assert_eq!(
            column_digest("price", &[a.clone(), b.clone()]),
            column_digest("price", &[b, a])
        );
    }

    #[test]
    fn column_digest_detects_values_shifted_across_rows() {
        let name = |id: i64, v: &str| {
            RecordSnapshot::from_fields(id, [("name".to_string(), v.to_string())])
        };
        let original = [name(1, "ab"), name(2, "c")];
        let shifted = [name(1, "a"), name(2, "bc")];
        assert_ne!(
            column_digest("name", &original),
            column_digest("name", &shifted)
        );
    }
}
