//! Dynamic field values.
//!
//! `FieldValue` is the single currency predicates, sort keys, change sets
//! and records exchange, so every backend compares the same things the
//! same way.

use crate::model::schema::FieldType;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// One typed field value, or SQL-style null.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldValue {
    Null,
    Uuid(Uuid),
    Text(String),
    Integer(i64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short type name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Uuid(_) => "uuid",
            Self::Text(_) => "text",
            Self::Integer(_) => "integer",
            Self::Boolean(_) => "boolean",
            Self::Timestamp(_) => "timestamp",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Converts this value into `field_type`, if the conversion is lossless.
    ///
    /// Text is accepted for uuid and timestamp fields when it parses.
    pub fn coerce_to(&self, field_type: FieldType) -> Option<FieldValue> {
        match (self, field_type) {
            (Self::Null, _) => Some(Self::Null),
            (Self::Uuid(_), FieldType::Uuid)
            | (Self::Text(_), FieldType::Text)
            | (Self::Integer(_), FieldType::Integer)
            | (Self::Boolean(_), FieldType::Boolean)
            | (Self::Timestamp(_), FieldType::Timestamp) => Some(self.clone()),
            (Self::Text(text), FieldType::Uuid) => Uuid::parse_str(text).ok().map(Self::Uuid),
            (Self::Text(text), FieldType::Timestamp) => parse_timestamp(text).map(Self::Timestamp),
            _ => None,
        }
    }

    /// Total order used for sorting: null first, then by value.
    ///
    /// Values of different kinds only meet when a schema is violated; they
    /// are ordered by kind so sorting never panics.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Uuid(a), Self::Uuid(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// Comparison for predicates; `None` when either side is null or the
    /// kinds differ.
    pub fn partial_cmp_value(&self, other: &Self) -> Option<Ordering> {
        if self.is_null() || other.is_null() || self.rank() != other.rank() {
            return None;
        }
        Some(self.sort_cmp(other))
    }

    /// JSON form matching what `serde` produces for the Rust field types.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Uuid(value) => serde_json::Value::String(value.to_string()),
            Self::Text(value) => serde_json::Value::String(value.clone()),
            Self::Integer(value) => serde_json::Value::from(*value),
            Self::Boolean(value) => serde_json::Value::Bool(*value),
            Self::Timestamp(value) => serde_json::Value::String(format_timestamp(value)),
        }
    }

    /// Reads a JSON value as `field_type`; `None` when it does not fit.
    pub fn from_json(value: &serde_json::Value, field_type: FieldType) -> Option<FieldValue> {
        if value.is_null() {
            return Some(Self::Null);
        }
        match field_type {
            FieldType::Uuid => value
                .as_str()
                .and_then(|text| Uuid::parse_str(text).ok())
                .map(Self::Uuid),
            FieldType::Text => value.as_str().map(|text| Self::Text(text.to_string())),
            FieldType::Integer => value.as_i64().map(Self::Integer),
            FieldType::Boolean => value.as_bool().map(Self::Boolean),
            FieldType::Timestamp => value.as_str().and_then(parse_timestamp).map(Self::Timestamp),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Boolean(_) => 1,
            Self::Integer(_) => 2,
            Self::Timestamp(_) => 3,
            Self::Text(_) => 4,
            Self::Uuid(_) => 5,
        }
    }
}

/// Fixed-width UTC RFC 3339 text with nanoseconds.
///
/// Lexicographic order is chronological and the full `DateTime<Utc>`
/// precision survives storage.
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parses RFC 3339 text with any offset into a UTC instant.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|value| value.with_timezone(&Utc))
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Uuid(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value:?}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Timestamp(value) => f.write_str(&format_timestamp(value)),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<DateTime<FixedOffset>> for FieldValue {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self::Timestamp(value.with_timezone(&Utc))
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::{format_timestamp, FieldValue};
    use crate::model::schema::FieldType;
    use chrono::{FixedOffset, TimeZone, Utc};
    use std::cmp::Ordering;

    #[test]
    fn nulls_sort_first_and_never_compare() {
        assert_eq!(
            FieldValue::Null.sort_cmp(&FieldValue::Boolean(false)),
            Ordering::Less
        );
        assert_eq!(
            FieldValue::Null.partial_cmp_value(&FieldValue::Null),
            None
        );
        assert_eq!(
            FieldValue::Integer(2).partial_cmp_value(&FieldValue::Integer(3)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn text_coerces_into_uuid_and_timestamp_fields() {
        let id = uuid::Uuid::new_v4();
        let coerced = FieldValue::from(id.to_string()).coerce_to(FieldType::Uuid);
        assert_eq!(coerced, Some(FieldValue::Uuid(id)));

        let coerced =
            FieldValue::from("2023-12-15T12:00:00+02:00").coerce_to(FieldType::Timestamp);
        let expected = Utc.with_ymd_and_hms(2023, 12, 15, 10, 0, 0).unwrap();
        assert_eq!(coerced, Some(FieldValue::Timestamp(expected)));

        assert_eq!(FieldValue::from(3).coerce_to(FieldType::Text), None);
    }

    #[test]
    fn offset_timestamps_normalize_to_utc() {
        let offset = FixedOffset::west_opt(8 * 3600).unwrap();
        let local = offset.with_ymd_and_hms(2023, 10, 24, 12, 30, 30).unwrap();
        let value = FieldValue::from(local);
        let expected = Utc.with_ymd_and_hms(2023, 10, 24, 20, 30, 30).unwrap();
        assert_eq!(value, FieldValue::Timestamp(expected));
    }

    #[test]
    fn formatted_timestamps_sort_chronologically() {
        let early = Utc.with_ymd_and_hms(2023, 1, 1, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2023, 1, 1, 10, 0, 0).unwrap();
        assert!(format_timestamp(&early) < format_timestamp(&late));
        assert_eq!(format_timestamp(&early), "2023-01-01T09:00:00.000000000Z");
    }

    #[test]
    fn formatting_keeps_sub_microsecond_precision() {
        let base = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap();
        let precise = base + chrono::Duration::nanoseconds(123_456_789);
        let later = precise + chrono::Duration::nanoseconds(500);
        assert_eq!(format_timestamp(&precise), "2023-11-14T22:13:20.123456789Z");
        assert!(format_timestamp(&precise) < format_timestamp(&later));
        assert_eq!(
            FieldValue::from_json(&FieldValue::Timestamp(precise).to_json(), FieldType::Timestamp),
            Some(FieldValue::Timestamp(precise))
        );
    }

    #[test]
    fn json_roundtrip_respects_field_type() {
        let value = FieldValue::Integer(7);
        assert_eq!(
            FieldValue::from_json(&value.to_json(), FieldType::Integer),
            Some(value)
        );
        assert_eq!(
            FieldValue::from_json(&serde_json::json!("x"), FieldType::Boolean),
            None
        );
    }
}
