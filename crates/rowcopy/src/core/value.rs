//! SQL value types shared by every driver.
//!
//! Rows are read into owned [`SqlValue`]s so that they can be compared, hashed
//! and carried from the source connection to the target connection without
//! borrowing driver buffers. [`SqlType`] is the column type code reported by the
//! catalog; it decides how a value is decoded and how a NULL is bound.

use std::hash::{Hash, Hasher};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Column type code.
///
/// Drivers map their native type names onto these codes when the schema graph is
/// built. `Other` keeps the native name so unknown types still round-trip as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    Decimal,
    Text,
    Bytes,
    Uuid,
    Date,
    Time,
    DateTime,
    DateTimeOffset,
    Other(String),
}

impl SqlType {
    /// True for types whose values are written as quoted strings in SQL text.
    pub fn is_quoted(&self) -> bool {
        matches!(
            self,
            SqlType::Text
                | SqlType::Uuid
                | SqlType::Date
                | SqlType::Time
                | SqlType::DateTime
                | SqlType::DateTimeOffset
                | SqlType::Other(_)
        )
    }
}

/// A non-NULL column value. NULL is represented by `Option::None` in
/// [`ColumnData`](crate::core::ColumnData).
#[derive(Debug, Clone)]
pub enum SqlValue {
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
}

impl SqlValue {
    /// Type code matching this value's variant.
    #[must_use]
    pub fn sql_type(&self) -> SqlType {
        match self {
            SqlValue::Bool(_) => SqlType::Bool,
            SqlValue::I16(_) => SqlType::I16,
            SqlValue::I32(_) => SqlType::I32,
            SqlValue::I64(_) => SqlType::I64,
            SqlValue::F32(_) => SqlType::F32,
            SqlValue::F64(_) => SqlType::F64,
            SqlValue::Decimal(_) => SqlType::Decimal,
            SqlValue::Text(_) => SqlType::Text,
            SqlValue::Bytes(_) => SqlType::Bytes,
            SqlValue::Uuid(_) => SqlType::Uuid,
            SqlValue::Date(_) => SqlType::Date,
            SqlValue::Time(_) => SqlType::Time,
            SqlValue::DateTime(_) => SqlType::DateTime,
            SqlValue::DateTimeOffset(_) => SqlType::DateTimeOffset,
        }
    }

    /// Native text form of the value, unquoted.
    ///
    /// Temporal values use ISO-8601. This is also the representation bound as a
    /// text parameter for drivers that cast on the server side.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            SqlValue::Bool(v) => v.to_string(),
            SqlValue::I16(v) => v.to_string(),
            SqlValue::I32(v) => v.to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F32(v) => v.to_string(),
            SqlValue::F64(v) => v.to_string(),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Text(v) => v.clone(),
            SqlValue::Bytes(v) => hex::encode(v),
            SqlValue::Uuid(v) => v.to_string(),
            SqlValue::Date(v) => v.format("%Y-%m-%d").to_string(),
            SqlValue::Time(v) => v.format("%H:%M:%S%.f").to_string(),
            SqlValue::DateTime(v) => v.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            SqlValue::DateTimeOffset(v) => v.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string(),
        }
    }

    /// Render as a SQL literal suitable for embedding in a script.
    ///
    /// Strings are single-quoted with embedded quotes doubled, temporal values
    /// are quoted ISO text, binary data uses the `X'..'` hex form and everything
    /// else uses its native text form.
    #[must_use]
    pub fn to_sql_literal(&self) -> String {
        match self {
            SqlValue::Bool(true) => "TRUE".to_string(),
            SqlValue::Bool(false) => "FALSE".to_string(),
            SqlValue::Bytes(v) => format!("X'{}'", hex::encode(v)),
            SqlValue::Text(v) => format!("'{}'", v.replace('\'', "''")),
            other if other.sql_type().is_quoted() => format!("'{}'", other.to_text()),
            other => other.to_text(),
        }
    }
}

// Floats compare by bit pattern so rows holding them can live in hash sets.
impl PartialEq for SqlValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SqlValue::Bool(a), SqlValue::Bool(b)) => a == b,
            (SqlValue::I16(a), SqlValue::I16(b)) => a == b,
            (SqlValue::I32(a), SqlValue::I32(b)) => a == b,
            (SqlValue::I64(a), SqlValue::I64(b)) => a == b,
            (SqlValue::F32(a), SqlValue::F32(b)) => a.to_bits() == b.to_bits(),
            (SqlValue::F64(a), SqlValue::F64(b)) => a.to_bits() == b.to_bits(),
            (SqlValue::Decimal(a), SqlValue::Decimal(b)) => a == b,
            (SqlValue::Text(a), SqlValue::Text(b)) => a == b,
            (SqlValue::Bytes(a), SqlValue::Bytes(b)) => a == b,
            (SqlValue::Uuid(a), SqlValue::Uuid(b)) => a == b,
            (SqlValue::Date(a), SqlValue::Date(b)) => a == b,
            (SqlValue::Time(a), SqlValue::Time(b)) => a == b,
            (SqlValue::DateTime(a), SqlValue::DateTime(b)) => a == b,
            (SqlValue::DateTimeOffset(a), SqlValue::DateTimeOffset(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for SqlValue {}

impl Hash for SqlValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            SqlValue::Bool(v) => v.hash(state),
            SqlValue::I16(v) => v.hash(state),
            SqlValue::I32(v) => v.hash(state),
            SqlValue::I64(v) => v.hash(state),
            SqlValue::F32(v) => v.to_bits().hash(state),
            SqlValue::F64(v) => v.to_bits().hash(state),
            // Decimal's Hash is consistent with its Eq (1.0 == 1.00).
            SqlValue::Decimal(v) => v.hash(state),
            SqlValue::Text(v) => v.hash(state),
            SqlValue::Bytes(v) => v.hash(state),
            SqlValue::Uuid(v) => v.hash(state),
            SqlValue::Date(v) => v.hash(state),
            SqlValue::Time(v) => v.hash(state),
            SqlValue::DateTime(v) => v.hash(state),
            SqlValue::DateTimeOffset(v) => v.hash(state),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        SqlValue::I16(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_text_literal_doubles_quotes() {
        let v = SqlValue::from("it's");
        assert_eq!(v.to_sql_literal(), "'it''s'");
    }

    #[test]
    fn test_temporal_literals_are_quoted_iso() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(SqlValue::Date(date).to_sql_literal(), "'2024-02-29'");

        let ts = date.and_hms_opt(13, 5, 0).unwrap();
        assert_eq!(
            SqlValue::DateTime(ts).to_sql_literal(),
            "'2024-02-29 13:05:00'"
        );
    }

    #[test]
    fn test_native_literals() {
        assert_eq!(SqlValue::I64(42).to_sql_literal(), "42");
        assert_eq!(SqlValue::Bool(true).to_sql_literal(), "TRUE");
        assert_eq!(SqlValue::Bytes(vec![0xde, 0xad]).to_sql_literal(), "X'dead'");
        assert_eq!(
            SqlValue::Decimal(Decimal::new(12345, 2)).to_sql_literal(),
            "123.45"
        );
    }

    #[test]
    fn test_float_values_hash_and_compare() {
        let mut set = HashSet::new();
        set.insert(SqlValue::F64(1.5));
        set.insert(SqlValue::F64(1.5));
        set.insert(SqlValue::I64(1));
        assert_eq!(set.len(), 2);
        assert_ne!(SqlValue::I32(1), SqlValue::I64(1));
    }

    #[test]
    fn test_sql_type_round_trips_through_json() {
        let json = serde_json::to_string(&SqlType::Other("jsonb".into())).unwrap();
        let back: SqlType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SqlType::Other("jsonb".into()));
        assert_eq!(SqlValue::I16(3).sql_type(), SqlType::I16);
    }
}
