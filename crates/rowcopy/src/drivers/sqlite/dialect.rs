//! SQLite SQL dialect.

use crate::core::{ColumnData, Dialect, SqlType};
use crate::core::identifier::quote_ansi;
use crate::drivers::insert_body;

#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_ansi(name)
    }

    fn param_placeholder(&self, _index: usize, _sql_type: &SqlType) -> String {
        "?".to_string()
    }

    fn build_insert_query(
        &self,
        table: &str,
        columns: &[ColumnData],
        rows: usize,
        ignore_existing: bool,
    ) -> String {
        let verb = if ignore_existing {
            "INSERT OR IGNORE INTO"
        } else {
            "INSERT INTO"
        };
        format!("{} {}", verb, insert_body(self, table, columns, rows))
    }
}

/// Map a declared column type onto a type code using SQLite's affinity rules.
pub(crate) fn map_declared_type(declared: &str) -> SqlType {
    let t = declared.to_uppercase();
    if t.contains("BOOL") {
        SqlType::Bool
    } else if t.contains("INT") {
        SqlType::I64
    } else if t.contains("CHAR") || t.contains("CLOB") || t.contains("TEXT") {
        SqlType::Text
    } else if t.contains("BLOB") {
        SqlType::Bytes
    } else if t.contains("REAL") || t.contains("FLOA") || t.contains("DOUB") {
        SqlType::F64
    } else if t.contains("UUID") {
        SqlType::Uuid
    } else if t.contains("TIMESTAMPTZ") {
        SqlType::DateTimeOffset
    } else if t.contains("DATETIME") || t.contains("TIMESTAMP") {
        SqlType::DateTime
    } else if t.contains("DATE") {
        SqlType::Date
    } else if t.contains("TIME") {
        SqlType::Time
    } else if t.contains("DEC") || t.contains("NUMERIC") {
        SqlType::Decimal
    } else if t.is_empty() {
        SqlType::Other("blob".to_string())
    } else {
        SqlType::Other(declared.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affinity_mapping() {
        assert_eq!(map_declared_type("INTEGER"), SqlType::I64);
        assert_eq!(map_declared_type("varchar(20)"), SqlType::Text);
        assert_eq!(map_declared_type("BOOLEAN"), SqlType::Bool);
        assert_eq!(map_declared_type("DOUBLE PRECISION"), SqlType::F64);
        assert_eq!(map_declared_type("DECIMAL(10,2)"), SqlType::Decimal);
        assert_eq!(map_declared_type("DATETIME"), SqlType::DateTime);
        assert_eq!(map_declared_type("DATE"), SqlType::Date);
        assert_eq!(map_declared_type(""), SqlType::Other("blob".into()));
    }

    #[test]
    fn test_placeholders_are_positional_question_marks() {
        let d = SqliteDialect;
        assert_eq!(d.param_placeholder(7, &SqlType::Text), "?");
        assert_eq!(d.quote_ident("first"), "\"first\"");
    }
}
