//! MySQL/MariaDB SQL dialect (Strategy pattern).

use crate::core::identifier::quote_mysql;
use crate::core::{ColumnData, Dialect, SqlType};
use crate::drivers::insert_body;

/// MySQL/MariaDB dialect implementation.
///
/// Compatible with MySQL 5.7+, 8.0+, and MariaDB 10.2+.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_mysql(name)
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
            "INSERT IGNORE INTO"
        } else {
            "INSERT INTO"
        };
        format!("{} {}", verb, insert_body(self, table, columns, rows))
    }
}

/// Map INFORMATION_SCHEMA `DATA_TYPE`/`COLUMN_TYPE` onto a type code.
pub(crate) fn map_data_type(data_type: &str, column_type: &str) -> SqlType {
    let column_type = column_type.to_lowercase();
    match data_type.to_lowercase().as_str() {
        "tinyint" if column_type.starts_with("tinyint(1)") => SqlType::Bool,
        "bit" | "bool" | "boolean" => SqlType::Bool,
        "tinyint" | "smallint" => SqlType::I16,
        "mediumint" | "int" | "integer" => SqlType::I32,
        "bigint" => SqlType::I64,
        "float" => SqlType::F32,
        "double" | "real" => SqlType::F64,
        "decimal" | "numeric" => SqlType::Decimal,
        "char" | "varchar" | "text" | "tinytext" | "mediumtext" | "longtext" | "enum" | "set"
        | "json" => SqlType::Text,
        "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" => {
            SqlType::Bytes
        }
        "uuid" => SqlType::Uuid,
        "date" => SqlType::Date,
        "time" => SqlType::Time,
        "datetime" | "timestamp" => SqlType::DateTime,
        other => SqlType::Other(other.to_string()),
    }
}
