//! PostgreSQL SQL dialect (Strategy pattern).
//!
//! Parameters are always sent as text and cast server side, so placeholders carry
//! the column's type: `$1::bigint`.

use crate::core::identifier::quote_ansi;
use crate::core::{ColumnData, Dialect, SqlType};
use crate::drivers::insert_body;

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Server-side cast target for a type code.
    pub fn cast_for(sql_type: &SqlType) -> &str {
        match sql_type {
            SqlType::Bool => "boolean",
            SqlType::I16 => "smallint",
            SqlType::I32 => "integer",
            SqlType::I64 => "bigint",
            SqlType::F32 => "real",
            SqlType::F64 => "double precision",
            SqlType::Decimal => "numeric",
            SqlType::Text => "text",
            SqlType::Bytes => "bytea",
            SqlType::Uuid => "uuid",
            SqlType::Date => "date",
            SqlType::Time => "time",
            SqlType::DateTime => "timestamp",
            SqlType::DateTimeOffset => "timestamptz",
            SqlType::Other(name) if is_plain_type_name(name) => name,
            SqlType::Other(_) => "text",
        }
    }
}

fn is_plain_type_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_ansi(name)
    }

    fn param_placeholder(&self, index: usize, sql_type: &SqlType) -> String {
        format!("${}::{}", index, Self::cast_for(sql_type))
    }

    fn build_insert_query(
        &self,
        table: &str,
        columns: &[ColumnData],
        rows: usize,
        ignore_existing: bool,
    ) -> String {
        let mut sql = format!("INSERT INTO {}", insert_body(self, table, columns, rows));
        if ignore_existing {
            sql.push_str("\nON CONFLICT DO NOTHING");
        }
        sql
    }
}

/// Map a catalog `udt_name` onto a type code.
pub(crate) fn map_udt_name(udt: &str) -> SqlType {
    match udt.to_lowercase().as_str() {
        "bool" => SqlType::Bool,
        "int2" => SqlType::I16,
        "int4" => SqlType::I32,
        "int8" => SqlType::I64,
        "float4" => SqlType::F32,
        "float8" => SqlType::F64,
        "numeric" => SqlType::Decimal,
        "text" | "varchar" | "bpchar" | "name" | "citext" => SqlType::Text,
        "bytea" => SqlType::Bytes,
        "uuid" => SqlType::Uuid,
        "date" => SqlType::Date,
        "time" => SqlType::Time,
        "timestamp" => SqlType::DateTime,
        "timestamptz" => SqlType::DateTimeOffset,
        other => SqlType::Other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        let dialect = PostgresDialect;
        assert_eq!(dialect.quote_ident("users"), "\"users\"");
        assert_eq!(dialect.quote_ident("my\"table"), "\"my\"\"table\"");
        assert_eq!(dialect.quote_table("public.users"), "\"public\".\"users\"");
    }

    #[test]
    fn test_placeholders_carry_casts() {
        let dialect = PostgresDialect;
        assert_eq!(dialect.param_placeholder(1, &SqlType::Decimal), "$1::numeric");
        assert_eq!(
            dialect.param_placeholder(3, &SqlType::DateTimeOffset),
            "$3::timestamptz"
        );
        assert_eq!(
            dialect.param_placeholder(4, &SqlType::Other("jsonb".into())),
            "$4::jsonb"
        );
        assert_eq!(
            dialect.param_placeholder(5, &SqlType::Other("character varying(10)".into())),
            "$5::text"
        );
    }

    #[test]
    fn test_map_udt_name() {
        assert_eq!(map_udt_name("int8"), SqlType::I64);
        assert_eq!(map_udt_name("VARCHAR"), SqlType::Text);
        assert_eq!(map_udt_name("timestamptz"), SqlType::DateTimeOffset);
        assert_eq!(map_udt_name("jsonb"), SqlType::Other("jsonb".into()));
    }
}
