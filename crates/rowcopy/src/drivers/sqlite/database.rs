//! SQLite database implementation.
//!
//! SQLite values are dynamically typed, so decoding looks at each value's storage
//! class and then coerces it towards the column's declared type. Values that do
//! not coerce are kept in their storage form rather than rejected.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column as _, Executor, Row, Transaction, TypeInfo, ValueRef};
use tracing::debug;
use uuid::Uuid;

use super::dialect::map_declared_type;
use crate::core::{
    Column, ColumnData, DataRow, Database, Dialect, KeyColumn, Session, SqlType, SqlValue, Table,
};
use crate::drivers::common::{decode_row, match_result_columns};
use crate::drivers::DialectImpl;
use crate::error::{CopyError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Pool size for file databases.
const MAX_FILE_CONNECTIONS: u32 = 8;

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// SQLite database backed by an sqlx pool.
pub struct SqliteDatabase {
    pool: SqlitePool,
    dialect: DialectImpl,
}

impl SqliteDatabase {
    /// Open a database from an sqlx SQLite URL.
    ///
    /// In-memory databases get a single long-lived connection, since every new
    /// connection to `:memory:` would see an empty database.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| {
                CopyError::Config(format!("Invalid SQLite connection string '{}': {}", url, e))
            })?
            .foreign_keys(true);

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(MAX_FILE_CONNECTIONS)
        };

        let pool = pool_options
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| CopyError::pool(e, "creating SQLite pool"))?;

        debug!("Opened SQLite database {}", url);
        Ok(Self {
            pool,
            dialect: DialectImpl::sqlite(),
        })
    }

    /// Open a private in-memory database.
    pub async fn memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    /// Run a script of `;`-separated statements outside any transaction.
    pub async fn execute_script(&self, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| CopyError::query(sql, e))?;
        Ok(())
    }

    async fn names(&self, sql: &str, table: &str, context: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(sql)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CopyError::pool(e, context))?;
        rows.iter()
            .map(|r| {
                r.try_get::<String, _>(0)
                    .map(|n| n.to_lowercase())
                    .map_err(|e| CopyError::pool(e, context))
            })
            .collect()
    }
}

fn bind_param<'q>(query: SqliteQuery<'q>, param: &ColumnData) -> SqliteQuery<'q> {
    match &param.value {
        None => match param.sql_type {
            SqlType::Bool => query.bind(None::<bool>),
            SqlType::I16 | SqlType::I32 | SqlType::I64 => query.bind(None::<i64>),
            SqlType::F32 | SqlType::F64 => query.bind(None::<f64>),
            SqlType::Bytes => query.bind(None::<Vec<u8>>),
            _ => query.bind(None::<String>),
        },
        Some(SqlValue::Bool(v)) => query.bind(*v),
        Some(SqlValue::I16(v)) => query.bind(i64::from(*v)),
        Some(SqlValue::I32(v)) => query.bind(i64::from(*v)),
        Some(SqlValue::I64(v)) => query.bind(*v),
        Some(SqlValue::F32(v)) => query.bind(f64::from(*v)),
        Some(SqlValue::F64(v)) => query.bind(*v),
        Some(SqlValue::Bytes(v)) => query.bind(v.clone()),
        Some(other) => query.bind(other.to_text()),
    }
}

fn bind_params<'q>(query: SqliteQuery<'q>, params: &[ColumnData]) -> SqliteQuery<'q> {
    params.iter().fold(query, bind_param)
}

fn coerce_integer(v: i64, sql_type: &SqlType) -> SqlValue {
    match sql_type {
        SqlType::Bool => SqlValue::Bool(v != 0),
        SqlType::I16 => i16::try_from(v).map_or(SqlValue::I64(v), SqlValue::I16),
        SqlType::I32 => i32::try_from(v).map_or(SqlValue::I64(v), SqlValue::I32),
        SqlType::F32 | SqlType::F64 => SqlValue::F64(v as f64),
        SqlType::Decimal => SqlValue::Decimal(Decimal::from(v)),
        _ => SqlValue::I64(v),
    }
}

fn coerce_real(v: f64, sql_type: &SqlType) -> SqlValue {
    match sql_type {
        SqlType::Decimal => Decimal::try_from(v).map_or(SqlValue::F64(v), SqlValue::Decimal),
        _ => SqlValue::F64(v),
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

fn coerce_text(s: String, sql_type: &SqlType) -> SqlValue {
    let parsed = match sql_type {
        SqlType::Date => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .ok()
            .map(SqlValue::Date),
        SqlType::Time => NaiveTime::parse_from_str(&s, "%H:%M:%S%.f")
            .ok()
            .map(SqlValue::Time),
        SqlType::DateTime => parse_datetime(&s).map(SqlValue::DateTime),
        SqlType::DateTimeOffset => DateTime::parse_from_rfc3339(&s)
            .or_else(|_| DateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f%:z"))
            .ok()
            .map(SqlValue::DateTimeOffset),
        SqlType::Uuid => Uuid::parse_str(&s).ok().map(SqlValue::Uuid),
        SqlType::Decimal => Decimal::from_str(&s).ok().map(SqlValue::Decimal),
        _ => None,
    };
    // Values are bound back as text, so a typed value must render the stored
    // text exactly or key lookups on it stop matching.
    match parsed {
        Some(value) if value.to_text() == s => value,
        _ => SqlValue::Text(s),
    }
}

fn decode_value(
    row: &SqliteRow,
    index: usize,
    sql_type: &SqlType,
) -> std::result::Result<Option<SqlValue>, String> {
    let storage = {
        let raw = row.try_get_raw(index).map_err(|e| e.to_string())?;
        if raw.is_null() {
            return Ok(None);
        }
        raw.type_info().name().to_string()
    };

    let value = match storage.as_str() {
        "INTEGER" => coerce_integer(
            row.try_get_unchecked::<i64, _>(index)
                .map_err(|e| e.to_string())?,
            sql_type,
        ),
        "REAL" => coerce_real(
            row.try_get_unchecked::<f64, _>(index)
                .map_err(|e| e.to_string())?,
            sql_type,
        ),
        "TEXT" => coerce_text(
            row.try_get_unchecked::<String, _>(index)
                .map_err(|e| e.to_string())?,
            sql_type,
        ),
        _ => SqlValue::Bytes(
            row.try_get_unchecked::<Vec<u8>, _>(index)
                .map_err(|e| e.to_string())?,
        ),
    };
    Ok(Some(value))
}

fn decode_rows(rows: &[SqliteRow], table: &Arc<Table>) -> Result<Vec<DataRow>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let columns = match_result_columns(table, first.columns().iter().map(|c| c.name()));
    rows.iter()
        .map(|row| decode_row(table, &columns, |c| decode_value(row, c.index, &c.sql_type)))
        .collect()
}

#[async_trait]
impl Database for SqliteDatabase {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn db_type(&self) -> &str {
        "sqlite"
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CopyError::pool(e, "listing SQLite tables"))?;

        rows.iter()
            .map(|r| {
                r.try_get::<String, _>("name")
                    .map_err(|e| CopyError::pool(e, "listing SQLite tables"))
            })
            .collect()
    }

    async fn columns(&self, table: &str) -> Result<Vec<Column>> {
        let rows = sqlx::query(
            "SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CopyError::pool(e, "loading SQLite columns"))?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let decode = |e: sqlx::Error| CopyError::pool(e, "loading SQLite columns");
            let name: String = row.try_get("name").map_err(decode)?;
            let declared: String = row.try_get("type").map_err(decode)?;
            let not_null: i64 = row.try_get("notnull").map_err(decode)?;
            let pk: i64 = row.try_get("pk").map_err(decode)?;
            columns.push(Column::new(
                name,
                map_declared_type(&declared),
                not_null == 0 && pk == 0,
            ));
        }
        Ok(columns)
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        self.names(
            "SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk",
            table,
            "loading SQLite primary key",
        )
        .await
    }

    async fn best_row_identifier(&self, table: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT il.name AS index_name, ii.name AS column_name \
             FROM pragma_index_list(?1) il JOIN pragma_index_info(il.name) ii \
             WHERE il.\"unique\" = 1 \
             ORDER BY il.seq, ii.seqno",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CopyError::pool(e, "loading SQLite unique keys"))?;

        let mut first_index: Option<String> = None;
        let mut columns = Vec::new();
        for row in rows {
            let decode = |e: sqlx::Error| CopyError::pool(e, "loading SQLite unique keys");
            let index: String = row.try_get("index_name").map_err(decode)?;
            let column: Option<String> = row.try_get("column_name").map_err(decode)?;
            match &first_index {
                None => first_index = Some(index),
                Some(first) if *first != index => break,
                Some(_) => {}
            }
            // expression indexes report no column name
            match column {
                Some(c) => columns.push(c.to_lowercase()),
                None => return Ok(Vec::new()),
            }
        }
        Ok(columns)
    }

    async fn exported_keys(&self, table: &str) -> Result<Vec<KeyColumn>> {
        let rows = sqlx::query(
            "SELECT m.name AS fk_table, p.id AS id, p.\"from\" AS fk_column, \
                    p.\"to\" AS pk_column, p.seq AS seq \
             FROM sqlite_master m JOIN pragma_foreign_key_list(m.name) p \
             WHERE m.type = 'table' AND lower(p.\"table\") = lower(?1) \
             ORDER BY m.name, p.id, p.seq",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CopyError::pool(e, "loading SQLite exported keys"))?;

        let mut own_key: Option<Vec<String>> = None;
        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            let decode = |e: sqlx::Error| CopyError::pool(e, "loading SQLite exported keys");
            let fk_table: String = row.try_get("fk_table").map_err(decode)?;
            let id: i64 = row.try_get("id").map_err(decode)?;
            let seq: i64 = row.try_get("seq").map_err(decode)?;
            let fk_column: String = row.try_get("fk_column").map_err(decode)?;
            let pk_column: Option<String> = row.try_get("pk_column").map_err(decode)?;

            // REFERENCES parent without a column list points at the parent's primary key
            let pk_column = match pk_column {
                Some(c) => c,
                None => {
                    if own_key.is_none() {
                        own_key = Some(self.primary_key(table).await?);
                    }
                    own_key
                        .as_ref()
                        .and_then(|k| k.get(seq as usize).cloned())
                        .ok_or_else(|| {
                            CopyError::Schema(format!(
                                "Foreign key {} on '{}' references '{}' without a matching primary key",
                                id, fk_table, table
                            ))
                        })?
                }
            };

            keys.push(KeyColumn {
                key_name: format!("{}_fk_{}", fk_table, id),
                pk_table: table.to_string(),
                pk_column,
                fk_table,
                fk_column,
            });
        }
        Ok(keys)
    }

    async fn imported_keys(&self, table: &str) -> Result<Vec<KeyColumn>> {
        let rows = sqlx::query(
            "SELECT id, seq, \"table\" AS pk_table, \"from\" AS fk_column, \"to\" AS pk_column \
             FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CopyError::pool(e, "loading SQLite imported keys"))?;

        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            let decode = |e: sqlx::Error| CopyError::pool(e, "loading SQLite imported keys");
            let id: i64 = row.try_get("id").map_err(decode)?;
            let seq: i64 = row.try_get("seq").map_err(decode)?;
            let pk_table: String = row.try_get("pk_table").map_err(decode)?;
            let fk_column: String = row.try_get("fk_column").map_err(decode)?;
            let pk_column: Option<String> = row.try_get("pk_column").map_err(decode)?;

            let pk_column = match pk_column {
                Some(c) => c,
                None => self
                    .primary_key(&pk_table)
                    .await?
                    .get(seq as usize)
                    .cloned()
                    .ok_or_else(|| {
                        CopyError::Schema(format!(
                            "Foreign key {} on '{}' references '{}' without a matching primary key",
                            id, table, pk_table
                        ))
                    })?,
            };

            keys.push(KeyColumn {
                key_name: format!("{}_fk_{}", table, id),
                pk_table,
                pk_column,
                fk_table: table.to_string(),
                fk_column,
            });
        }
        Ok(keys)
    }

    async fn fetch_rows(
        &self,
        sql: &str,
        params: &[ColumnData],
        table: &Arc<Table>,
    ) -> Result<Vec<DataRow>> {
        let rows = bind_params(sqlx::query(sql), params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CopyError::query(sql, e))?;
        decode_rows(&rows, table)
    }

    async fn begin(&self) -> Result<Box<dyn Session>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CopyError::target(e, "starting SQLite transaction"))?;
        Ok(Box::new(SqliteSession { tx }))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// A transaction holding one pooled SQLite connection.
struct SqliteSession {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl Session for SqliteSession {
    async fn prepare(&mut self, sql: &str) -> Result<()> {
        (&mut *self.tx)
            .prepare(sql)
            .await
            .map_err(|e| CopyError::query(sql, e))?;
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[ColumnData]) -> Result<u64> {
        let result = bind_params(sqlx::query(sql), params)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| CopyError::query(sql, e))?;
        Ok(result.rows_affected())
    }

    async fn count(&mut self, sql: &str, params: &[ColumnData]) -> Result<i64> {
        let row = bind_params(sqlx::query(sql), params)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| CopyError::query(sql, e))?;
        row.try_get::<i64, _>(0)
            .map_err(|e| CopyError::query(sql, e))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| CopyError::target(e, "committing SQLite transaction"))
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| CopyError::target(e, "rolling back SQLite transaction"))
    }
}
