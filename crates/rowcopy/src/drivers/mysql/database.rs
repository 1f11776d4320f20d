//! MySQL/MariaDB database implementation.
//!
//! Uses SQLx for connection pooling. Catalog queries read INFORMATION_SCHEMA for
//! the connection's default database. String catalog columns are cast to CHAR to
//! avoid collation-dependent binary results.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::mysql::{MySql, MySqlArguments, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column as _, Executor, Row, Transaction, ValueRef};
use tracing::{debug, warn};

use super::dialect::map_data_type;
use crate::core::{
    Column, ColumnData, DataRow, Database, Dialect, KeyColumn, Session, SqlType, SqlValue, Table,
};
use crate::drivers::common::{decode_row, match_result_columns};
use crate::drivers::DialectImpl;
use crate::error::{CopyError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum pooled connections.
const MAX_CONNECTIONS: u32 = 8;

type MysqlQuery<'q> = Query<'q, MySql, MySqlArguments>;

/// MySQL/MariaDB database backed by an sqlx pool.
pub struct MysqlDatabase {
    pool: MySqlPool,
    dialect: DialectImpl,
}

impl MysqlDatabase {
    /// Connect using a `mysql://` URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect(url)
            .await
            .map_err(|e| CopyError::pool(e, "creating MySQL pool"))?;

        // Test connection
        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| CopyError::pool(e, "testing MySQL connection"))?;

        debug!("Opened MySQL pool");
        Ok(Self {
            pool,
            dialect: DialectImpl::mysql(),
        })
    }

    async fn strings(&self, sql: &str, table: &str, context: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(sql)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CopyError::pool(e, context))?;
        rows.iter()
            .map(|r| {
                r.try_get::<String, _>(0)
                    .map(|s| s.to_lowercase())
                    .map_err(|e| CopyError::pool(e, context))
            })
            .collect()
    }

    async fn foreign_keys(&self, side: &str, table: &str) -> Result<Vec<KeyColumn>> {
        let sql = format!(
            r#"
            SELECT
                CAST(CONSTRAINT_NAME AS CHAR(255)),
                CAST(TABLE_NAME AS CHAR(255)),
                CAST(COLUMN_NAME AS CHAR(255)),
                CAST(REFERENCED_TABLE_NAME AS CHAR(255)),
                CAST(REFERENCED_COLUMN_NAME AS CHAR(255))
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = DATABASE()
              AND REFERENCED_TABLE_SCHEMA = DATABASE()
              AND REFERENCED_TABLE_NAME IS NOT NULL
              AND {} = ?
            ORDER BY TABLE_NAME, CONSTRAINT_NAME, ORDINAL_POSITION
            "#,
            side
        );
        let rows = sqlx::query(&sql)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CopyError::pool(e, "loading MySQL foreign keys"))?;

        rows.iter()
            .map(|row| {
                let get = |i: usize| {
                    row.try_get::<String, _>(i)
                        .map_err(|e| CopyError::pool(e, "loading MySQL foreign keys"))
                };
                Ok(KeyColumn {
                    key_name: get(0)?,
                    fk_table: get(1)?,
                    fk_column: get(2)?,
                    pk_table: get(3)?,
                    pk_column: get(4)?,
                })
            })
            .collect()
    }
}

fn bind_param<'q>(query: MysqlQuery<'q>, param: &ColumnData) -> MysqlQuery<'q> {
    match &param.value {
        None => match param.sql_type {
            SqlType::Bool => query.bind(None::<bool>),
            SqlType::I16 | SqlType::I32 | SqlType::I64 => query.bind(None::<i64>),
            SqlType::F32 | SqlType::F64 => query.bind(None::<f64>),
            SqlType::Bytes => query.bind(None::<Vec<u8>>),
            _ => query.bind(None::<String>),
        },
        Some(SqlValue::Bool(v)) => query.bind(*v),
        Some(SqlValue::I16(v)) => query.bind(*v),
        Some(SqlValue::I32(v)) => query.bind(*v),
        Some(SqlValue::I64(v)) => query.bind(*v),
        Some(SqlValue::F32(v)) => query.bind(*v),
        Some(SqlValue::F64(v)) => query.bind(*v),
        Some(SqlValue::Decimal(v)) => query.bind(*v),
        Some(SqlValue::Text(v)) => query.bind(v.clone()),
        Some(SqlValue::Bytes(v)) => query.bind(v.clone()),
        // sqlx would send 16 raw bytes; CHAR(36) columns are the common layout
        Some(SqlValue::Uuid(v)) => query.bind(v.to_string()),
        Some(SqlValue::Date(v)) => query.bind(*v),
        Some(SqlValue::Time(v)) => query.bind(*v),
        Some(SqlValue::DateTime(v)) => query.bind(*v),
        Some(SqlValue::DateTimeOffset(v)) => query.bind(v.with_timezone(&Utc)),
    }
}

fn bind_params<'q>(query: MysqlQuery<'q>, params: &[ColumnData]) -> MysqlQuery<'q> {
    params.iter().fold(query, bind_param)
}

fn decode_value(
    row: &MySqlRow,
    index: usize,
    sql_type: &SqlType,
) -> std::result::Result<Option<SqlValue>, String> {
    let is_null = row
        .try_get_raw(index)
        .map(|r| r.is_null())
        .map_err(|e| e.to_string())?;
    if is_null {
        return Ok(None);
    }

    let value = match sql_type {
        SqlType::Bool => row
            .try_get_unchecked::<i64, _>(index)
            .map(|v| SqlValue::Bool(v != 0)),
        SqlType::I16 => row.try_get_unchecked::<i64, _>(index).map(|v| {
            i16::try_from(v).map_or(SqlValue::I64(v), SqlValue::I16)
        }),
        SqlType::I32 => row.try_get_unchecked::<i64, _>(index).map(|v| {
            i32::try_from(v).map_or(SqlValue::I64(v), SqlValue::I32)
        }),
        SqlType::I64 => row.try_get_unchecked::<i64, _>(index).map(SqlValue::I64),
        SqlType::F32 => row.try_get::<f32, _>(index).map(SqlValue::F32),
        SqlType::F64 => row.try_get::<f64, _>(index).map(SqlValue::F64),
        SqlType::Decimal => row
            .try_get::<rust_decimal::Decimal, _>(index)
            .map(SqlValue::Decimal),
        SqlType::Bytes => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(SqlValue::Bytes),
        SqlType::Uuid => row.try_get_unchecked::<String, _>(index).map(|s| {
            uuid::Uuid::parse_str(&s).map_or(SqlValue::Text(s.clone()), SqlValue::Uuid)
        }),
        SqlType::Date => row
            .try_get::<chrono::NaiveDate, _>(index)
            .map(SqlValue::Date),
        SqlType::Time => row
            .try_get::<chrono::NaiveTime, _>(index)
            .map(SqlValue::Time),
        SqlType::DateTime | SqlType::DateTimeOffset => row
            .try_get::<chrono::NaiveDateTime, _>(index)
            .map(SqlValue::DateTime),
        SqlType::Text => row
            .try_get_unchecked::<String, _>(index)
            .map(SqlValue::Text),
        SqlType::Other(name) => match row.try_get_unchecked::<String, _>(index) {
            Ok(s) => Ok(SqlValue::Text(s)),
            Err(e) => {
                warn!(
                    "Column '{}' of type {} cannot be read as text, copying NULL: {}",
                    row.columns()[index].name(),
                    name,
                    e
                );
                return Ok(None);
            }
        },
    };
    value.map(Some).map_err(|e| e.to_string())
}

fn decode_rows(rows: &[MySqlRow], table: &Arc<Table>) -> Result<Vec<DataRow>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let columns = match_result_columns(table, first.columns().iter().map(|c| c.name()));
    rows.iter()
        .map(|row| decode_row(table, &columns, |c| decode_value(row, c.index, &c.sql_type)))
        .collect()
}

#[async_trait]
impl Database for MysqlDatabase {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT CAST(TABLE_NAME AS CHAR(255)) FROM INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' \
             ORDER BY TABLE_NAME",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CopyError::pool(e, "listing MySQL tables"))?;

        rows.iter()
            .map(|r| {
                r.try_get::<String, _>(0)
                    .map_err(|e| CopyError::pool(e, "listing MySQL tables"))
            })
            .collect()
    }

    async fn columns(&self, table: &str) -> Result<Vec<Column>> {
        let rows = sqlx::query(
            r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)),
                CAST(DATA_TYPE AS CHAR(255)),
                CAST(COLUMN_TYPE AS CHAR(255)),
                CAST(IS_NULLABLE AS CHAR(3))
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CopyError::pool(e, "loading MySQL columns"))?;

        rows.iter()
            .map(|row| {
                let decode = |e| CopyError::pool(e, "loading MySQL columns");
                let name: String = row.try_get(0).map_err(decode)?;
                let data_type: String = row.try_get(1).map_err(decode)?;
                let column_type: String = row.try_get(2).map_err(decode)?;
                let nullable: String = row.try_get(3).map_err(decode)?;
                Ok(Column::new(
                    name,
                    map_data_type(&data_type, &column_type),
                    nullable.eq_ignore_ascii_case("YES"),
                ))
            })
            .collect()
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        self.strings(
            r#"
            SELECT CAST(COLUMN_NAME AS CHAR(255))
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = DATABASE()
              AND TABLE_NAME = ?
              AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
            "#,
            table,
            "loading MySQL primary key",
        )
        .await
    }

    async fn best_row_identifier(&self, table: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT CAST(INDEX_NAME AS CHAR(255)), CAST(COLUMN_NAME AS CHAR(255))
            FROM INFORMATION_SCHEMA.STATISTICS
            WHERE TABLE_SCHEMA = DATABASE()
              AND TABLE_NAME = ?
              AND NON_UNIQUE = 0
              AND INDEX_NAME <> 'PRIMARY'
            ORDER BY INDEX_NAME, SEQ_IN_INDEX
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CopyError::pool(e, "loading MySQL unique keys"))?;

        let mut first: Option<String> = None;
        let mut columns = Vec::new();
        for row in &rows {
            let decode = |e| CopyError::pool(e, "loading MySQL unique keys");
            let index: String = row.try_get(0).map_err(decode)?;
            let column: Option<String> = row.try_get(1).map_err(decode)?;
            match &first {
                None => first = Some(index),
                Some(name) if *name != index => break,
                Some(_) => {}
            }
            // functional key parts have no column
            match column {
                Some(c) => columns.push(c.to_lowercase()),
                None => return Ok(Vec::new()),
            }
        }
        Ok(columns)
    }

    async fn exported_keys(&self, table: &str) -> Result<Vec<KeyColumn>> {
        self.foreign_keys("REFERENCED_TABLE_NAME", table).await
    }

    async fn imported_keys(&self, table: &str) -> Result<Vec<KeyColumn>> {
        self.foreign_keys("TABLE_NAME", table).await
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
            .map_err(|e| CopyError::target(e, "starting MySQL transaction"))?;
        Ok(Box::new(MysqlSession { tx }))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

struct MysqlSession {
    tx: Transaction<'static, MySql>,
}

#[async_trait]
impl Session for MysqlSession {
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
            .map_err(|e| CopyError::target(e, "committing MySQL transaction"))
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| CopyError::target(e, "rolling back MySQL transaction"))
    }
}
