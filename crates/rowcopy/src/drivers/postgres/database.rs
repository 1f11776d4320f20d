//! PostgreSQL database implementation.
//!
//! Uses deadpool-postgres for connection pooling. Catalog queries are scoped to
//! `current_schema()`. Every parameter is sent as text and cast by the placeholder,
//! which keeps binding independent of the value's Rust type.

use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Config as PgConfig, NoTls, Row};
use tracing::{debug, warn};

use super::dialect::map_udt_name;
use crate::core::{
    Column, ColumnData, DataRow, Database, Dialect, KeyColumn, Session, SqlValue, Table,
};
use crate::drivers::common::{decode_row, match_result_columns, SslMode};
use crate::drivers::DialectImpl;
use crate::error::{CopyError, Result};

/// Maximum pooled connections.
const MAX_POOL_SIZE: usize = 8;

const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT
        c.conname::text,
        t.relname::text AS fk_table,
        a.attname::text AS fk_column,
        rt.relname::text AS pk_table,
        ra.attname::text AS pk_column
    FROM pg_catalog.pg_constraint c
    JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
    JOIN pg_catalog.pg_class rt ON rt.oid = c.confrelid
    JOIN pg_catalog.pg_namespace rn ON rn.oid = rt.relnamespace
    CROSS JOIN LATERAL unnest(c.conkey, c.confkey) WITH ORDINALITY AS k(fk_attnum, pk_attnum, pos)
    JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.fk_attnum
    JOIN pg_catalog.pg_attribute ra ON ra.attrelid = rt.oid AND ra.attnum = k.pk_attnum
    WHERE c.contype = 'f'
      AND n.nspname = current_schema()
      AND rn.nspname = current_schema()
"#;

/// PostgreSQL database backed by a deadpool pool.
pub struct PostgresDatabase {
    pool: Pool,
    dialect: DialectImpl,
}

impl PostgresDatabase {
    /// Connect using a `postgres://` URL.
    ///
    /// An `sslmode` query parameter selects TLS; see [`SslMode`].
    pub async fn connect(url: &str) -> Result<Self> {
        let (url, ssl_mode) = SslMode::extract(url)?;
        let pg_config: PgConfig = url.parse().map_err(|e| {
            CopyError::Config(format!("Invalid PostgreSQL connection string: {}", e))
        })?;

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let pool = match ssl_mode.connector()? {
            None => {
                let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
                Pool::builder(mgr).max_size(MAX_POOL_SIZE).build()
            }
            Some(tls) => {
                let mgr = Manager::from_config(pg_config, tls, mgr_config);
                Pool::builder(mgr).max_size(MAX_POOL_SIZE).build()
            }
        }
        .map_err(|e| CopyError::pool(e, "creating PostgreSQL pool"))?;

        // Test connection
        let client = pool
            .get()
            .await
            .map_err(|e| CopyError::pool(e, "testing PostgreSQL connection"))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| CopyError::pool(e, "testing PostgreSQL connection"))?;

        debug!("Opened PostgreSQL pool (sslmode {:?})", ssl_mode);
        Ok(Self {
            pool,
            dialect: DialectImpl::postgres(),
        })
    }

    async fn client(&self, context: &str) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| CopyError::pool(e, format!("getting connection for {}", context)))
    }

    async fn strings(&self, sql: &str, table: &str, context: &str) -> Result<Vec<String>> {
        let client = self.client(context).await?;
        let rows = client
            .query(sql, &[&table])
            .await
            .map_err(|e| CopyError::pool(e, context))?;
        rows.iter()
            .map(|r| {
                r.try_get::<_, String>(0)
                    .map(|s| s.to_lowercase())
                    .map_err(|e| CopyError::pool(e, context))
            })
            .collect()
    }

    async fn foreign_keys(&self, side: &str, table: &str) -> Result<Vec<KeyColumn>> {
        let sql = format!(
            "{} AND {}.relname = $1\nORDER BY c.conname, t.relname, k.pos",
            FOREIGN_KEYS_QUERY, side
        );
        let client = self.client("load_foreign_keys").await?;
        let rows = client
            .query(sql.as_str(), &[&table])
            .await
            .map_err(|e| CopyError::pool(e, "loading PostgreSQL foreign keys"))?;

        rows.iter()
            .map(|row| {
                let get = |i: usize| {
                    row.try_get::<_, String>(i)
                        .map_err(|e| CopyError::pool(e, "loading PostgreSQL foreign keys"))
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

/// Render parameters in PostgreSQL's text input format.
fn text_params(params: &[ColumnData]) -> Vec<Option<String>> {
    params
        .iter()
        .map(|p| match &p.value {
            None => None,
            Some(SqlValue::Bytes(b)) => Some(format!("\\x{}", hex::encode(b))),
            Some(v) => Some(v.to_text()),
        })
        .collect()
}

fn param_refs(values: &[Option<String>]) -> Vec<&(dyn ToSql + Sync)> {
    values.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

async fn prepare_text(client: &Object, sql: &str, count: usize) -> Result<tokio_postgres::Statement> {
    client
        .prepare_typed_cached(sql, &vec![Type::TEXT; count])
        .await
        .map_err(|e| CopyError::query(sql, e))
}

fn decode_value(row: &Row, index: usize) -> std::result::Result<Option<SqlValue>, String> {
    let type_name = row.columns()[index].type_().name().to_string();
    let value = match type_name.as_str() {
        "bool" => row
            .try_get::<_, Option<bool>>(index)
            .map(|v| v.map(SqlValue::Bool)),
        "int2" => row
            .try_get::<_, Option<i16>>(index)
            .map(|v| v.map(SqlValue::I16)),
        "int4" => row
            .try_get::<_, Option<i32>>(index)
            .map(|v| v.map(SqlValue::I32)),
        "int8" => row
            .try_get::<_, Option<i64>>(index)
            .map(|v| v.map(SqlValue::I64)),
        "float4" => row
            .try_get::<_, Option<f32>>(index)
            .map(|v| v.map(SqlValue::F32)),
        "float8" => row
            .try_get::<_, Option<f64>>(index)
            .map(|v| v.map(SqlValue::F64)),
        "numeric" => row
            .try_get::<_, Option<rust_decimal::Decimal>>(index)
            .map(|v| v.map(SqlValue::Decimal)),
        "bytea" => row
            .try_get::<_, Option<Vec<u8>>>(index)
            .map(|v| v.map(SqlValue::Bytes)),
        "uuid" => row
            .try_get::<_, Option<uuid::Uuid>>(index)
            .map(|v| v.map(SqlValue::Uuid)),
        "date" => row
            .try_get::<_, Option<chrono::NaiveDate>>(index)
            .map(|v| v.map(SqlValue::Date)),
        "time" => row
            .try_get::<_, Option<chrono::NaiveTime>>(index)
            .map(|v| v.map(SqlValue::Time)),
        "timestamp" => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(index)
            .map(|v| v.map(SqlValue::DateTime)),
        "timestamptz" => row
            .try_get::<_, Option<chrono::DateTime<chrono::FixedOffset>>>(index)
            .map(|v| v.map(SqlValue::DateTimeOffset)),
        "json" | "jsonb" => row
            .try_get::<_, Option<serde_json::Value>>(index)
            .map(|v| v.map(|j| SqlValue::Text(j.to_string()))),
        _ => match row.try_get::<_, Option<String>>(index) {
            Ok(v) => Ok(v.map(SqlValue::Text)),
            Err(e) => {
                warn!(
                    "Column '{}' of type {} cannot be read as text, copying NULL: {}",
                    row.columns()[index].name(),
                    type_name,
                    e
                );
                Ok(None)
            }
        },
    };
    value.map_err(|e| e.to_string())
}

fn decode_rows(rows: &[Row], table: &Arc<Table>) -> Result<Vec<DataRow>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let columns = match_result_columns(table, first.columns().iter().map(|c| c.name()));
    rows.iter()
        .map(|row| decode_row(table, &columns, |c| decode_value(row, c.index)))
        .collect()
}

#[async_trait]
impl Database for PostgresDatabase {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let client = self.client("list_tables").await?;
        let rows = client
            .query(
                "SELECT table_name::text FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
                 ORDER BY table_name",
                &[],
            )
            .await
            .map_err(|e| CopyError::pool(e, "listing PostgreSQL tables"))?;
        rows.iter()
            .map(|r| {
                r.try_get::<_, String>(0)
                    .map_err(|e| CopyError::pool(e, "listing PostgreSQL tables"))
            })
            .collect()
    }

    async fn columns(&self, table: &str) -> Result<Vec<Column>> {
        let client = self.client("load_columns").await?;
        let rows = client
            .query(
                r#"
                SELECT column_name::text, udt_name::text, is_nullable = 'YES'
                FROM information_schema.columns
                WHERE table_schema = current_schema() AND table_name::text = $1
                ORDER BY ordinal_position
                "#,
                &[&table],
            )
            .await
            .map_err(|e| CopyError::pool(e, "loading PostgreSQL columns"))?;

        rows.iter()
            .map(|row| {
                let decode = |e| CopyError::pool(e, "loading PostgreSQL columns");
                let name: String = row.try_get(0).map_err(decode)?;
                let udt: String = row.try_get(1).map_err(decode)?;
                let nullable: bool = row.try_get(2).map_err(decode)?;
                Ok(Column::new(name, map_udt_name(&udt), nullable))
            })
            .collect()
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        self.strings(
            r#"
            SELECT a.attname::text
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid
            WHERE n.nspname = current_schema()
              AND t.relname = $1
              AND c.contype = 'p'
              AND a.attnum = ANY(c.conkey)
            ORDER BY array_position(c.conkey, a.attnum)
            "#,
            table,
            "loading PostgreSQL primary key",
        )
        .await
    }

    async fn best_row_identifier(&self, table: &str) -> Result<Vec<String>> {
        let client = self.client("best_row_identifier").await?;
        let rows = client
            .query(
                r#"
                SELECT c.conname::text, a.attname::text
                FROM pg_catalog.pg_constraint c
                JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
                JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
                JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(c.conkey)
                WHERE n.nspname = current_schema()
                  AND t.relname = $1
                  AND c.contype = 'u'
                ORDER BY c.conname, array_position(c.conkey, a.attnum)
                "#,
                &[&table],
            )
            .await
            .map_err(|e| CopyError::pool(e, "loading PostgreSQL unique keys"))?;

        let mut first: Option<String> = None;
        let mut columns = Vec::new();
        for row in &rows {
            let decode = |e| CopyError::pool(e, "loading PostgreSQL unique keys");
            let constraint: String = row.try_get(0).map_err(decode)?;
            let column: String = row.try_get(1).map_err(decode)?;
            match &first {
                None => first = Some(constraint),
                Some(name) if *name != constraint => break,
                Some(_) => {}
            }
            columns.push(column.to_lowercase());
        }
        Ok(columns)
    }

    async fn exported_keys(&self, table: &str) -> Result<Vec<KeyColumn>> {
        self.foreign_keys("rt", table).await
    }

    async fn imported_keys(&self, table: &str) -> Result<Vec<KeyColumn>> {
        self.foreign_keys("t", table).await
    }

    async fn fetch_rows(
        &self,
        sql: &str,
        params: &[ColumnData],
        table: &Arc<Table>,
    ) -> Result<Vec<DataRow>> {
        let client = self.client("fetch_rows").await?;
        let stmt = prepare_text(&client, sql, params.len()).await?;
        let values = text_params(params);
        let rows = client
            .query(&stmt, &param_refs(&values))
            .await
            .map_err(|e| CopyError::query(sql, e))?;
        decode_rows(&rows, table)
    }

    async fn begin(&self) -> Result<Box<dyn Session>> {
        let client = self.client("transaction").await?;
        client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| CopyError::target(e, "starting PostgreSQL transaction"))?;
        Ok(Box::new(PostgresSession {
            client: Some(client),
            open: true,
        }))
    }

    async fn close(&self) {
        self.pool.close();
    }
}

/// An explicit `BEGIN` ... `COMMIT` block on one pooled connection.
struct PostgresSession {
    client: Option<Object>,
    open: bool,
}

impl PostgresSession {
    fn client(&self) -> Result<&Object> {
        self.client
            .as_ref()
            .ok_or_else(|| CopyError::target("transaction already finished", "PostgreSQL session"))
    }

    async fn finish(&mut self, command: &str) -> Result<()> {
        self.client()?
            .batch_execute(command)
            .await
            .map_err(|e| CopyError::target(e, format!("running {}", command)))?;
        self.open = false;
        Ok(())
    }
}

#[async_trait]
impl Session for PostgresSession {
    async fn prepare(&mut self, sql: &str) -> Result<()> {
        self.client()?
            .prepare_cached(sql)
            .await
            .map_err(|e| CopyError::query(sql, e))?;
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[ColumnData]) -> Result<u64> {
        let client = self.client()?;
        let stmt = prepare_text(client, sql, params.len()).await?;
        let values = text_params(params);
        client
            .execute(&stmt, &param_refs(&values))
            .await
            .map_err(|e| CopyError::query(sql, e))
    }

    async fn count(&mut self, sql: &str, params: &[ColumnData]) -> Result<i64> {
        let client = self.client()?;
        let stmt = prepare_text(client, sql, params.len()).await?;
        let values = text_params(params);
        let row = client
            .query_one(&stmt, &param_refs(&values))
            .await
            .map_err(|e| CopyError::query(sql, e))?;
        row.try_get::<_, i64>(0)
            .map_err(|e| CopyError::query(sql, e))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut session = self;
        session.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let mut session = self;
        session.finish("ROLLBACK").await
    }
}

impl Drop for PostgresSession {
    fn drop(&mut self) {
        if self.open {
            if let Some(client) = self.client.take() {
                // detach from the pool; closing the connection aborts the transaction
                drop(Object::take(client));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlType;
    use chrono::NaiveDate;

    #[test]
    fn test_text_params() {
        let params = vec![
            ColumnData::value("id", 7i64),
            ColumnData::null("note", SqlType::Text),
            ColumnData::value("payload", vec![0xde_u8, 0xad]),
            ColumnData::value("born", NaiveDate::from_ymd_opt(2021, 3, 4).unwrap()),
        ];
        assert_eq!(
            text_params(&params),
            vec![
                Some("7".to_string()),
                None,
                Some("\\xdead".to_string()),
                Some("2021-03-04".to_string()),
            ]
        );
    }

    #[test]
    fn test_foreign_key_query_orders_by_position() {
        assert!(FOREIGN_KEYS_QUERY.contains("WITH ORDINALITY"));
        assert!(FOREIGN_KEYS_QUERY.contains("current_schema()"));
    }
}
