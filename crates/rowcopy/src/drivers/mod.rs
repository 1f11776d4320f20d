//! Database driver implementations.
//!
//! - [`sqlite`]: SQLite via sqlx (also used by the test suite, in memory)
//! - [`postgres`]: PostgreSQL via tokio-postgres and deadpool
//! - [`mysql`]: MySQL/MariaDB via sqlx
//! - [`common`]: shared TLS and result decoding helpers
//!
//! Each driver provides a `Dialect` and a `Database` implementation. Callers
//! obtain a database through [`connect`], which picks the driver from the
//! connection URL scheme.

pub mod common;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

use tracing::info;

pub use mysql::{MysqlDatabase, MysqlDialect};
pub use postgres::{PostgresDatabase, PostgresDialect};
pub use sqlite::{SqliteDatabase, SqliteDialect};

use crate::core::{ColumnData, Database, Dialect, SqlType};
use crate::error::{CopyError, Result};

/// Enum-based static dispatch for dialects.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Sqlite(SqliteDialect),
    Postgres(PostgresDialect),
    Mysql(MysqlDialect),
}

impl DialectImpl {
    pub fn sqlite() -> Self {
        DialectImpl::Sqlite(SqliteDialect)
    }

    pub fn postgres() -> Self {
        DialectImpl::Postgres(PostgresDialect)
    }

    pub fn mysql() -> Self {
        DialectImpl::Mysql(MysqlDialect)
    }

    pub fn for_kind(kind: DatabaseKind) -> Self {
        match kind {
            DatabaseKind::Sqlite => Self::sqlite(),
            DatabaseKind::Postgres => Self::postgres(),
            DatabaseKind::Mysql => Self::mysql(),
        }
    }
}

impl Dialect for DialectImpl {
    fn name(&self) -> &str {
        match self {
            DialectImpl::Sqlite(d) => d.name(),
            DialectImpl::Postgres(d) => d.name(),
            DialectImpl::Mysql(d) => d.name(),
        }
    }

    fn quote_ident(&self, name: &str) -> String {
        match self {
            DialectImpl::Sqlite(d) => d.quote_ident(name),
            DialectImpl::Postgres(d) => d.quote_ident(name),
            DialectImpl::Mysql(d) => d.quote_ident(name),
        }
    }

    fn param_placeholder(&self, index: usize, sql_type: &SqlType) -> String {
        match self {
            DialectImpl::Sqlite(d) => d.param_placeholder(index, sql_type),
            DialectImpl::Postgres(d) => d.param_placeholder(index, sql_type),
            DialectImpl::Mysql(d) => d.param_placeholder(index, sql_type),
        }
    }

    fn build_insert_query(
        &self,
        table: &str,
        columns: &[ColumnData],
        rows: usize,
        ignore_existing: bool,
    ) -> String {
        match self {
            DialectImpl::Sqlite(d) => d.build_insert_query(table, columns, rows, ignore_existing),
            DialectImpl::Postgres(d) => d.build_insert_query(table, columns, rows, ignore_existing),
            DialectImpl::Mysql(d) => d.build_insert_query(table, columns, rows, ignore_existing),
        }
    }
}

/// Shared `t(c1,c2)\nVALUES(p1,p2),\n(p3,p4)` body. Placeholders are
/// numbered across all rows.
pub(crate) fn insert_body(
    dialect: &dyn Dialect,
    table: &str,
    columns: &[ColumnData],
    rows: usize,
) -> String {
    let names: Vec<String> = columns
        .iter()
        .map(|c| dialect.quote_ident(&c.column_name))
        .collect();
    let value_rows: Vec<String> = (0..rows.max(1))
        .map(|row| {
            let placeholders: Vec<String> = columns
                .iter()
                .enumerate()
                .map(|(i, c)| dialect.param_placeholder(row * columns.len() + i + 1, &c.sql_type))
                .collect();
            format!("({})", placeholders.join(","))
        })
        .collect();
    format!(
        "{}({})\nVALUES{}",
        dialect.quote_table(table),
        names.join(","),
        value_rows.join(",\n")
    )
}

/// Database engines recognised in connection URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    Sqlite,
    Postgres,
    Mysql,
}

impl DatabaseKind {
    /// Determine the engine from a connection URL.
    ///
    /// A leading `jdbc:` prefix is accepted and ignored.
    pub fn from_url(url: &str) -> Result<Self> {
        let url = strip_jdbc_prefix(url);
        let scheme = url
            .split_once(':')
            .map(|(scheme, _)| scheme.to_lowercase())
            .ok_or_else(|| CopyError::Config(format!("Invalid connection string: {}", url)))?;

        match scheme.as_str() {
            "sqlite" => Ok(DatabaseKind::Sqlite),
            "postgres" | "postgresql" => Ok(DatabaseKind::Postgres),
            "mysql" | "mariadb" => Ok(DatabaseKind::Mysql),
            other => Err(CopyError::Config(format!(
                "Connection scheme '{}' is not supported. Supported schemes: sqlite, postgresql, mysql, mariadb",
                other
            ))),
        }
    }
}

/// Remove an optional `jdbc:` prefix.
pub fn strip_jdbc_prefix(url: &str) -> &str {
    url.strip_prefix("jdbc:").unwrap_or(url)
}

/// Replace the credentials embedded in a network URL.
pub(crate) fn with_credentials(
    url: &str,
    user: Option<&str>,
    password: Option<&str>,
) -> Result<String> {
    if user.is_none() && password.is_none() {
        return Ok(url.to_string());
    }
    let mut parsed = url::Url::parse(url)
        .map_err(|e| CopyError::Config(format!("Invalid connection URL: {}", e)))?;
    if let Some(user) = user {
        parsed
            .set_username(user)
            .map_err(|_| CopyError::Config("Connection URL cannot carry a user name".into()))?;
    }
    if let Some(password) = password {
        parsed
            .set_password(Some(password))
            .map_err(|_| CopyError::Config("Connection URL cannot carry a password".into()))?;
    }
    Ok(parsed.to_string())
}

/// Connect to the database named by `url`.
///
/// `user` and `password` take precedence over credentials embedded in the URL.
pub async fn connect(
    url: &str,
    user: Option<&str>,
    password: Option<&str>,
) -> Result<Arc<dyn Database>> {
    let kind = DatabaseKind::from_url(url)?;
    let url = strip_jdbc_prefix(url);

    let db: Arc<dyn Database> = match kind {
        DatabaseKind::Sqlite => Arc::new(SqliteDatabase::connect(url).await?),
        DatabaseKind::Postgres => {
            let url = with_credentials(url, user, password)?;
            Arc::new(PostgresDatabase::connect(&url).await?)
        }
        DatabaseKind::Mysql => {
            // sqlx only understands the mysql scheme
            let url = url.replacen("mariadb:", "mysql:", 1);
            let url = with_credentials(&url, user, password)?;
            Arc::new(MysqlDatabase::connect(&url).await?)
        }
    };

    info!("Connected to {} database", db.db_type());
    Ok(db)
}
