//! Core traits for database-agnostic row copying.
//!
//! - [`Database`]: catalog introspection, row retrieval and transactions
//! - [`Session`]: one transaction on one connection, used by writers
//! - [`Dialect`]: SQL syntax strategy for different database engines
//!
//! # Design Patterns
//!
//! - **Strategy**: `Dialect` provides interchangeable quoting and placeholder rules
//! - **Template Method**: [`Database::load_table`] assembles a table from the
//!   individual catalog calls each driver implements

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

use super::data::{ColumnData, DataRow};
use super::identifier::validate_identifier;
use super::schema::{group_key_columns, Column, KeyColumn, Table};
use super::value::SqlType;

/// SQL syntax strategy for a database engine.
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier (e.g., "sqlite", "postgres").
    fn name(&self) -> &str;

    /// Quote an identifier (table name, column name, alias).
    ///
    /// - SQLite/PostgreSQL: `"identifier"`
    /// - MySQL: `` `identifier` ``
    fn quote_ident(&self, name: &str) -> String;

    /// Quote a possibly schema-qualified table name segment by segment.
    fn quote_table(&self, name: &str) -> String {
        name.split('.')
            .map(|part| self.quote_ident(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Get a parameter placeholder for the given 1-based index.
    ///
    /// The type is available for dialects that bind text and cast server side.
    fn param_placeholder(&self, index: usize, sql_type: &SqlType) -> String;

    /// Build an `INSERT` of `rows` rows with the given columns, one
    /// parenthesized placeholder list per row.
    ///
    /// With `ignore_existing`, rows that collide with an existing key are skipped
    /// instead of failing the statement.
    fn build_insert_query(
        &self,
        table: &str,
        columns: &[ColumnData],
        rows: usize,
        ignore_existing: bool,
    ) -> String;
}

/// A database connection pool as seen by the schema builder, walker and writers.
#[async_trait]
pub trait Database: Send + Sync {
    /// SQL syntax for this database.
    fn dialect(&self) -> &dyn Dialect;

    /// Get the database type identifier.
    fn db_type(&self) -> &str;

    /// Names of all base tables in the connected schema.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Columns of a table in declaration order, names lowercased.
    async fn columns(&self, table: &str) -> Result<Vec<Column>>;

    /// Declared primary key columns; empty when there is none.
    async fn primary_key(&self, table: &str) -> Result<Vec<String>>;

    /// Columns of the first unique key, used when no primary key is declared.
    async fn best_row_identifier(&self, table: &str) -> Result<Vec<String>>;

    /// Foreign keys referencing this table ("exported keys"), grouped per constraint.
    async fn exported_keys(&self, table: &str) -> Result<Vec<KeyColumn>>;

    /// Foreign keys declared on this table ("imported keys"), grouped per constraint.
    async fn imported_keys(&self, table: &str) -> Result<Vec<KeyColumn>>;

    /// Load complete metadata for one table.
    ///
    /// Falls back to the best row identifier when the table declares no primary key.
    async fn load_table(&self, name: &str) -> Result<Table> {
        validate_identifier(name)?;

        let columns = self.columns(name).await?;
        let mut table = Table::new(name, columns);
        table.outbound = group_key_columns(&self.exported_keys(name).await?)
            .into_iter()
            .collect();
        table.inbound = group_key_columns(&self.imported_keys(name).await?)
            .into_iter()
            .collect();

        let mut key = self.primary_key(name).await?;
        if key.is_empty() {
            key = self.best_row_identifier(name).await?;
        }
        Ok(table.with_primary_key(key))
    }

    /// Run a query and decode every result row against `table`'s declared columns.
    ///
    /// Result-set column names are lowercased before lookup. Columns the table does
    /// not declare are ignored.
    async fn fetch_rows(
        &self,
        sql: &str,
        params: &[ColumnData],
        table: &Arc<Table>,
    ) -> Result<Vec<DataRow>>;

    /// Start a transaction on a dedicated connection.
    async fn begin(&self) -> Result<Box<dyn Session>>;

    /// Close all connections.
    async fn close(&self);
}

/// One open transaction. Dropping a session without committing rolls it back.
#[async_trait]
pub trait Session: Send {
    /// Prepare a statement without executing it.
    async fn prepare(&mut self, sql: &str) -> Result<()>;

    /// Execute a write statement, returning affected rows.
    async fn execute(&mut self, sql: &str, params: &[ColumnData]) -> Result<u64>;

    /// Execute a `SELECT COUNT(*)` style query and return the single value.
    async fn count(&mut self, sql: &str, params: &[ColumnData]) -> Result<i64>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
