//! Shared helpers for the driver implementations.
//!
//! - [`tls`]: TLS setup for PostgreSQL connections
//! - result-set decoding shared by every driver

pub mod tls;

use std::sync::Arc;

use crate::core::{ColumnData, DataRow, SqlType, SqlValue, Table};
use crate::error::{CopyError, Result};

pub use tls::SslMode;

/// Position of a declared table column inside a result set.
pub struct ResultColumn {
    pub index: usize,
    pub name: String,
    pub sql_type: SqlType,
}

/// Match result-set column names (lowercased) to the table's declared columns.
///
/// Result columns the table does not declare are dropped.
pub fn match_result_columns<'a, I>(table: &Table, names: I) -> Vec<ResultColumn>
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .enumerate()
        .filter_map(|(index, name)| {
            let name = name.to_lowercase();
            table.column(&name).map(|col| ResultColumn {
                index,
                name,
                sql_type: col.sql_type.clone(),
            })
        })
        .collect()
}

/// Build a [`DataRow`] by decoding each matched column with `decode`.
pub fn decode_row<F>(table: &Arc<Table>, columns: &[ResultColumn], mut decode: F) -> Result<DataRow>
where
    F: FnMut(&ResultColumn) -> std::result::Result<Option<SqlValue>, String>,
{
    let mut values = Vec::with_capacity(columns.len());
    for column in columns {
        let value = decode(column).map_err(|message| CopyError::Decode {
            table: table.name.clone(),
            column: column.name.clone(),
            message,
        })?;
        values.push(ColumnData::new(&column.name, column.sql_type.clone(), value));
    }
    Ok(DataRow::new(Arc::clone(table), values))
}
