//! Projection of retrieved rows onto the target schema.
//!
//! [`DataMapper`] checks every row against the target table: source columns
//! the target lacks are an error (or dropped with `skip_missing_columns`),
//! nullable target columns the source lacks are filled with NULL and required
//! ones are an error. All problems of a row are reported together.

use std::sync::Arc;

use tracing::debug;

use crate::core::{ColumnData, DataNode, DataRow, SchemaGraph};
use crate::error::{CopyError, Result};

/// Rewrites a source-shaped tree for a particular target.
pub trait RowMapper: Send + Sync {
    /// Map every row of the tree. The tree shape is preserved.
    fn map_node(&self, node: &DataNode) -> Result<DataNode> {
        let before = node
            .before
            .iter()
            .map(|n| self.map_node(n))
            .collect::<Result<Vec<_>>>()?;
        let after = node
            .after
            .iter()
            .map(|n| self.map_node(n))
            .collect::<Result<Vec<_>>>()?;
        let rows = node
            .rows
            .iter()
            .map(|r| self.map_row(r))
            .collect::<Result<Vec<_>>>()?;
        Ok(DataNode::new(node.table_name.clone(), rows, before, after))
    }

    fn map_row(&self, row: &DataRow) -> Result<DataRow>;
}

/// Passes rows through unchanged. Used when the target is a script.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMapper;

impl RowMapper for IdentityMapper {
    fn map_node(&self, node: &DataNode) -> Result<DataNode> {
        Ok(node.clone())
    }

    fn map_row(&self, row: &DataRow) -> Result<DataRow> {
        Ok(row.clone())
    }
}

/// Maps rows onto the tables of a target [`SchemaGraph`].
#[derive(Debug, Clone)]
pub struct DataMapper {
    target: Arc<SchemaGraph>,
    skip_missing_columns: bool,
}

impl DataMapper {
    pub fn new(target: Arc<SchemaGraph>, skip_missing_columns: bool) -> Self {
        Self {
            target,
            skip_missing_columns,
        }
    }
}

impl RowMapper for DataMapper {
    fn map_row(&self, row: &DataRow) -> Result<DataRow> {
        let name = row.table_name();
        let Some(target) = self.target.table(name) else {
            return Err(CopyError::Validation {
                table: name.to_string(),
                issues: vec![format!(
                    "Table '{}' does not exist in the target database",
                    name
                )],
            });
        };

        let mut issues = Vec::new();
        let (mut columns, unmapped): (Vec<ColumnData>, Vec<ColumnData>) = row
            .columns
            .iter()
            .cloned()
            .partition(|c| target.column(&c.column_name).is_some());

        if !unmapped.is_empty() {
            if self.skip_missing_columns {
                debug!(
                    "Dropping columns {} of {} absent from the target",
                    column_list(&unmapped),
                    name
                );
            } else {
                issues.push(format!(
                    "Columns {} do not exist in table '{}' in the target database",
                    column_list(&unmapped),
                    name
                ));
            }
        }

        let absent = target
            .columns
            .iter()
            .filter(|c| row.column(&c.name).is_none());
        let mut required = Vec::new();
        for column in absent {
            if column.nullable {
                columns.push(ColumnData::null(&column.name, column.sql_type.clone()));
            } else {
                required.push(column.name.as_str());
            }
        }
        if !required.is_empty() {
            issues.push(format!(
                "Required columns [{}] do not exist in table '{}' in the source database",
                required.join(", "),
                name
            ));
        }

        if !issues.is_empty() {
            return Err(CopyError::Validation {
                table: name.to_string(),
                issues,
            });
        }
        Ok(DataRow::new(Arc::clone(target), columns))
    }
}

fn column_list(columns: &[ColumnData]) -> String {
    let names: Vec<&str> = columns.iter().map(|c| c.column_name.as_str()).collect();
    format!("[{}]", names.join(", "))
}
