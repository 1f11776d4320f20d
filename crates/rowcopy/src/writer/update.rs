//! Insert-or-update writer.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, trace};

use super::{finish_transaction, pending_rows, DataWriter, Progress, WriteSummary};
use crate::core::{ColumnData, DataNode, DataRow, Database, Dialect, Session};
use crate::error::{CopyError, Result};

const EXISTS_ALIAS: &str = "t";

/// Updates rows that already exist on the target and inserts the others.
///
/// Existence is checked per row by key. Rows of tables without a primary key
/// are matched on every column, so an existing match is left alone.
pub struct Updater {
    db: Arc<dyn Database>,
    dry_run: bool,
    written: HashSet<DataRow>,
}

/// What to do with one row.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RowAction {
    Update { statement: String, params: Vec<ColumnData> },
    Insert { statement: String, params: Vec<ColumnData> },
    Unchanged,
}

impl Updater {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            dry_run: false,
            written: HashSet::new(),
        }
    }

    /// Check existence but do not execute updates or inserts.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    async fn exists(&self, session: &mut dyn Session, row: &DataRow) -> Result<bool> {
        let dialect = self.db.dialect();
        let mut next_param = 1;
        let filter = row.as_parametrized_filter(EXISTS_ALIAS, dialect, &mut next_param);
        let sql = format!(
            "SELECT COUNT(*) FROM {} {} WHERE {}",
            dialect.quote_table(row.table_name()),
            dialect.quote_ident(EXISTS_ALIAS),
            filter
        );
        trace!("{}", sql);
        let count = session.count(&sql, &row.params_for_select()).await?;
        Ok(count > 0)
    }

    pub(crate) async fn plan(&self, session: &mut dyn Session, row: &DataRow) -> Result<RowAction> {
        let dialect = self.db.dialect();
        if !self.exists(session, row).await? {
            return Ok(RowAction::Insert {
                statement: dialect.build_insert_query(row.table_name(), &row.columns, 1, false),
                params: row.params_for_insert(),
            });
        }
        if !row.table.has_primary_key() || row.non_key_columns().is_empty() {
            return Ok(RowAction::Unchanged);
        }
        Ok(RowAction::Update {
            statement: update_statement(dialect, row),
            params: row.params_for_update(),
        })
    }

    async fn run(
        &self,
        session: &mut dyn Session,
        rows: &[&DataRow],
        summary: &mut WriteSummary,
    ) -> Result<()> {
        let mut progress = Progress::new("Updated", rows.len());
        for (index, row) in rows.iter().enumerate() {
            let table = row.table_name();
            let action = self
                .plan(session, row)
                .await
                .map_err(|e| CopyError::write(table, e))?;

            let (statement, params) = match action {
                RowAction::Update { statement, params } | RowAction::Insert { statement, params } => {
                    (statement, params)
                }
                RowAction::Unchanged => {
                    debug!("Row of {} already present, leaving it unchanged", table);
                    progress.update(index + 1);
                    continue;
                }
            };

            trace!("Executing statement:\n{}", statement);
            session
                .prepare(&statement)
                .await
                .map_err(|e| CopyError::write(table, e))?;
            summary.statements_prepared += 1;
            if !self.dry_run {
                let count = session
                    .execute(&statement, &params)
                    .await
                    .map_err(|e| CopyError::write(table, e))?;
                trace!("Updated {} records", count);
            }
            summary.rows_written += 1;
            progress.update(index + 1);
        }
        progress.finish();
        Ok(())
    }
}

/// `UPDATE t SET c1 = ?, c2 = ? WHERE k1 = ? AND k2 IS NULL`
///
/// Parameters are the non-key columns followed by the non-NULL key columns,
/// matching [`DataRow::params_for_update`].
fn update_statement(dialect: &dyn Dialect, row: &DataRow) -> String {
    let mut next_param = 1;
    let assignments: Vec<String> = row
        .non_key_columns()
        .into_iter()
        .map(|c| {
            let placeholder = dialect.param_placeholder(next_param, &c.sql_type);
            next_param += 1;
            format!("{} = {}", dialect.quote_ident(&c.column_name), placeholder)
        })
        .collect();

    let conditions: Vec<String> = row
        .key_columns()
        .map(|c| {
            let column = dialect.quote_ident(&c.column_name);
            if c.is_null() {
                format!("{} IS NULL", column)
            } else {
                let placeholder = dialect.param_placeholder(next_param, &c.sql_type);
                next_param += 1;
                format!("{} = {}", column, placeholder)
            }
        })
        .collect();

    format!(
        "UPDATE {} SET\n{}\nWHERE\n{}",
        dialect.quote_table(row.table_name()),
        assignments.join(", "),
        conditions.join(" AND ")
    )
}

#[async_trait]
impl DataWriter for Updater {
    async fn write(&mut self, node: &DataNode) -> Result<WriteSummary> {
        let mut summary = WriteSummary::default();
        let rows = pending_rows(node, &self.written, &mut summary);
        info!(
            "Preparing to run {} INSERT/UPDATE statements{}",
            rows.len(),
            if self.dry_run { " [dry run]" } else { "" }
        );

        let mut session = self.db.begin().await?;
        let outcome = self.run(session.as_mut(), &rows, &mut summary).await;
        finish_transaction(session, outcome).await?;

        self.written.extend(rows.into_iter().cloned());
        Ok(summary)
    }
}
