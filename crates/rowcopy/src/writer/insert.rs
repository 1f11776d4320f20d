//! Batched inserts, one multi-row statement per batch.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, trace};

use super::{finish_transaction, pending_rows, DataWriter, Progress, WriteSummary};
use crate::core::{ColumnData, DataNode, DataRow, Database, Session};
use crate::error::{CopyError, Result};
use crate::retrieve::MAX_PARAMS_PER_STATEMENT;

/// Rows of one table that share a column list, and the multi-row statement
/// inserting them.
#[derive(Debug)]
pub(crate) struct InsertBatch<'n> {
    pub table: String,
    pub statement: String,
    pub rows: Vec<&'n DataRow>,
}

impl InsertBatch<'_> {
    /// Parameters of every row, in statement order.
    fn params(&self) -> Vec<ColumnData> {
        self.rows
            .iter()
            .flat_map(|row| row.params_for_insert())
            .collect()
    }
}

/// Inserts rows into the target database.
pub struct Inserter {
    db: Arc<dyn Database>,
    chunk_size: usize,
    ignore_existing: bool,
    dry_run: bool,
    written: HashSet<DataRow>,
}

impl Inserter {
    pub fn new(db: Arc<dyn Database>, chunk_size: usize) -> Self {
        Self {
            db,
            chunk_size: chunk_size.max(1),
            ignore_existing: false,
            dry_run: false,
            written: HashSet::new(),
        }
    }

    /// Silently skip rows whose key already exists on the target.
    pub fn ignore_existing(mut self, ignore: bool) -> Self {
        self.ignore_existing = ignore;
        self
    }

    /// Prepare statements without executing them.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Split rows into batches of contiguous same-table, same-column rows.
    ///
    /// A batch holds at most `chunk_size` rows and never binds more than
    /// [`MAX_PARAMS_PER_STATEMENT`] parameters.
    pub(crate) fn prepare_batches<'n>(&self, rows: &[&'n DataRow]) -> Vec<InsertBatch<'n>> {
        let mut groups: Vec<Vec<&'n DataRow>> = Vec::new();

        for &row in rows {
            let limit = self
                .chunk_size
                .min(MAX_PARAMS_PER_STATEMENT / row.columns.len().max(1))
                .max(1);
            let extends_last = groups.last().is_some_and(|group| {
                group.len() < limit
                    && group[0].table_name() == row.table_name()
                    && group[0].column_names() == row.column_names()
            });
            if extends_last {
                if let Some(group) = groups.last_mut() {
                    group.push(row);
                }
                continue;
            }

            debug!("Preprocessing rows for {}", row.table_name());
            groups.push(vec![row]);
        }

        let dialect = self.db.dialect();
        groups
            .into_iter()
            .map(|rows| InsertBatch {
                table: rows[0].table_name().to_string(),
                statement: dialect.build_insert_query(
                    rows[0].table_name(),
                    &rows[0].columns,
                    rows.len(),
                    self.ignore_existing,
                ),
                rows,
            })
            .collect()
    }

    async fn run_batches(
        &self,
        session: &mut dyn Session,
        batches: &[InsertBatch<'_>],
        summary: &mut WriteSummary,
    ) -> Result<()> {
        let mut progress = Progress::new("Inserted", batches.len());
        for (index, batch) in batches.iter().enumerate() {
            trace!("Executing insert:\n{}", batch.statement);
            session
                .prepare(&batch.statement)
                .await
                .map_err(|e| CopyError::write(&batch.table, e))?;
            summary.statements_prepared += 1;

            if !self.dry_run {
                session
                    .execute(&batch.statement, &batch.params())
                    .await
                    .map_err(|e| CopyError::write(&batch.table, e))?;
            }
            summary.rows_written += batch.rows.len();
            progress.update(index + 1);
        }
        progress.finish();
        Ok(())
    }
}

#[async_trait]
impl DataWriter for Inserter {
    async fn write(&mut self, node: &DataNode) -> Result<WriteSummary> {
        let mut summary = WriteSummary::default();
        let rows = pending_rows(node, &self.written, &mut summary);
        let batches = self.prepare_batches(&rows);
        info!(
            "Preparing to run {} INSERT batches ({} rows){}",
            batches.len(),
            rows.len(),
            if self.dry_run { " [dry run]" } else { "" }
        );

        let mut session = self.db.begin().await?;
        let outcome = self
            .run_batches(session.as_mut(), &batches, &mut summary)
            .await;
        finish_transaction(session, outcome).await?;

        self.written.extend(rows.into_iter().cloned());
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, SqlType, Table};
    use crate::query::parse_query;
    use crate::retrieve::DataRetriever;
    use crate::test_support::{count_rows, graph, source_database, target_database};

    async fn retrieve(sql: &str) -> DataNode {
        let source = source_database().await;
        let graph = graph(&source).await;
        DataRetriever::new(source.as_ref(), &graph)
            .collect(&parse_query(sql).unwrap())
            .await
            .unwrap()
    }

    fn many_rows(n: i64) -> (Arc<Table>, Vec<DataRow>) {
        let table = Arc::new(
            Table::new(
                "main",
                vec![
                    Column::new("id", SqlType::I64, false),
                    Column::new("text", SqlType::Text, true),
                ],
            )
            .with_primary_key(["id"]),
        );
        let rows = (1..=n)
            .map(|i| {
                DataRow::new(
                    Arc::clone(&table),
                    vec![
                        ColumnData::value("id", i),
                        ColumnData::value("text", format!("text {}", i)),
                    ],
                )
            })
            .collect();
        (table, rows)
    }

    #[tokio::test]
    async fn test_batches_follow_tables_and_chunk_size() {
        let target = target_database().await;
        let data = retrieve("SELECT * FROM main WHERE id = 1").await;
        let rows = data.flatten();

        let batches = Inserter::new(Arc::clone(&target), 500).prepare_batches(&rows);
        let tables: Vec<&str> = batches.iter().map(|b| b.table.as_str()).collect();
        assert!(tables.contains(&"main"));
        assert!(tables.contains(&"intermediate"));
        assert!(tables.contains(&"intermediate_to_child"));
        assert!(tables.contains(&"child"));

        let (_, many) = many_rows(100);
        let refs: Vec<&DataRow> = many.iter().collect();
        let batches = Inserter::new(target, 20).prepare_batches(&refs);
        assert_eq!(batches.len(), 5);
        assert!(batches.iter().all(|b| b.rows.len() == 20));
        assert!(batches[0]
            .statement
            .starts_with("INSERT INTO \"main\"(\"id\",\"text\")\nVALUES(?,?),\n(?,?),"));
        assert_eq!(batches[0].statement.matches("(?,?)").count(), 20);
        assert_eq!(batches[0].params().len(), 40);
    }

    #[tokio::test]
    async fn test_batches_stay_under_parameter_limit() {
        let target = target_database().await;
        let (_, many) = many_rows(1000);
        let refs: Vec<&DataRow> = many.iter().collect();

        let batches = Inserter::new(target, 5000).prepare_batches(&refs);
        let sizes: Vec<usize> = batches.iter().map(|b| b.rows.len()).collect();
        assert_eq!(sizes, vec![450, 450, 100]);
        assert!(batches
            .iter()
            .all(|b| b.params().len() <= MAX_PARAMS_PER_STATEMENT));
    }

    #[tokio::test]
    async fn test_insert_one_table() {
        let target = target_database().await;
        let (_, rows) = many_rows(100);
        let node = DataNode::leaf("main", rows);

        let mut inserter = Inserter::new(Arc::clone(&target), 20);
        let summary = inserter.write(&node).await.unwrap();

        assert_eq!(summary.rows_written, 100);
        assert_eq!(summary.statements_prepared, 5);
        assert_eq!(count_rows(&target, "main").await, 100);
    }

    #[tokio::test]
    async fn test_insert_whole_tree_in_dependency_order() {
        let target = target_database().await;
        let data = retrieve("SELECT * FROM child WHERE first = 'first 4'").await;

        let mut inserter = Inserter::new(Arc::clone(&target), 500);
        inserter.write(&data).await.unwrap();

        assert_eq!(count_rows(&target, "main").await, 1);
        assert_eq!(count_rows(&target, "intermediate").await, 1);
        assert_eq!(count_rows(&target, "intermediate_to_child").await, 1);
        assert_eq!(count_rows(&target, "child").await, 1);
    }

    #[tokio::test]
    async fn test_rows_are_written_once_per_run() {
        let target = target_database().await;
        let data = retrieve("SELECT * FROM main WHERE id = 1").await;

        let mut inserter = Inserter::new(Arc::clone(&target), 500);
        let first = inserter.write(&data).await.unwrap();
        let second = inserter.write(&data).await.unwrap();

        assert!(first.rows_written > 0);
        assert_eq!(second.rows_written, 0);
        assert_eq!(second.duplicates_skipped, first.rows_written);
        assert_eq!(count_rows(&target, "intermediate").await, 2);
    }

    #[tokio::test]
    async fn test_failure_rolls_back_everything() {
        let target = target_database().await;
        let (table, mut rows) = many_rows(3);
        // violates the primary key of the first row
        rows.push(DataRow::new(
            table,
            vec![ColumnData::value("id", 1i64), ColumnData::value("text", "again")],
        ));
        let node = DataNode::leaf("main", rows);

        let err = Inserter::new(Arc::clone(&target), 2)
            .write(&node)
            .await
            .unwrap_err();
        assert!(matches!(err, CopyError::Write { .. }));
        assert_eq!(count_rows(&target, "main").await, 0);
    }

    #[tokio::test]
    async fn test_ignore_existing_skips_conflicts() {
        let target = target_database().await;
        let (_, rows) = many_rows(3);

        Inserter::new(Arc::clone(&target), 500)
            .write(&DataNode::leaf("main", rows[..1].to_vec()))
            .await
            .unwrap();
        Inserter::new(Arc::clone(&target), 500)
            .ignore_existing(true)
            .write(&DataNode::leaf("main", rows))
            .await
            .unwrap();

        assert_eq!(count_rows(&target, "main").await, 3);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let target = target_database().await;
        let (_, rows) = many_rows(10);

        let summary = Inserter::new(Arc::clone(&target), 500)
            .dry_run(true)
            .write(&DataNode::leaf("main", rows))
            .await
            .unwrap();

        assert_eq!(summary.statements_prepared, 1);
        assert_eq!(summary.rows_written, 10);
        assert_eq!(count_rows(&target, "main").await, 0);
    }
}
